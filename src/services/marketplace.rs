use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    config::MarketplaceConfig,
    db::DbPool,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        price_reconciler::{self, CanonicalPrice, RawListingPrice},
        replenishment::SalesSnapshot,
        stock_ledger::StockLedgerService,
    },
};

const EXTERNAL_ID_PREFIX: &str = "SR";

/// Renders an internal product id as the external marketplace identifier.
pub fn encode_external_id(product_id: i64) -> String {
    format!("{}{}", EXTERNAL_ID_PREFIX, product_id)
}

/// Parses an external marketplace identifier back to an internal product id.
pub fn parse_external_id(external_id: &str) -> Result<i64, ServiceError> {
    external_id
        .strip_prefix(EXTERNAL_ID_PREFIX)
        .and_then(|digits| digits.parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "malformed external product id: {}",
                external_id
            ))
        })
}

/// One entry of the external sales feed: a listing, its externally keyed
/// product, a trailing sales count, and the reported price fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub listing_id: String,
    pub product_id: String,
    pub units_sold_30d: Option<i64>,
    pub price: RawListingPrice,
}

/// A reconciled feed entry: canonical price plus the sales observation the
/// replenishment analyzer consumes.
#[derive(Debug, Clone)]
pub struct ReconciledListing {
    pub listing_id: String,
    pub product_id: i64,
    pub price: CanonicalPrice,
    pub sales: SalesSnapshot,
}

/// A feed entry that could not be reconciled. Kept alongside partial results
/// so one bad listing never aborts a batch.
#[derive(Debug)]
pub struct FeedFailure {
    pub listing_id: String,
    pub error: ServiceError,
}

/// Boundary to the external marketplace: translates its identifiers and
/// price feed into internal terms, and exposes the total on-hand quantity
/// the host pushes back out after ledger mutations. All external I/O is the
/// host's job; this service only ever sees already-fetched snapshots.
#[derive(Clone)]
pub struct MarketplaceService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    config: MarketplaceConfig,
}

impl MarketplaceService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, config: MarketplaceConfig) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    /// Total on-hand quantity across all warehouses for an externally keyed
    /// product, for the host to push to the marketplace after a mutation.
    #[instrument(skip(self))]
    pub async fn on_hand_for_listing(&self, external_id: &str) -> Result<i64, ServiceError> {
        let product_id = parse_external_id(external_id)?;
        StockLedgerService::total_on_hand_on(&*self.db, product_id).await
    }

    /// Reconciles a batch of feed entries into canonical prices and sales
    /// snapshots for the given warehouse. Failing entries are collected,
    /// not fatal; price inconsistencies are emitted as events and do not
    /// fail the entry either.
    #[instrument(skip(self, listings), fields(count = listings.len()))]
    pub async fn reconcile_feed(
        &self,
        warehouse_id: i64,
        listings: &[ListingSnapshot],
    ) -> Result<(Vec<ReconciledListing>, Vec<FeedFailure>), ServiceError> {
        let mut reconciled = Vec::with_capacity(listings.len());
        let mut failures = Vec::new();

        for listing in listings {
            match self.reconcile_listing(warehouse_id, listing).await {
                Ok(entry) => reconciled.push(entry),
                Err(error) => {
                    warn!(
                        listing_id = %listing.listing_id,
                        %error,
                        "feed entry failed to reconcile"
                    );
                    failures.push(FeedFailure {
                        listing_id: listing.listing_id.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            reconciled = reconciled.len(),
            failed = failures.len(),
            "marketplace feed reconciled"
        );

        Ok((reconciled, failures))
    }

    async fn reconcile_listing(
        &self,
        warehouse_id: i64,
        listing: &ListingSnapshot,
    ) -> Result<ReconciledListing, ServiceError> {
        let product_id = parse_external_id(&listing.product_id)?;
        let price = price_reconciler::reconcile(&listing.price)?;

        if price.discount_inconsistent {
            if let (Some(stored), Some(computed)) =
                (listing.price.stored_discount_pct, price.discount_pct)
            {
                self.event_sender
                    .send(Event::PriceInconsistencyDetected {
                        listing_id: listing.listing_id.clone(),
                        stored_discount_pct: stored,
                        computed_discount_pct: computed,
                    })
                    .await
                    .map_err(ServiceError::EventError)?;
            }
        }

        Ok(ReconciledListing {
            listing_id: listing.listing_id.clone(),
            product_id,
            price,
            sales: SalesSnapshot {
                product_id,
                warehouse_id,
                units_sold_30d: listing.units_sold_30d,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_ids_round_trip() {
        assert_eq!(encode_external_id(42), "SR42");
        assert_eq!(parse_external_id("SR42").unwrap(), 42);
    }

    #[test]
    fn malformed_external_ids_are_rejected() {
        for bad in ["", "SR", "SRabc", "42", "SR-7", "SR0"] {
            assert!(
                matches!(
                    parse_external_id(bad),
                    Err(ServiceError::ValidationError(_))
                ),
                "{} should be rejected",
                bad
            );
        }
    }
}
