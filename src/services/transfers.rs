use std::sync::Arc;

use sea_orm::{TransactionError, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::stock_movement::MovementKind,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        catalog::CatalogService,
        stock_ledger::{Adjustment, StockLedgerService},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLine {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub source_warehouse_id: i64,
    pub destination_warehouse_id: i64,
    pub correlation_id: Uuid,
    pub lines: Vec<TransferLine>,
}

/// Moves quantities of products between two warehouses as a single atomic
/// unit. Atomicity comes from the storage transaction, not compensating
/// logic: a failing decrement rolls back everything already applied.
#[derive(Clone)]
pub struct TransferService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    catalog: CatalogService,
}

impl TransferService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        let catalog = CatalogService::new(db.clone());
        Self {
            db,
            event_sender,
            catalog,
        }
    }

    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        source_warehouse_id: i64,
        destination_warehouse_id: i64,
        lines: Vec<TransferLine>,
    ) -> Result<TransferReceipt, ServiceError> {
        if source_warehouse_id == destination_warehouse_id {
            return Err(ServiceError::ValidationError(
                "source and destination warehouse must differ".into(),
            ));
        }
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "transfer requires at least one line".into(),
            ));
        }
        for line in &lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "transfer quantity for product {} must be positive",
                    line.product_id
                )));
            }
            self.catalog.get_product(line.product_id).await?;
        }

        let correlation_id = Uuid::new_v4();

        // Both rows of every line are touched inside one transaction, in a
        // globally consistent (warehouse, product) order so concurrent
        // opposite-direction transfers cannot deadlock on lock ordering.
        let mut adjustments: Vec<Adjustment> = Vec::with_capacity(lines.len() * 2);
        for line in &lines {
            adjustments.push(Adjustment::new(
                line.product_id,
                source_warehouse_id,
                -line.quantity,
                MovementKind::TransferOut,
                correlation_id,
            ));
            adjustments.push(Adjustment::new(
                line.product_id,
                destination_warehouse_id,
                line.quantity,
                MovementKind::TransferIn,
                correlation_id,
            ));
        }
        adjustments.sort_by_key(|a| (a.warehouse_id, a.product_id));

        self.db
            .transaction::<_, (), ServiceError>(move |txn| {
                Box::pin(async move {
                    for adj in &adjustments {
                        StockLedgerService::apply(txn, adj).await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            source_warehouse_id,
            destination_warehouse_id,
            %correlation_id,
            line_count = lines.len(),
            "transfer completed"
        );

        self.event_sender
            .send(Event::TransferCompleted {
                source_warehouse_id,
                destination_warehouse_id,
                correlation_id,
                line_count: lines.len(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(TransferReceipt {
            source_warehouse_id,
            destination_warehouse_id,
            correlation_id,
            lines,
        })
    }
}
