use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionError, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        stock_movement::MovementKind,
        stock_record::{self, Entity as StockRecordEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        catalog::CatalogService,
        kits::KitService,
        stock_ledger::{Adjustment, StockLedgerService},
    },
};

/// One requested outbound line, addressed by SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalLine {
    pub sku: String,
    pub quantity: i64,
    pub is_kit: bool,
}

/// A decrement applied as part of a withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedDecrement {
    pub product_id: i64,
    pub quantity: i64,
    pub kind: MovementKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub warehouse_id: i64,
    pub correlation_id: Uuid,
    pub decrements: Vec<AppliedDecrement>,
}

/// Decrements stock for sales and consumption events, expanding kit lines
/// into component decrements. The whole withdrawal is all-or-nothing: the
/// first failing line aborts the operation and no partial withdrawal is ever
/// persisted.
#[derive(Clone)]
pub struct WithdrawalService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    catalog: CatalogService,
    kits: KitService,
}

impl WithdrawalService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        let catalog = CatalogService::new(db.clone());
        let kits = KitService::new(db.clone());
        Self {
            db,
            event_sender,
            catalog,
            kits,
        }
    }

    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        warehouse_id: i64,
        lines: Vec<WithdrawalLine>,
    ) -> Result<WithdrawalReceipt, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "withdrawal requires at least one line".into(),
            ));
        }
        for line in &lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "withdrawal quantity for sku {} must be positive",
                    line.sku
                )));
            }
        }

        // Catalog resolution and kit expansion happen before the ledger
        // transaction opens; only ledger reads and writes run inside it.
        let correlation_id = Uuid::new_v4();
        let mut plan: Vec<Vec<AppliedDecrement>> = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = self.catalog.find_by_sku(&line.sku).await?;

            if line.is_kit {
                if !product.is_kit {
                    return Err(ServiceError::ValidationError(format!(
                        "sku {} is not a kit",
                        line.sku
                    )));
                }
                let components = self.kits.expand(product.id, line.quantity).await?;
                plan.push(
                    components
                        .into_iter()
                        .map(|c| AppliedDecrement {
                            product_id: c.product_id,
                            quantity: c.quantity,
                            kind: MovementKind::KitDecrement,
                        })
                        .collect(),
                );
            } else {
                plan.push(vec![AppliedDecrement {
                    product_id: product.id,
                    quantity: line.quantity,
                    kind: MovementKind::Withdrawal,
                }]);
            }
        }

        let txn_plan = plan.clone();
        self.db
            .transaction::<_, (), ServiceError>(move |txn| {
                Box::pin(async move {
                    for line_plan in &txn_plan {
                        // All components of a line are verified before any
                        // decrement of that line is applied, so the first
                        // short component is reported without partial
                        // decrements.
                        for decrement in line_plan {
                            let available = StockRecordEntity::find()
                                .filter(
                                    stock_record::Column::ProductId.eq(decrement.product_id),
                                )
                                .filter(stock_record::Column::WarehouseId.eq(warehouse_id))
                                .one(txn)
                                .await
                                .map_err(ServiceError::db_error)?
                                .map(|r| r.quantity)
                                .unwrap_or(0);

                            if available < decrement.quantity {
                                return Err(ServiceError::InsufficientStock {
                                    product_id: decrement.product_id,
                                    warehouse_id,
                                    requested: decrement.quantity,
                                    available,
                                });
                            }
                        }

                        for decrement in line_plan {
                            StockLedgerService::apply(
                                txn,
                                &Adjustment::new(
                                    decrement.product_id,
                                    warehouse_id,
                                    -decrement.quantity,
                                    decrement.kind,
                                    correlation_id,
                                ),
                            )
                            .await?;
                        }
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        let decrements: Vec<AppliedDecrement> = plan.into_iter().flatten().collect();

        info!(
            warehouse_id,
            %correlation_id,
            decrement_count = decrements.len(),
            "withdrawal completed"
        );

        self.event_sender
            .send(Event::WithdrawalCompleted {
                warehouse_id,
                correlation_id,
                line_count: lines.len(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(WithdrawalReceipt {
            warehouse_id,
            correlation_id,
            decrements,
        })
    }
}
