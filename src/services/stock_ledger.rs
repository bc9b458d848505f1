use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    TransactionError, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        stock_movement::{self, Entity as StockMovementEntity, MovementKind},
        stock_record::{self, Entity as StockRecordEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// One atomic quantity change against a (product, warehouse) pair.
#[derive(Debug, Clone)]
pub struct Adjustment {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub delta: i64,
    pub kind: MovementKind,
    pub correlation_id: Uuid,
    /// When set, the stock record's last known acquisition cost is replaced
    /// (last-cost-wins, used by purchase receipts).
    pub unit_cost: Option<i64>,
}

impl Adjustment {
    pub fn new(
        product_id: i64,
        warehouse_id: i64,
        delta: i64,
        kind: MovementKind,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            product_id,
            warehouse_id,
            delta,
            kind,
            correlation_id,
            unit_cost: None,
        }
    }
}

/// The stock ledger: per-(product, warehouse) quantities plus the append-only
/// movement log. The only component that writes stock quantities; callers
/// orchestrate kit and transfer semantics on top of it.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl StockLedgerService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Applies one adjustment on the given connection, which is expected to
    /// be the caller's transaction for multi-step operations.
    ///
    /// The version column on the stock record is the serialization point:
    /// the update is filtered on the version read, and zero affected rows
    /// surfaces as a retryable `Conflict`.
    pub async fn apply<C: ConnectionTrait>(
        conn: &C,
        adj: &Adjustment,
    ) -> Result<stock_record::Model, ServiceError> {
        let existing = StockRecordEntity::find()
            .filter(stock_record::Column::ProductId.eq(adj.product_id))
            .filter(stock_record::Column::WarehouseId.eq(adj.warehouse_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Self::apply_with_snapshot(conn, adj, existing).await
    }

    /// Applies an adjustment against a previously read snapshot of the
    /// pair's record. The snapshot's `version` is the compare-and-set
    /// expectation: if another writer bumped the row since the snapshot was
    /// taken, the update matches zero rows and the adjustment fails with
    /// `Conflict` before any movement is appended.
    pub async fn apply_with_snapshot<C: ConnectionTrait>(
        conn: &C,
        adj: &Adjustment,
        existing: Option<stock_record::Model>,
    ) -> Result<stock_record::Model, ServiceError> {
        if adj.delta == 0 {
            return Err(ServiceError::ValidationError(
                "adjustment delta cannot be zero".into(),
            ));
        }

        let now = Utc::now();
        let record = match existing {
            Some(record) => {
                let new_quantity = record.quantity + adj.delta;
                if new_quantity < 0 {
                    return Err(ServiceError::InsufficientStock {
                        product_id: adj.product_id,
                        warehouse_id: adj.warehouse_id,
                        requested: -adj.delta,
                        available: record.quantity,
                    });
                }

                let new_cost = adj.unit_cost.or(record.unit_cost);
                let result = StockRecordEntity::update_many()
                    .col_expr(stock_record::Column::Quantity, Expr::value(new_quantity))
                    .col_expr(
                        stock_record::Column::Version,
                        Expr::value(record.version + 1),
                    )
                    .col_expr(stock_record::Column::UnitCost, Expr::value(new_cost))
                    .col_expr(stock_record::Column::UpdatedAt, Expr::value(now))
                    .filter(stock_record::Column::Id.eq(record.id))
                    .filter(stock_record::Column::Version.eq(record.version))
                    .exec(conn)
                    .await
                    .map_err(ServiceError::db_error)?;

                if result.rows_affected == 0 {
                    return Err(ServiceError::Conflict(format!(
                        "concurrent adjustment on product {} in warehouse {}",
                        adj.product_id, adj.warehouse_id
                    )));
                }

                stock_record::Model {
                    quantity: new_quantity,
                    version: record.version + 1,
                    unit_cost: new_cost,
                    updated_at: now,
                    ..record
                }
            }
            None if adj.delta > 0 => {
                // Lazily created on first movement into the warehouse.
                stock_record::ActiveModel {
                    product_id: Set(adj.product_id),
                    warehouse_id: Set(adj.warehouse_id),
                    quantity: Set(adj.delta),
                    safety_stock: Set(0),
                    unit_cost: Set(adj.unit_cost),
                    version: Set(1),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(conn)
                .await
                .map_err(ServiceError::db_error)?
            }
            None => {
                return Err(ServiceError::UnknownStockRecord {
                    product_id: adj.product_id,
                    warehouse_id: adj.warehouse_id,
                });
            }
        };

        // Exactly one ledger entry per successful adjustment.
        stock_movement::ActiveModel {
            product_id: Set(adj.product_id),
            warehouse_id: Set(adj.warehouse_id),
            delta: Set(adj.delta),
            kind: Set(adj.kind.as_str().to_string()),
            correlation_id: Set(adj.correlation_id),
            occurred_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        Ok(record)
    }

    /// Adjusts a single (product, warehouse) pair in its own transaction.
    #[instrument(skip(self))]
    pub async fn adjust(
        &self,
        product_id: i64,
        warehouse_id: i64,
        delta: i64,
        kind: MovementKind,
        correlation_id: Uuid,
    ) -> Result<stock_record::Model, ServiceError> {
        let adj = Adjustment::new(product_id, warehouse_id, delta, kind, correlation_id);

        let record = self
            .db
            .transaction::<_, stock_record::Model, ServiceError>(move |txn| {
                Box::pin(async move { Self::apply(txn, &adj).await })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            product_id,
            warehouse_id,
            delta,
            new_quantity = record.quantity,
            kind = kind.as_str(),
            "stock adjusted"
        );

        self.event_sender
            .send(Event::StockAdjusted {
                product_id,
                warehouse_id,
                delta,
                new_quantity: record.quantity,
                kind: kind.as_str().to_string(),
                correlation_id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(record)
    }

    pub async fn get_record(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<Option<stock_record::Model>, ServiceError> {
        let db = &*self.db;
        StockRecordEntity::find()
            .filter(stock_record::Column::ProductId.eq(product_id))
            .filter(stock_record::Column::WarehouseId.eq(warehouse_id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Sets the minimum desired on-hand quantity for a pair.
    #[instrument(skip(self))]
    pub async fn set_safety_stock(
        &self,
        product_id: i64,
        warehouse_id: i64,
        safety_stock: i64,
    ) -> Result<stock_record::Model, ServiceError> {
        if safety_stock < 0 {
            return Err(ServiceError::ValidationError(
                "safety_stock cannot be negative".into(),
            ));
        }

        let record = self
            .get_record(product_id, warehouse_id)
            .await?
            .ok_or(ServiceError::UnknownStockRecord {
                product_id,
                warehouse_id,
            })?;

        let db = &*self.db;
        let mut active: stock_record::ActiveModel = record.into();
        active.safety_stock = Set(safety_stock);
        active.updated_at = Set(Utc::now());
        active.update(db).await.map_err(ServiceError::db_error)
    }

    /// Sum of all movement deltas for a pair. By the ledger invariant this
    /// always equals the stock record's current quantity.
    pub async fn movement_sum(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<i64, ServiceError> {
        let db = &*self.db;
        let movements = StockMovementEntity::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .filter(stock_movement::Column::WarehouseId.eq(warehouse_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(movements.iter().map(|m| m.delta).sum())
    }

    pub async fn movements_by_correlation(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let db = &*self.db;
        StockMovementEntity::find()
            .filter(stock_movement::Column::CorrelationId.eq(correlation_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Total on-hand quantity of a product across all warehouses, exposed so
    /// the host can push it to the external marketplace after mutations.
    pub async fn total_on_hand(&self, product_id: i64) -> Result<i64, ServiceError> {
        Self::total_on_hand_on(&*self.db, product_id).await
    }

    pub async fn total_on_hand_on<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
    ) -> Result<i64, ServiceError> {
        let records = StockRecordEntity::find()
            .filter(stock_record::Column::ProductId.eq(product_id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(records.iter().map(|r| r.quantity).sum())
    }

    /// Deletes a stock record. Rejected while outbound movement history
    /// (withdrawals or kit decrements) exists for the pair. Guard and delete
    /// run in one transaction so a withdrawal committing in between cannot
    /// slip outbound history under the delete.
    #[instrument(skip(self))]
    pub async fn delete_record(
        &self,
        product_id: i64,
        warehouse_id: i64,
    ) -> Result<(), ServiceError> {
        self.db
            .transaction::<_, (), ServiceError>(move |txn| {
                Box::pin(async move {
                    let record = StockRecordEntity::find()
                        .filter(stock_record::Column::ProductId.eq(product_id))
                        .filter(stock_record::Column::WarehouseId.eq(warehouse_id))
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or(ServiceError::UnknownStockRecord {
                            product_id,
                            warehouse_id,
                        })?;

                    let outbound = StockMovementEntity::find()
                        .filter(stock_movement::Column::ProductId.eq(product_id))
                        .filter(stock_movement::Column::WarehouseId.eq(warehouse_id))
                        .filter(
                            stock_movement::Column::Kind.is_in([
                                MovementKind::Withdrawal.as_str(),
                                MovementKind::KitDecrement.as_str(),
                            ]),
                        )
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    if outbound.is_some() {
                        return Err(ServiceError::Conflict(format!(
                            "stock record for product {} in warehouse {} has outbound history",
                            product_id, warehouse_id
                        )));
                    }

                    StockRecordEntity::delete_by_id(record.id)
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    Ok(())
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(product_id, warehouse_id, "stock record deleted");
        Ok(())
    }
}
