use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionError,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        purchase_order::{self, Entity as PurchaseOrderEntity, OrderStatus},
        purchase_order_line::{self, Entity as PurchaseOrderLineEntity},
        stock_movement::MovementKind,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger::{Adjustment, StockLedgerService},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: i64,
    pub ordered_quantity: i64,
    /// Agreed acquisition cost in minor currency units.
    pub unit_cost: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub product_id: i64,
    pub quantity: i64,
    /// Actual cost on receipt, minor units; falls back to the order line's
    /// agreed cost when omitted.
    pub unit_cost: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ReceiptOutcome {
    pub order: purchase_order::Model,
    /// New pending order holding the undelivered remainder, when any line
    /// was short.
    pub remainder: Option<purchase_order::Model>,
}

/// Supplier order lifecycle: creation, receipt reconciliation, and spin-off
/// of follow-up orders for undelivered remainders. Short delivery is not an
/// error here; it is a state transition that generates follow-up work.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl PurchaseOrderService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn create_purchase_order(
        &self,
        supplier_id: i64,
        destination_warehouse_id: Option<i64>,
        lines: Vec<NewOrderLine>,
    ) -> Result<purchase_order::Model, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "purchase order requires at least one line".into(),
            ));
        }
        for line in &lines {
            if line.ordered_quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "ordered quantity for product {} must be positive",
                    line.product_id
                )));
            }
        }

        let order = self
            .db
            .transaction::<_, purchase_order::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    Self::insert_order(
                        txn,
                        supplier_id,
                        destination_warehouse_id,
                        None,
                        &lines,
                    )
                    .await
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(order_id = order.id, supplier_id, "purchase order created");

        self.event_sender
            .send(Event::PurchaseOrderCreated(order.id))
            .await
            .map_err(ServiceError::EventError)?;

        Ok(order)
    }

    pub async fn get_purchase_order(
        &self,
        order_id: i64,
    ) -> Result<Option<purchase_order::Model>, ServiceError> {
        let db = &*self.db;
        PurchaseOrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn order_lines(
        &self,
        order_id: i64,
    ) -> Result<Vec<purchase_order_line::Model>, ServiceError> {
        let db = &*self.db;
        PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::OrderId.eq(order_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn list_orders_for_supplier(
        &self,
        supplier_id: i64,
    ) -> Result<Vec<purchase_order::Model>, ServiceError> {
        let db = &*self.db;
        PurchaseOrderEntity::find()
            .filter(purchase_order::Column::SupplierId.eq(supplier_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Quantity of a product still expected from pending purchase orders.
    pub async fn open_quantity_on_order(&self, product_id: i64) -> Result<i64, ServiceError> {
        let db = &*self.db;
        let pending_ids: Vec<i64> = PurchaseOrderEntity::find()
            .filter(purchase_order::Column::Status.eq(OrderStatus::Pending.as_str()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|o| o.id)
            .collect();

        if pending_ids.is_empty() {
            return Ok(0);
        }

        let lines = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::OrderId.is_in(pending_ids))
            .filter(purchase_order_line::Column::ProductId.eq(product_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(lines.iter().map(|l| l.ordered_quantity).sum())
    }

    /// Reconciles received quantities against a pending order.
    ///
    /// Received == ordered confirms the line; received < ordered confirms
    /// the received part and accumulates the shortfall into one new pending
    /// order referencing this one; received > ordered is rejected with
    /// `OverReceipt`. The original order always transitions to the terminal
    /// `confirmed` status.
    #[instrument(skip(self))]
    pub async fn receive(
        &self,
        order_id: i64,
        destination_warehouse_id: i64,
        received: Vec<ReceivedLine>,
    ) -> Result<ReceiptOutcome, ServiceError> {
        let correlation_id = Uuid::new_v4();

        let outcome = self
            .db
            .transaction::<_, ReceiptOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let order = PurchaseOrderEntity::find_by_id(order_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("purchase order {}", order_id))
                        })?;

                    if order.status() != Some(OrderStatus::Pending) {
                        return Err(ServiceError::InvalidStatus(format!(
                            "purchase order {} is {} and cannot be received",
                            order_id, order.status
                        )));
                    }

                    let lines = PurchaseOrderLineEntity::find()
                        .filter(purchase_order_line::Column::OrderId.eq(order_id))
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let mut received_by_product: HashMap<i64, &ReceivedLine> = HashMap::new();
                    for line in &received {
                        if line.quantity < 0 {
                            return Err(ServiceError::ValidationError(format!(
                                "received quantity for product {} cannot be negative",
                                line.product_id
                            )));
                        }
                        if received_by_product.insert(line.product_id, line).is_some() {
                            return Err(ServiceError::ValidationError(format!(
                                "product {} appears more than once in the receipt",
                                line.product_id
                            )));
                        }
                    }
                    for line in &received {
                        if !lines.iter().any(|l| l.product_id == line.product_id) {
                            return Err(ServiceError::ValidationError(format!(
                                "product {} is not on purchase order {}",
                                line.product_id, order_id
                            )));
                        }
                    }

                    let mut shortfall_lines: Vec<NewOrderLine> = Vec::new();
                    for line in &lines {
                        let receipt = received_by_product.get(&line.product_id);
                        let received_qty = receipt.map(|r| r.quantity).unwrap_or(0);

                        if received_qty > line.ordered_quantity {
                            return Err(ServiceError::OverReceipt {
                                product_id: line.product_id,
                                ordered: line.ordered_quantity,
                                received: received_qty,
                            });
                        }

                        if received_qty > 0 {
                            let unit_cost = receipt
                                .and_then(|r| r.unit_cost)
                                .or(line.unit_cost);
                            let mut adj = Adjustment::new(
                                line.product_id,
                                destination_warehouse_id,
                                received_qty,
                                MovementKind::PurchaseReceipt,
                                correlation_id,
                            );
                            adj.unit_cost = unit_cost;
                            StockLedgerService::apply(txn, &adj).await?;
                        }

                        let shortfall = line.ordered_quantity - received_qty;
                        if shortfall > 0 {
                            shortfall_lines.push(NewOrderLine {
                                product_id: line.product_id,
                                ordered_quantity: shortfall,
                                unit_cost: line.unit_cost,
                            });
                        }
                    }

                    let now = Utc::now();
                    let mut active: purchase_order::ActiveModel = order.clone().into();
                    active.status = Set(OrderStatus::Confirmed.as_str().to_string());
                    active.completed_at = Set(Some(now));
                    let confirmed = active.update(txn).await.map_err(ServiceError::db_error)?;

                    let remainder = if shortfall_lines.is_empty() {
                        None
                    } else {
                        Some(
                            Self::insert_order(
                                txn,
                                order.supplier_id,
                                order.destination_warehouse_id,
                                Some(format!(
                                    "shortfall of purchase order #{}",
                                    order.id
                                )),
                                &shortfall_lines,
                            )
                            .await?,
                        )
                    };

                    Ok(ReceiptOutcome {
                        order: confirmed,
                        remainder,
                    })
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            order_id,
            remainder_order_id = ?outcome.remainder.as_ref().map(|o| o.id),
            "purchase order received"
        );

        self.event_sender
            .send(Event::PurchaseOrderReceived {
                order_id,
                remainder_order_id: outcome.remainder.as_ref().map(|o| o.id),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(outcome)
    }

    async fn insert_order<C: sea_orm::ConnectionTrait>(
        conn: &C,
        supplier_id: i64,
        destination_warehouse_id: Option<i64>,
        predecessor_ref: Option<String>,
        lines: &[NewOrderLine],
    ) -> Result<purchase_order::Model, ServiceError> {
        let order = purchase_order::ActiveModel {
            supplier_id: Set(supplier_id),
            status: Set(OrderStatus::Pending.as_str().to_string()),
            destination_warehouse_id: Set(destination_warehouse_id),
            predecessor_ref: Set(predecessor_ref),
            created_at: Set(Utc::now()),
            completed_at: Set(None),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        for line in lines {
            purchase_order_line::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                ordered_quantity: Set(line.ordered_quantity),
                unit_cost: Set(line.unit_cost),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
        }

        Ok(order)
    }
}
