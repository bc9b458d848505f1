use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Handle for publishing domain events from services.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events emitted after a ledger-mutating transaction commits, plus
/// non-fatal signals surfaced during read-only analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockAdjusted {
        product_id: i64,
        warehouse_id: i64,
        delta: i64,
        new_quantity: i64,
        kind: String,
        correlation_id: Uuid,
    },
    WithdrawalCompleted {
        warehouse_id: i64,
        correlation_id: Uuid,
        line_count: usize,
    },
    TransferCompleted {
        source_warehouse_id: i64,
        destination_warehouse_id: i64,
        correlation_id: Uuid,
        line_count: usize,
    },
    PurchaseOrderCreated(i64),
    PurchaseOrderReceived {
        order_id: i64,
        remainder_order_id: Option<i64>,
    },
    PriceInconsistencyDetected {
        listing_id: String,
        stored_discount_pct: i64,
        computed_discount_pct: i64,
    },
}

/// Event processing loop; the host spawns this next to the service layer.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockAdjusted {
                product_id,
                warehouse_id,
                delta,
                new_quantity,
                kind,
                correlation_id,
            } => {
                info!(
                    product_id,
                    warehouse_id,
                    delta,
                    new_quantity,
                    kind,
                    %correlation_id,
                    "stock adjusted"
                );
            }
            Event::WithdrawalCompleted {
                warehouse_id,
                correlation_id,
                line_count,
            } => {
                info!(warehouse_id, %correlation_id, line_count, "withdrawal completed");
            }
            Event::TransferCompleted {
                source_warehouse_id,
                destination_warehouse_id,
                correlation_id,
                line_count,
            } => {
                info!(
                    source_warehouse_id,
                    destination_warehouse_id,
                    %correlation_id,
                    line_count,
                    "transfer completed"
                );
            }
            Event::PurchaseOrderCreated(order_id) => {
                info!(order_id, "purchase order created");
            }
            Event::PurchaseOrderReceived {
                order_id,
                remainder_order_id,
            } => {
                info!(order_id, ?remainder_order_id, "purchase order received");
            }
            Event::PriceInconsistencyDetected {
                listing_id,
                stored_discount_pct,
                computed_discount_pct,
            } => {
                warn!(
                    listing_id,
                    stored_discount_pct,
                    computed_discount_pct,
                    "price inconsistency flagged for manual review"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}
