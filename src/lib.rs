//! Multi-warehouse inventory core: a stock ledger with an append-only
//! movement log, kit decomposition, atomic inter-warehouse transfers,
//! purchase order receipt reconciliation, replenishment analysis, and
//! marketplace price normalization.
//!
//! The crate is storage plus domain logic only. HTTP surfaces, external
//! marketplace I/O, and scheduling are left to the host application, which
//! wires an [`InventoryCore`] into whatever outer layers it runs.

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    catalog::CatalogService, kits::KitService, marketplace::MarketplaceService,
    purchase_orders::PurchaseOrderService, replenishment::ReplenishmentService,
    stock_ledger::StockLedgerService, transfers::TransferService,
    withdrawals::WithdrawalService,
};

/// Initializes the global tracing subscriber. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// The assembled service layer. One instance per database; services share
/// the pool and the event channel and are individually cheap to clone.
#[derive(Clone)]
pub struct InventoryCore {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub event_sender: EventSender,
    pub catalog: CatalogService,
    pub ledger: StockLedgerService,
    pub kits: KitService,
    pub withdrawals: WithdrawalService,
    pub transfers: TransferService,
    pub purchase_orders: PurchaseOrderService,
    pub replenishment: ReplenishmentService,
    pub marketplace: MarketplaceService,
}

impl InventoryCore {
    /// Wires every service onto an established pool. Runs migrations first
    /// when the configuration asks for it.
    pub async fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        event_sender: EventSender,
    ) -> Result<Self, ServiceError> {
        if config.auto_migrate {
            db::run_migrations(&db).await?;
        }

        let catalog = CatalogService::new(db.clone());
        let ledger = StockLedgerService::new(db.clone(), event_sender.clone());
        let kits = KitService::new(db.clone());
        let withdrawals = WithdrawalService::new(db.clone(), event_sender.clone());
        let transfers = TransferService::new(db.clone(), event_sender.clone());
        let purchase_orders = PurchaseOrderService::new(db.clone(), event_sender.clone());
        let replenishment =
            ReplenishmentService::new(ledger.clone(), config.replenishment.clone());
        let marketplace = MarketplaceService::new(
            db.clone(),
            event_sender.clone(),
            config.marketplace.clone(),
        );

        info!(environment = %config.environment, "inventory core assembled");

        Ok(Self {
            db,
            config,
            event_sender,
            catalog,
            ledger,
            kits,
            withdrawals,
            transfers,
            purchase_orders,
            replenishment,
            marketplace,
        })
    }
}
