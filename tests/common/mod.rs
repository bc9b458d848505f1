#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use stockroom_core::{
    config::AppConfig,
    db::{establish_connection_from_app_config, run_migrations},
    entities::{product, stock_movement::MovementKind, warehouse},
    events::{process_events, EventSender},
    InventoryCore,
};

/// A fully wired core over a throwaway file-backed sqlite database. The
/// temp directory must stay alive as long as the context.
pub struct TestContext {
    pub core: InventoryCore,
    _tmp: TempDir,
}

pub async fn setup() -> TestContext {
    let tmp = TempDir::new().expect("create temp dir");
    let db_path = tmp.path().join("stockroom_test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let mut config = AppConfig::new(db_url, "test".to_string());
    // One connection keeps sqlite writes serialized.
    config.db_max_connections = 1;
    config.db_min_connections = 1;

    let db = Arc::new(
        establish_connection_from_app_config(&config)
            .await
            .expect("connect to test database"),
    );
    run_migrations(&db).await.expect("run migrations");

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(process_events(rx));
    let event_sender = EventSender::new(tx);

    let core = InventoryCore::new(db, config, event_sender)
        .await
        .expect("assemble core");

    TestContext { core, _tmp: tmp }
}

pub async fn seed_product(ctx: &TestContext, sku: &str, is_kit: bool) -> product::Model {
    ctx.core
        .catalog
        .create_product(sku.to_string(), format!("{} product", sku), None, is_kit)
        .await
        .expect("create product")
}

pub async fn seed_warehouse(ctx: &TestContext, name: &str) -> warehouse::Model {
    ctx.core
        .catalog
        .create_warehouse(name.to_string(), 1)
        .await
        .expect("create warehouse")
}

/// Puts `quantity` units on hand through a regular receipt adjustment.
pub async fn seed_stock(ctx: &TestContext, product_id: i64, warehouse_id: i64, quantity: i64) {
    ctx.core
        .ledger
        .adjust(
            product_id,
            warehouse_id,
            quantity,
            MovementKind::PurchaseReceipt,
            Uuid::new_v4(),
        )
        .await
        .expect("seed stock");
}

pub async fn on_hand(ctx: &TestContext, product_id: i64, warehouse_id: i64) -> i64 {
    ctx.core
        .ledger
        .get_record(product_id, warehouse_id)
        .await
        .expect("read stock record")
        .map(|r| r.quantity)
        .unwrap_or(0)
}
