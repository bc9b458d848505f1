mod common;

use assert_matches::assert_matches;
use uuid::Uuid;

use stockroom_core::{
    entities::stock_movement::MovementKind,
    errors::ServiceError,
    services::stock_ledger::{Adjustment, StockLedgerService},
};

#[tokio::test]
async fn first_inbound_adjustment_creates_the_record() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-1", false).await;
    let warehouse = common::seed_warehouse(&ctx, "Main").await;

    let record = ctx
        .core
        .ledger
        .adjust(
            product.id,
            warehouse.id,
            10,
            MovementKind::PurchaseReceipt,
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    assert_eq!(record.quantity, 10);
    assert_eq!(record.safety_stock, 0);
    assert_eq!(record.version, 1);
}

#[tokio::test]
async fn outbound_adjustment_on_missing_record_is_rejected() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-2", false).await;
    let warehouse = common::seed_warehouse(&ctx, "Main").await;

    let err = ctx
        .core
        .ledger
        .adjust(
            product.id,
            warehouse.id,
            -1,
            MovementKind::Withdrawal,
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::UnknownStockRecord { .. });
}

#[tokio::test]
async fn overdraw_reports_shortfall_and_leaves_stock_unchanged() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-3", false).await;
    let warehouse = common::seed_warehouse(&ctx, "Main").await;
    common::seed_stock(&ctx, product.id, warehouse.id, 5).await;

    let err = ctx
        .core
        .ledger
        .adjust(
            product.id,
            warehouse.id,
            -8,
            MovementKind::Withdrawal,
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 8,
            available: 5,
            ..
        }
    );
    assert_eq!(err.shortfall(), Some(3));
    assert_eq!(common::on_hand(&ctx, product.id, warehouse.id).await, 5);
}

#[tokio::test]
async fn quantity_always_equals_movement_sum() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-4", false).await;
    let warehouse = common::seed_warehouse(&ctx, "Main").await;

    for delta in [12i64, -3, 7, -5, -1] {
        let kind = if delta > 0 {
            MovementKind::PurchaseReceipt
        } else {
            MovementKind::Withdrawal
        };
        ctx.core
            .ledger
            .adjust(product.id, warehouse.id, delta, kind, Uuid::new_v4())
            .await
            .unwrap();
    }

    let quantity = common::on_hand(&ctx, product.id, warehouse.id).await;
    let sum = ctx
        .core
        .ledger
        .movement_sum(product.id, warehouse.id)
        .await
        .unwrap();
    assert_eq!(quantity, 10);
    assert_eq!(sum, quantity);
}

#[tokio::test]
async fn zero_delta_is_rejected() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-5", false).await;
    let warehouse = common::seed_warehouse(&ctx, "Main").await;

    let err = ctx
        .core
        .ledger
        .adjust(
            product.id,
            warehouse.id,
            0,
            MovementKind::PurchaseReceipt,
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn safety_stock_requires_existing_record() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-6", false).await;
    let warehouse = common::seed_warehouse(&ctx, "Main").await;

    let err = ctx
        .core
        .ledger
        .set_safety_stock(product.id, warehouse.id, 4)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::UnknownStockRecord { .. });

    common::seed_stock(&ctx, product.id, warehouse.id, 10).await;
    let record = ctx
        .core
        .ledger
        .set_safety_stock(product.id, warehouse.id, 4)
        .await
        .unwrap();
    assert_eq!(record.safety_stock, 4);
}

#[tokio::test]
async fn record_with_outbound_history_cannot_be_deleted() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-7", false).await;
    let warehouse = common::seed_warehouse(&ctx, "Main").await;
    common::seed_stock(&ctx, product.id, warehouse.id, 10).await;

    ctx.core
        .ledger
        .adjust(
            product.id,
            warehouse.id,
            -2,
            MovementKind::Withdrawal,
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    let err = ctx
        .core
        .ledger
        .delete_record(product.id, warehouse.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn inbound_only_record_can_be_deleted() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-8", false).await;
    let warehouse = common::seed_warehouse(&ctx, "Main").await;
    common::seed_stock(&ctx, product.id, warehouse.id, 10).await;

    ctx.core
        .ledger
        .delete_record(product.id, warehouse.id)
        .await
        .unwrap();
    assert!(ctx
        .core
        .ledger
        .get_record(product.id, warehouse.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn stale_version_snapshot_fails_with_retryable_conflict() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-10", false).await;
    let warehouse = common::seed_warehouse(&ctx, "Main").await;
    common::seed_stock(&ctx, product.id, warehouse.id, 10).await;

    let stale = ctx
        .core
        .ledger
        .get_record(product.id, warehouse.id)
        .await
        .unwrap()
        .unwrap();

    // Another writer lands in between and bumps the version.
    ctx.core
        .ledger
        .adjust(
            product.id,
            warehouse.id,
            5,
            MovementKind::PurchaseReceipt,
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    let adj = Adjustment::new(
        product.id,
        warehouse.id,
        -4,
        MovementKind::Withdrawal,
        Uuid::new_v4(),
    );
    let err = StockLedgerService::apply_with_snapshot(&*ctx.core.db, &adj, Some(stale))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Conflict(_));
    assert!(err.is_retryable());

    // The failed compare-and-set left no trace: no quantity change, no
    // movement appended.
    assert_eq!(common::on_hand(&ctx, product.id, warehouse.id).await, 15);
    assert_eq!(
        ctx.core
            .ledger
            .movement_sum(product.id, warehouse.id)
            .await
            .unwrap(),
        15
    );
}

#[tokio::test]
async fn total_on_hand_spans_warehouses() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "WIDGET-9", false).await;
    let a = common::seed_warehouse(&ctx, "A").await;
    let b = common::seed_warehouse(&ctx, "B").await;
    common::seed_stock(&ctx, product.id, a.id, 7).await;
    common::seed_stock(&ctx, product.id, b.id, 5).await;

    assert_eq!(ctx.core.ledger.total_on_hand(product.id).await.unwrap(), 12);
}
