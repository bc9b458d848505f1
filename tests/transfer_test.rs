mod common;

use assert_matches::assert_matches;

use stockroom_core::{errors::ServiceError, services::transfers::TransferLine};

#[tokio::test]
async fn transfer_conserves_total_stock() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "MOVE-1", false).await;
    let a = common::seed_warehouse(&ctx, "A").await;
    let b = common::seed_warehouse(&ctx, "B").await;
    common::seed_stock(&ctx, product.id, a.id, 10).await;
    common::seed_stock(&ctx, product.id, b.id, 2).await;

    ctx.core
        .transfers
        .transfer(
            a.id,
            b.id,
            vec![TransferLine {
                product_id: product.id,
                quantity: 4,
            }],
        )
        .await
        .unwrap();

    assert_eq!(common::on_hand(&ctx, product.id, a.id).await, 6);
    assert_eq!(common::on_hand(&ctx, product.id, b.id).await, 6);
    assert_eq!(ctx.core.ledger.total_on_hand(product.id).await.unwrap(), 12);
}

#[tokio::test]
async fn destination_record_is_created_lazily() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "MOVE-2", false).await;
    let a = common::seed_warehouse(&ctx, "A").await;
    let b = common::seed_warehouse(&ctx, "B").await;
    common::seed_stock(&ctx, product.id, a.id, 5).await;

    ctx.core
        .transfers
        .transfer(
            a.id,
            b.id,
            vec![TransferLine {
                product_id: product.id,
                quantity: 5,
            }],
        )
        .await
        .unwrap();

    let dest = ctx
        .core
        .ledger
        .get_record(product.id, b.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dest.quantity, 5);
    assert_eq!(dest.safety_stock, 0);
}

#[tokio::test]
async fn same_warehouse_transfer_is_rejected() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "MOVE-3", false).await;
    let a = common::seed_warehouse(&ctx, "A").await;

    let err = ctx
        .core
        .transfers
        .transfer(
            a.id,
            a.id,
            vec![TransferLine {
                product_id: product.id,
                quantity: 1,
            }],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn insufficient_source_stock_aborts_the_whole_transfer() {
    let ctx = common::setup().await;
    let p1 = common::seed_product(&ctx, "MOVE-4A", false).await;
    let p2 = common::seed_product(&ctx, "MOVE-4B", false).await;
    let a = common::seed_warehouse(&ctx, "A").await;
    let b = common::seed_warehouse(&ctx, "B").await;
    common::seed_stock(&ctx, p1.id, a.id, 10).await;
    common::seed_stock(&ctx, p2.id, a.id, 1).await;

    let err = ctx
        .core
        .transfers
        .transfer(
            a.id,
            b.id,
            vec![
                TransferLine {
                    product_id: p1.id,
                    quantity: 3,
                },
                TransferLine {
                    product_id: p2.id,
                    quantity: 2,
                },
            ],
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock { .. });
    assert_eq!(common::on_hand(&ctx, p1.id, a.id).await, 10);
    assert_eq!(common::on_hand(&ctx, p1.id, b.id).await, 0);
    assert_eq!(common::on_hand(&ctx, p2.id, a.id).await, 1);
}

#[tokio::test]
async fn transfer_movements_share_one_correlation_id() {
    let ctx = common::setup().await;
    let product = common::seed_product(&ctx, "MOVE-5", false).await;
    let a = common::seed_warehouse(&ctx, "A").await;
    let b = common::seed_warehouse(&ctx, "B").await;
    common::seed_stock(&ctx, product.id, a.id, 8).await;

    let receipt = ctx
        .core
        .transfers
        .transfer(
            a.id,
            b.id,
            vec![TransferLine {
                product_id: product.id,
                quantity: 3,
            }],
        )
        .await
        .unwrap();

    let movements = ctx
        .core
        .ledger
        .movements_by_correlation(receipt.correlation_id)
        .await
        .unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements.iter().map(|m| m.delta).sum::<i64>(), 0);
}

#[tokio::test]
async fn unknown_product_is_rejected_before_any_write() {
    let ctx = common::setup().await;
    let a = common::seed_warehouse(&ctx, "A").await;
    let b = common::seed_warehouse(&ctx, "B").await;

    let err = ctx
        .core
        .transfers
        .transfer(
            a.id,
            b.id,
            vec![TransferLine {
                product_id: 9999,
                quantity: 1,
            }],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProductNotFound(_));
}
