mod common;

use assert_matches::assert_matches;

use stockroom_core::errors::ServiceError;

#[tokio::test]
async fn flat_kit_expands_to_scaled_components() {
    let ctx = common::setup().await;
    let a = common::seed_product(&ctx, "EXP-A", false).await;
    let b = common::seed_product(&ctx, "EXP-B", false).await;
    let kit = common::seed_product(&ctx, "EXP-KIT", true).await;
    ctx.core
        .catalog
        .add_kit_component(kit.id, a.id, 2, 0)
        .await
        .unwrap();
    ctx.core
        .catalog
        .add_kit_component(kit.id, b.id, 3, 1)
        .await
        .unwrap();

    let components = ctx.core.kits.expand(kit.id, 4).await.unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0].product_id, a.id);
    assert_eq!(components[0].quantity, 8);
    assert_eq!(components[1].product_id, b.id);
    assert_eq!(components[1].quantity, 12);
}

#[tokio::test]
async fn nested_kits_flatten_and_aggregate_shared_components() {
    // outer = 1 inner + 1 shared; inner = 2 shared.
    let ctx = common::setup().await;
    let shared = common::seed_product(&ctx, "NEST-SHARED", false).await;
    let inner = common::seed_product(&ctx, "NEST-INNER", true).await;
    let outer = common::seed_product(&ctx, "NEST-OUTER", true).await;
    ctx.core
        .catalog
        .add_kit_component(inner.id, shared.id, 2, 0)
        .await
        .unwrap();
    ctx.core
        .catalog
        .add_kit_component(outer.id, inner.id, 1, 0)
        .await
        .unwrap();
    ctx.core
        .catalog
        .add_kit_component(outer.id, shared.id, 1, 1)
        .await
        .unwrap();

    let components = ctx.core.kits.expand(outer.id, 2).await.unwrap();
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].product_id, shared.id);
    // 2 outer = 2 inner + 2 shared = 4 shared + 2 shared.
    assert_eq!(components[0].quantity, 6);
}

#[tokio::test]
async fn repeated_expansion_is_identical() {
    let ctx = common::setup().await;
    let a = common::seed_product(&ctx, "REP-A", false).await;
    let b = common::seed_product(&ctx, "REP-B", false).await;
    let kit = common::seed_product(&ctx, "REP-KIT", true).await;
    ctx.core
        .catalog
        .add_kit_component(kit.id, b.id, 1, 0)
        .await
        .unwrap();
    ctx.core
        .catalog
        .add_kit_component(kit.id, a.id, 5, 1)
        .await
        .unwrap();

    let first = ctx.core.kits.expand(kit.id, 3).await.unwrap();
    let second = ctx.core.kits.expand(kit.id, 3).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn expansion_beyond_max_depth_is_rejected() {
    // A chain of nine nested kits ending in a simple product.
    let ctx = common::setup().await;
    let simple = common::seed_product(&ctx, "DEEP-LEAF", false).await;
    let mut child = simple.id;
    let mut top = simple.id;
    for level in 0..9 {
        let kit = common::seed_product(&ctx, &format!("DEEP-{}", level), true).await;
        ctx.core
            .catalog
            .add_kit_component(kit.id, child, 1, 0)
            .await
            .unwrap();
        child = kit.id;
        top = kit.id;
    }

    let err = ctx.core.kits.expand(top, 1).await.unwrap_err();
    assert_matches!(err, ServiceError::KitTooDeep { max_depth: 8, .. });
}

#[tokio::test]
async fn expanding_a_simple_product_is_rejected() {
    let ctx = common::setup().await;
    let simple = common::seed_product(&ctx, "NOT-A-KIT", false).await;

    let err = ctx.core.kits.expand(simple.id, 1).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn oversized_component_quantity_is_rejected_not_wrapped() {
    let ctx = common::setup().await;
    let part = common::seed_product(&ctx, "HUGE-PART", false).await;
    let kit = common::seed_product(&ctx, "HUGE-KIT", true).await;
    ctx.core
        .catalog
        .add_kit_component(kit.id, part.id, i64::MAX, 0)
        .await
        .unwrap();

    let err = ctx.core.kits.expand(kit.id, 2).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn cyclic_kit_definition_is_rejected_at_write_time() {
    let ctx = common::setup().await;
    let a = common::seed_product(&ctx, "CYC-A", true).await;
    let b = common::seed_product(&ctx, "CYC-B", true).await;
    ctx.core
        .catalog
        .add_kit_component(a.id, b.id, 1, 0)
        .await
        .unwrap();

    let err = ctx
        .core
        .catalog
        .add_kit_component(b.id, a.id, 1, 0)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = ctx
        .core
        .catalog
        .add_kit_component(a.id, a.id, 1, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
