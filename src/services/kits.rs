use std::collections::HashMap;
use std::sync::Arc;

use async_recursion::async_recursion;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::instrument;

use crate::{
    db::DbPool,
    entities::{
        kit_component::{self, Entity as KitComponentEntity},
        product::Entity as ProductEntity,
    },
    errors::ServiceError,
};

/// Nesting levels tolerated when flattening kits of kits. Exceeding this is
/// treated as an undetected cyclic kit definition.
pub const MAX_KIT_DEPTH: u32 = 8;

/// A flattened requirement: `quantity` units of a simple product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRequirement {
    pub product_id: i64,
    pub quantity: i64,
}

/// Resolves composite products into their simple components. Pure reads over
/// catalog data; no stock side effects.
#[derive(Clone)]
pub struct KitService {
    db: Arc<DbPool>,
}

impl KitService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Expands `quantity` units of a kit into total quantities of simple
    /// component products, flattening nested kits. Requirements for the same
    /// component are aggregated; output order follows first appearance in
    /// the kit definition, so repeated expansion of the same kit is
    /// identical.
    #[instrument(skip(self))]
    pub async fn expand(
        &self,
        kit_product_id: i64,
        quantity: i64,
    ) -> Result<Vec<ComponentRequirement>, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "kit quantity must be positive".into(),
            ));
        }

        let db = &*self.db;
        let kit = ProductEntity::find_by_id(kit_product_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::ProductNotFound(format!("id {}", kit_product_id)))?;
        if !kit.is_kit {
            return Err(ServiceError::ValidationError(format!(
                "product {} is not a kit",
                kit_product_id
            )));
        }

        let mut raw = Vec::new();
        self.expand_into(kit_product_id, quantity, 1, &mut raw)
            .await?;

        // Aggregate duplicates, preserving first-seen order.
        let mut by_product: HashMap<i64, usize> = HashMap::new();
        let mut merged: Vec<ComponentRequirement> = Vec::new();
        for req in raw {
            match by_product.get(&req.product_id) {
                Some(&idx) => merged[idx].quantity += req.quantity,
                None => {
                    by_product.insert(req.product_id, merged.len());
                    merged.push(req);
                }
            }
        }

        Ok(merged)
    }

    #[async_recursion]
    async fn expand_into(
        &self,
        kit_product_id: i64,
        multiplier: i64,
        depth: u32,
        out: &mut Vec<ComponentRequirement>,
    ) -> Result<(), ServiceError> {
        if depth > MAX_KIT_DEPTH {
            return Err(ServiceError::KitTooDeep {
                product_id: kit_product_id,
                max_depth: MAX_KIT_DEPTH,
            });
        }

        let db = &*self.db;
        let components = KitComponentEntity::find()
            .filter(kit_component::Column::KitProductId.eq(kit_product_id))
            .order_by_asc(kit_component::Column::Position)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        for component in components {
            let total = component
                .quantity_per_kit
                .checked_mul(multiplier)
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "component quantity overflow expanding kit {}",
                        kit_product_id
                    ))
                })?;
            let child = ProductEntity::find_by_id(component.component_product_id)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::ProductNotFound(format!(
                        "id {}",
                        component.component_product_id
                    ))
                })?;

            if child.is_kit {
                self.expand_into(child.id, total, depth + 1, out).await?;
            } else {
                out.push(ComponentRequirement {
                    product_id: child.id,
                    quantity: total,
                });
            }
        }

        Ok(())
    }
}
