use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::{info, instrument};

use crate::{
    db::DbPool,
    entities::{
        kit_component::{self, Entity as KitComponentEntity},
        product::{self, Entity as ProductEntity},
        warehouse::{self, Entity as WarehouseEntity},
    },
    errors::ServiceError,
};

/// Catalog reads and product/kit maintenance. Resolves SKU to product,
/// exposes kit component lists, and enforces that kit definitions stay
/// acyclic at write time.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        sku: String,
        name: String,
        gtin: Option<String>,
        is_kit: bool,
    ) -> Result<product::Model, ServiceError> {
        if sku.trim().is_empty() {
            return Err(ServiceError::ValidationError("sku cannot be empty".into()));
        }
        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError("name cannot be empty".into()));
        }

        let db = &*self.db;
        let created = product::ActiveModel {
            sku: Set(sku),
            name: Set(name),
            gtin: Set(gtin),
            is_kit: Set(is_kit),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(product_id = created.id, sku = %created.sku, "product created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn create_warehouse(
        &self,
        name: String,
        owner_id: i64,
    ) -> Result<warehouse::Model, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError("name cannot be empty".into()));
        }

        let db = &*self.db;
        let created = warehouse::ActiveModel {
            name: Set(name),
            owner_id: Set(owner_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(warehouse_id = created.id, "warehouse created");
        Ok(created)
    }

    pub async fn get_product(&self, id: i64) -> Result<product::Model, ServiceError> {
        let db = &*self.db;
        ProductEntity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::ProductNotFound(format!("id {}", id)))
    }

    pub async fn find_by_sku(&self, sku: &str) -> Result<product::Model, ServiceError> {
        let db = &*self.db;
        ProductEntity::find()
            .filter(product::Column::Sku.eq(sku))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::ProductNotFound(format!("sku {}", sku)))
    }

    /// Component relations of a kit, in definition order.
    pub async fn components_of(
        &self,
        kit_product_id: i64,
    ) -> Result<Vec<kit_component::Model>, ServiceError> {
        let db = &*self.db;
        KitComponentEntity::find()
            .filter(kit_component::Column::KitProductId.eq(kit_product_id))
            .order_by_asc(kit_component::Column::Position)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Adds a component relation to a kit. The relation is rejected when it
    /// would let the kit contain itself, directly or transitively.
    #[instrument(skip(self))]
    pub async fn add_kit_component(
        &self,
        kit_product_id: i64,
        component_product_id: i64,
        quantity_per_kit: i64,
        position: i32,
    ) -> Result<kit_component::Model, ServiceError> {
        if quantity_per_kit <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity_per_kit must be positive".into(),
            ));
        }
        if kit_product_id == component_product_id {
            return Err(ServiceError::ValidationError(
                "a kit cannot contain itself".into(),
            ));
        }

        let kit = self.get_product(kit_product_id).await?;
        if !kit.is_kit {
            return Err(ServiceError::ValidationError(format!(
                "product {} is not a kit",
                kit_product_id
            )));
        }
        // Component must exist; it may itself be a kit.
        let _component = self.get_product(component_product_id).await?;

        if self
            .reaches(component_product_id, kit_product_id)
            .await?
        {
            return Err(ServiceError::ValidationError(format!(
                "adding product {} to kit {} would create a cyclic kit definition",
                component_product_id, kit_product_id
            )));
        }

        let db = &*self.db;
        let created = kit_component::ActiveModel {
            kit_product_id: Set(kit_product_id),
            component_product_id: Set(component_product_id),
            quantity_per_kit: Set(quantity_per_kit),
            position: Set(position),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(
            kit_product_id,
            component_product_id, quantity_per_kit, "kit component added"
        );
        Ok(created)
    }

    /// Whether `target` is reachable from `start` through component relations.
    async fn reaches(&self, start: i64, target: i64) -> Result<bool, ServiceError> {
        let db = &*self.db;
        let mut visited: HashSet<i64> = HashSet::new();
        let mut queue = vec![start];

        while let Some(current) = queue.pop() {
            if current == target {
                return Ok(true);
            }
            if !visited.insert(current) {
                continue;
            }
            let children = KitComponentEntity::find()
                .filter(kit_component::Column::KitProductId.eq(current))
                .all(db)
                .await
                .map_err(ServiceError::db_error)?;
            for child in children {
                queue.push(child.component_product_id);
            }
        }

        Ok(false)
    }
}
