use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One component relation of a kit: `quantity_per_kit` units of
/// `component_product_id` per assembled kit unit. `position` preserves the
/// kit's component ordering. Cyclic references are rejected at write time.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "kit_components")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub kit_product_id: i64,
    pub component_product_id: i64,
    pub quantity_per_kit: i64,
    pub position: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::KitProductId",
        to = "super::product::Column::Id"
    )]
    Kit,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ComponentProductId",
        to = "super::product::Column::Id"
    )]
    Component,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Kit.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
