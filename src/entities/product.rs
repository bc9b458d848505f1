use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A sellable product. A product is either *simple* or a *kit*; kits own an
/// ordered set of component relations (`kit_component`).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub sku: String,
    pub name: String,
    /// Global trade item number, when the product carries one.
    pub gtin: Option<String>,
    pub is_kit: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::kit_component::Entity")]
    KitComponent,
    #[sea_orm(has_many = "super::stock_record::Entity")]
    StockRecord,
}

impl Related<super::kit_component::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KitComponent.def()
    }
}

impl Related<super::stock_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
