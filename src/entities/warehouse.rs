use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Pure location marker; stock lives in `stock_record` rows keyed by
/// (product, warehouse).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "warehouses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_record::Entity")]
    StockRecord,
}

impl Related<super::stock_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
