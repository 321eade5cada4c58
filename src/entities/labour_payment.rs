use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "labour_payments")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub labour_id: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount: Decimal,
    pub date: DateTimeUtc,
    pub remarks: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::labour::Entity",
        from = "Column::LabourId",
        to = "super::labour::Column::Id",
        on_delete = "Cascade"
    )]
    Labour,
}

impl Related<super::labour::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Labour.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
