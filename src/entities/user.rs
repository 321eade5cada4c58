use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;

/// Every person who can act in the system. Engineers are users with the
/// `Site_Engineer` role plus an `engineers` profile row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// Engineers created by an admin log in by username and carry no email.
    #[sea_orm(unique)]
    pub email: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub company_id: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum UserRole {
    #[sea_orm(string_value = "Admin")]
    #[serde(rename = "Admin")]
    #[strum(serialize = "Admin")]
    Admin,
    #[sea_orm(string_value = "Site_Engineer")]
    #[serde(rename = "Site_Engineer")]
    #[strum(serialize = "Site_Engineer")]
    SiteEngineer,
}

impl UserRole {
    /// Parses a role name the way clients send it, ignoring case.
    pub fn parse_loose(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        [Self::Admin, Self::SiteEngineer]
            .into_iter()
            .find(|role| role.to_string().eq_ignore_ascii_case(trimmed))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::company::Entity",
        from = "Column::CompanyId",
        to = "super::company::Column::Id"
    )]
    Company,
    #[sea_orm(has_one = "super::engineer::Entity")]
    Engineer,
}

impl Related<super::company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Company.def()
    }
}

impl Related<super::engineer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Engineer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
