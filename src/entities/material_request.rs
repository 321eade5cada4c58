use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Employee proposal to add a material and/or allocate it to a project.
///
/// The catalog fields are a snapshot taken at submission; approval copies them
/// into the new material row verbatim.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "material_requests")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    #[serde(rename = "requestId")]
    pub request_code: String,
    pub employee_id: i32,
    /// Company of the submitting employee at submission time.
    pub company_id: i32,
    pub name: String,
    pub category: String,
    pub unit: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub default_rate: Decimal,
    pub vendor: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub project_id: Option<i32>,
    pub material_id: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity: Option<Decimal>,
    pub status: RequestStatus,
    pub request_date: DateTimeUtc,
    pub reviewed_by: Option<i32>,
    pub review_date: Option<DateTimeUtc>,
    pub approval_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// New catalog material only.
    #[sea_orm(string_value = "GLOBAL")]
    Global,
    /// New catalog material plus an allocation to one project.
    #[sea_orm(string_value = "PROJECT")]
    Project,
    /// Extra quantity of an existing material for one project.
    #[sea_orm(string_value = "PROJECT_MATERIAL")]
    ProjectMaterial,
}

impl RequestType {
    /// Exact wire names only; anything else is not a request type.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GLOBAL" => Some(Self::Global),
            "PROJECT" => Some(Self::Project),
            "PROJECT_MATERIAL" => Some(Self::ProjectMaterial),
            _ => None,
        }
    }

    /// Whether approval creates a new catalog material.
    pub fn creates_material(self) -> bool {
        matches!(self, Self::Global | Self::Project)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::EmployeeId",
        to = "super::user::Column::Id"
    )]
    Employee,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Employee.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
