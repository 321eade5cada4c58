//! Company-scoped lookups. A row owned by another company reads as absent.

use crate::entities::{material, project};
use crate::errors::ServiceError;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

pub async fn company_project<C>(
    db: &C,
    company_id: i32,
    project_id: i32,
) -> Result<project::Model, ServiceError>
where
    C: ConnectionTrait,
{
    project::Entity::find_by_id(project_id)
        .filter(project::Column::CompanyId.eq(company_id))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Project not found".to_string()))
}

pub async fn company_material<C>(
    db: &C,
    company_id: i32,
    material_id: i32,
) -> Result<material::Model, ServiceError>
where
    C: ConnectionTrait,
{
    material::Entity::find_by_id(material_id)
        .filter(material::Column::CompanyId.eq(company_id))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Material not found".to_string()))
}

/// Fails with 403 when a row reached by id belongs to another company.
pub fn ensure_same_company(owner_company_id: i32, caller_company_id: i32) -> Result<(), ServiceError> {
    if owner_company_id == caller_company_id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("Unauthorized".to_string()))
    }
}
