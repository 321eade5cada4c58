use crate::{
    db::DbPool,
    entities::{
        material, project,
        project_material::{self, MaterialStatus},
    },
    errors::ServiceError,
    services::scope,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

/// Status of an allocation for a given (assigned, used) pair.
///
/// This is the only place allocation status is decided; every write to
/// `assigned` or `used` stores its result.
pub fn derive_status(assigned: Decimal, used: Decimal) -> MaterialStatus {
    if used.is_zero() {
        MaterialStatus::NotUsed
    } else if used >= assigned {
        MaterialStatus::Completed
    } else {
        MaterialStatus::Active
    }
}

/// Allocation row with the computed remaining quantity and its material.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationView {
    #[serde(flatten)]
    pub allocation: project_material::Model,
    pub remaining: Decimal,
    pub material: Option<material::Model>,
}

impl AllocationView {
    pub fn new(allocation: project_material::Model, material: Option<material::Model>) -> Self {
        Self {
            remaining: allocation.remaining(),
            allocation,
            material,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddProjectMaterial {
    pub project_id: i32,
    pub material_id: i32,
    #[schema(example = "50")]
    pub assigned: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectMaterial {
    pub assigned: Option<Decimal>,
}

pub(crate) async fn find_allocation<C>(
    db: &C,
    project_id: i32,
    material_id: i32,
) -> Result<Option<project_material::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(project_material::Entity::find()
        .filter(project_material::Column::ProjectId.eq(project_id))
        .filter(project_material::Column::MaterialId.eq(material_id))
        .one(db)
        .await?)
}

/// Inserts a fresh allocation with nothing used yet.
pub(crate) async fn insert_allocation<C>(
    db: &C,
    project_id: i32,
    material_id: i32,
    assigned: Decimal,
) -> Result<project_material::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let row = project_material::ActiveModel {
        project_id: Set(project_id),
        material_id: Set(material_id),
        assigned: Set(assigned),
        used: Set(Decimal::ZERO),
        status: Set(derive_status(assigned, Decimal::ZERO)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(row)
}

/// Stores `assigned` on an allocation and recomputes its status.
pub(crate) async fn set_assigned<C>(
    db: &C,
    allocation: project_material::Model,
    assigned: Decimal,
) -> Result<project_material::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let used = allocation.used;
    let mut active: project_material::ActiveModel = allocation.into();
    active.assigned = Set(assigned);
    active.status = Set(derive_status(assigned, used));
    active.updated_at = Set(Utc::now());
    Ok(active.update(db).await?)
}

/// Adds `delta` to the `used` total of the (project, material) allocation and
/// recomputes its status. Returns `None` when no such allocation exists.
///
/// The increment is a single `used = used + delta` statement. Callers issue it
/// before any read in their transaction, so the transaction holds the write
/// lock from its first statement and concurrent callers queue on that lock
/// instead of failing on a lock upgrade. A total that would go below zero is
/// floored at zero and logged.
pub(crate) async fn apply_used_delta<C>(
    db: &C,
    project_id: i32,
    material_id: i32,
    delta: Decimal,
) -> Result<Option<project_material::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let result = project_material::Entity::update_many()
        .col_expr(
            project_material::Column::Used,
            Expr::col(project_material::Column::Used).add(delta),
        )
        .col_expr(project_material::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(project_material::Column::ProjectId.eq(project_id))
        .filter(project_material::Column::MaterialId.eq(material_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Ok(None);
    }

    let row = find_allocation(db, project_id, material_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Project material not found".to_string()))?;

    let used = if row.used < Decimal::ZERO {
        warn!(
            allocation_id = row.id,
            drift = %row.used,
            "used total fell below zero, clamping to zero"
        );
        Decimal::ZERO
    } else {
        row.used
    };

    let status = derive_status(row.assigned, used);
    if used == row.used && status == row.status {
        return Ok(Some(row));
    }

    let mut active: project_material::ActiveModel = row.into();
    active.used = Set(used);
    active.status = Set(status);
    Ok(Some(active.update(db).await?))
}

fn ensure_non_negative(value: Decimal, field: &str) -> Result<(), ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} cannot be negative",
            field
        )));
    }
    Ok(())
}

/// Allocation of catalog materials to projects
#[derive(Clone)]
pub struct ProjectMaterialService {
    db_pool: Arc<DbPool>,
}

impl ProjectMaterialService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Loads an allocation by id; 403 when its project belongs to another company.
    async fn company_allocation(
        &self,
        company_id: i32,
        allocation_id: i32,
    ) -> Result<project_material::Model, ServiceError> {
        let (allocation, owner) = project_material::Entity::find_by_id(allocation_id)
            .find_also_related(project::Entity)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Project material not found".to_string()))?;

        let owner =
            owner.ok_or_else(|| ServiceError::NotFound("Project not found".to_string()))?;
        scope::ensure_same_company(owner.company_id, company_id)?;
        Ok(allocation)
    }

    async fn view(&self, allocation: project_material::Model) -> Result<AllocationView, ServiceError> {
        let material = material::Entity::find_by_id(allocation.material_id)
            .one(&*self.db_pool)
            .await?;
        Ok(AllocationView::new(allocation, material))
    }

    /// Allocations of one company project, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_project(
        &self,
        company_id: i32,
        project_id: i32,
    ) -> Result<Vec<AllocationView>, ServiceError> {
        let db = &*self.db_pool;
        scope::company_project(db, company_id, project_id).await?;

        let rows = project_material::Entity::find()
            .filter(project_material::Column::ProjectId.eq(project_id))
            .find_also_related(material::Entity)
            .order_by_desc(project_material::Column::CreatedAt)
            .order_by_desc(project_material::Column::Id)
            .all(db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(allocation, material)| AllocationView::new(allocation, material))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn add(
        &self,
        company_id: i32,
        input: AddProjectMaterial,
    ) -> Result<AllocationView, ServiceError> {
        ensure_non_negative(input.assigned, "Assigned quantity")?;
        let db = &*self.db_pool;

        scope::company_project(db, company_id, input.project_id).await?;
        let material = scope::company_material(db, company_id, input.material_id).await?;

        if find_allocation(db, input.project_id, input.material_id)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(
                "Material already assigned to this project".to_string(),
            ));
        }

        let allocation =
            match insert_allocation(db, input.project_id, input.material_id, input.assigned).await {
                Err(e) if e.is_unique_violation() => {
                    return Err(ServiceError::Conflict(
                        "Material already assigned to this project".to_string(),
                    ))
                }
                other => other?,
            };

        info!(
            allocation_id = allocation.id,
            project_id = allocation.project_id,
            material_id = allocation.material_id,
            "material assigned to project"
        );
        Ok(AllocationView::new(allocation, Some(material)))
    }

    /// Adjusts `assigned`; `used` only changes through usage logs.
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        company_id: i32,
        allocation_id: i32,
        input: UpdateProjectMaterial,
    ) -> Result<AllocationView, ServiceError> {
        let allocation = self.company_allocation(company_id, allocation_id).await?;

        let allocation = match input.assigned {
            Some(assigned) => {
                ensure_non_negative(assigned, "Assigned quantity")?;
                set_assigned(&*self.db_pool, allocation, assigned).await?
            }
            None => allocation,
        };

        self.view(allocation).await
    }

    /// Removes an allocation that has never been consumed.
    ///
    /// The `used = 0` condition is part of the delete itself, so usage recorded
    /// after the ownership check still blocks the removal.
    #[instrument(skip(self))]
    pub async fn remove(&self, company_id: i32, allocation_id: i32) -> Result<(), ServiceError> {
        let allocation = self.company_allocation(company_id, allocation_id).await?;

        let deleted = project_material::Entity::delete_many()
            .filter(project_material::Column::Id.eq(allocation.id))
            .filter(project_material::Column::Used.lte(Decimal::ZERO))
            .exec(&*self.db_pool)
            .await?;
        if deleted.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Cannot remove material that has usage records".to_string(),
            ));
        }

        info!(allocation_id, "allocation removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(10), dec!(0), MaterialStatus::NotUsed)]
    #[case(dec!(10), dec!(5), MaterialStatus::Active)]
    #[case(dec!(10), dec!(10), MaterialStatus::Completed)]
    #[case(dec!(10), dec!(15), MaterialStatus::Completed)]
    #[case(dec!(0), dec!(0), MaterialStatus::NotUsed)]
    #[case(dec!(10.5), dec!(10.25), MaterialStatus::Active)]
    fn status_boundaries(
        #[case] assigned: Decimal,
        #[case] used: Decimal,
        #[case] expected: MaterialStatus,
    ) {
        assert_eq!(derive_status(assigned, used), expected);
        assert_eq!(derive_status(assigned, used), derive_status(assigned, used));
    }

    #[test]
    fn view_computes_remaining() {
        let now = Utc::now();
        let row = project_material::Model {
            id: 1,
            project_id: 3,
            material_id: 7,
            assigned: dec!(50),
            used: dec!(20),
            status: MaterialStatus::Active,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(AllocationView::new(row, None).remaining, dec!(30));
    }

    proptest! {
        #[test]
        fn status_matches_its_definition(assigned in 0u32..10_000, used in 0u32..20_000) {
            let (a, u) = (Decimal::from(assigned), Decimal::from(used));
            let status = derive_status(a, u);
            prop_assert_eq!(status == MaterialStatus::NotUsed, used == 0);
            prop_assert_eq!(status == MaterialStatus::Completed, used != 0 && used >= assigned);
            prop_assert_eq!(status == MaterialStatus::Active, used != 0 && used < assigned);
        }
    }

    #[test]
    fn negative_quantities_are_rejected() {
        assert!(ensure_non_negative(dec!(-1), "Assigned quantity").is_err());
        assert!(ensure_non_negative(dec!(0), "Assigned quantity").is_ok());
    }
}
