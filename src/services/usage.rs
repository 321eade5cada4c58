use crate::{
    db::{with_transaction, DbPool},
    entities::{material, material_usage, project, project_material, user},
    errors::ServiceError,
    services::{project_materials, scope},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordUsage {
    pub project_id: i32,
    pub material_id: i32,
    #[schema(example = "20")]
    pub quantity: Decimal,
    pub remarks: Option<String>,
    /// Defaults to now.
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUsage {
    pub quantity: Option<Decimal>,
    pub remarks: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
}

impl From<user::Model> for UserSummary {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogView {
    #[serde(flatten)]
    pub usage: material_usage::Model,
    pub material: Option<material::Model>,
    pub user: Option<UserSummary>,
}

/// Result of a usage write: the log row and the allocation after reconciliation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageOutcome {
    pub usage_log: material_usage::Model,
    pub project_material: project_material::Model,
    /// Set when the allocation is now over-consumed.
    #[serde(skip)]
    pub warning: Option<String>,
}

fn over_allocation_warning(allocation: &project_material::Model) -> Option<String> {
    (allocation.used > allocation.assigned).then(|| {
        format!(
            "Usage exceeds assigned quantity. Assigned: {}, Used: {}",
            allocation.assigned.normalize(),
            allocation.used.normalize()
        )
    })
}

fn ensure_positive(quantity: Decimal) -> Result<(), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Usage logs and their reconciliation against project allocations.
///
/// Every write changes the log row and the allocation's `used` total in one
/// transaction.
#[derive(Clone)]
pub struct UsageService {
    db_pool: Arc<DbPool>,
}

impl UsageService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Loads a log by id; 403 when its project belongs to another company.
    async fn company_log(
        &self,
        company_id: i32,
        usage_id: i32,
    ) -> Result<material_usage::Model, ServiceError> {
        let (usage, owner) = material_usage::Entity::find_by_id(usage_id)
            .find_also_related(project::Entity)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Usage log not found".to_string()))?;

        let owner =
            owner.ok_or_else(|| ServiceError::NotFound("Project not found".to_string()))?;
        scope::ensure_same_company(owner.company_id, company_id)?;
        Ok(usage)
    }

    /// Usage logs of a company project, newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        company_id: i32,
        project_id: i32,
    ) -> Result<Vec<UsageLogView>, ServiceError> {
        let db = &*self.db_pool;
        scope::company_project(db, company_id, project_id).await?;

        let rows = material_usage::Entity::find()
            .filter(material_usage::Column::ProjectId.eq(project_id))
            .find_also_related(material::Entity)
            .order_by_desc(material_usage::Column::Date)
            .order_by_desc(material_usage::Column::Id)
            .all(db)
            .await?;

        let user_ids: Vec<i32> = rows.iter().map(|(usage, _)| usage.user_id).collect();
        let users: HashMap<i32, UserSummary> = user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, UserSummary::from(u)))
            .collect();

        Ok(rows
            .into_iter()
            .map(|(usage, material)| {
                let user = users.get(&usage.user_id).cloned();
                UsageLogView {
                    usage,
                    material,
                    user,
                }
            })
            .collect())
    }

    /// Records consumption against an existing allocation.
    ///
    /// Consumption beyond `assigned` is accepted; the outcome then carries a
    /// warning.
    #[instrument(skip(self, input), fields(project_id = input.project_id, material_id = input.material_id))]
    pub async fn record(
        &self,
        company_id: i32,
        user_id: i32,
        input: RecordUsage,
    ) -> Result<UsageOutcome, ServiceError> {
        ensure_positive(input.quantity)?;
        scope::company_project(&*self.db_pool, company_id, input.project_id).await?;

        let outcome = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                let project_material = project_materials::apply_used_delta(
                    txn,
                    input.project_id,
                    input.material_id,
                    input.quantity,
                )
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(
                        "Material is not assigned to this project".to_string(),
                    )
                })?;

                let usage_log = material_usage::ActiveModel {
                    project_id: Set(input.project_id),
                    material_id: Set(input.material_id),
                    user_id: Set(user_id),
                    quantity: Set(input.quantity),
                    date: Set(input.date.unwrap_or_else(Utc::now)),
                    remarks: Set(input.remarks.filter(|r| !r.trim().is_empty())),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                Ok(UsageOutcome {
                    warning: over_allocation_warning(&project_material),
                    usage_log,
                    project_material,
                })
            })
        })
        .await?;

        if let Some(warning) = &outcome.warning {
            warn!(allocation_id = outcome.project_material.id, "{}", warning);
        }
        info!(
            usage_id = outcome.usage_log.id,
            used = %outcome.project_material.used,
            status = ?outcome.project_material.status,
            "usage recorded"
        );
        Ok(outcome)
    }

    /// Edits a log and moves the allocation's `used` by the quantity difference.
    ///
    /// The log row is rewritten only if it still holds the quantity read at the
    /// start, so two edits racing on the same log cannot both apply their diff.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        company_id: i32,
        usage_id: i32,
        input: UpdateUsage,
    ) -> Result<UsageOutcome, ServiceError> {
        if let Some(quantity) = input.quantity {
            ensure_positive(quantity)?;
        }
        let existing = self.company_log(company_id, usage_id).await?;

        let outcome = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                let old_quantity = existing.quantity;
                let new_quantity = input.quantity.unwrap_or(old_quantity);
                let diff = new_quantity - old_quantity;

                let mut changes = material_usage::ActiveModel {
                    quantity: Set(new_quantity),
                    ..Default::default()
                };
                if let Some(remarks) = input.remarks {
                    changes.remarks = Set(Some(remarks).filter(|r| !r.trim().is_empty()));
                }
                if let Some(date) = input.date {
                    changes.date = Set(date);
                }

                let written = material_usage::Entity::update_many()
                    .set(changes)
                    .filter(material_usage::Column::Id.eq(usage_id))
                    .filter(material_usage::Column::Quantity.eq(old_quantity))
                    .exec(txn)
                    .await?;
                if written.rows_affected == 0 {
                    return Err(ServiceError::Conflict(
                        "Usage log was changed by another request, reload and retry".to_string(),
                    ));
                }

                let usage_log = material_usage::Entity::find_by_id(usage_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Usage log not found".to_string()))?;

                let no_longer_assigned = || {
                    ServiceError::Conflict(
                        "Material is no longer assigned to this project".to_string(),
                    )
                };
                let project_material = (if diff.is_zero() {
                    project_materials::find_allocation(
                        txn,
                        usage_log.project_id,
                        usage_log.material_id,
                    )
                    .await?
                } else {
                    project_materials::apply_used_delta(
                        txn,
                        usage_log.project_id,
                        usage_log.material_id,
                        diff,
                    )
                    .await?
                })
                .ok_or_else(no_longer_assigned)?;

                Ok(UsageOutcome {
                    warning: over_allocation_warning(&project_material),
                    usage_log,
                    project_material,
                })
            })
        })
        .await?;

        info!(usage_id, used = %outcome.project_material.used, "usage updated");
        Ok(outcome)
    }

    /// Removes a log and subtracts its quantity from the allocation, flooring
    /// `used` at zero.
    ///
    /// Like `update`, the delete only matches the quantity read at the start; a
    /// log edited in between is reported as a conflict.
    #[instrument(skip(self))]
    pub async fn delete(&self, company_id: i32, usage_id: i32) -> Result<(), ServiceError> {
        let existing = self.company_log(company_id, usage_id).await?;

        with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                let deleted = material_usage::Entity::delete_many()
                    .filter(material_usage::Column::Id.eq(existing.id))
                    .filter(material_usage::Column::Quantity.eq(existing.quantity))
                    .exec(txn)
                    .await?;
                if deleted.rows_affected == 0 {
                    let still_there = material_usage::Entity::find_by_id(existing.id)
                        .one(txn)
                        .await?
                        .is_some();
                    return Err(if still_there {
                        ServiceError::Conflict(
                            "Usage log was changed by another request, reload and retry"
                                .to_string(),
                        )
                    } else {
                        ServiceError::NotFound("Usage log not found".to_string())
                    });
                }

                let reconciled = project_materials::apply_used_delta(
                    txn,
                    existing.project_id,
                    existing.material_id,
                    -existing.quantity,
                )
                .await?;
                if reconciled.is_none() {
                    warn!(
                        usage_id = existing.id,
                        "deleted usage log had no allocation to reconcile"
                    );
                }
                Ok(())
            })
        })
        .await?;

        info!(usage_id, "usage deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::project_material::MaterialStatus;
    use rust_decimal_macros::dec;

    fn allocation(assigned: Decimal, used: Decimal) -> project_material::Model {
        let now = Utc::now();
        project_material::Model {
            id: 1,
            project_id: 1,
            material_id: 1,
            assigned,
            used,
            status: MaterialStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn warning_only_when_used_exceeds_assigned() {
        assert_eq!(over_allocation_warning(&allocation(dec!(50), dec!(50))), None);
        assert_eq!(
            over_allocation_warning(&allocation(dec!(50.00), dec!(55.50))).as_deref(),
            Some("Usage exceeds assigned quantity. Assigned: 50, Used: 55.5")
        );
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(ensure_positive(dec!(0)).is_err());
        assert!(ensure_positive(dec!(-2)).is_err());
        assert!(ensure_positive(dec!(0.5)).is_ok());
    }
}
