use crate::{
    db::DbPool,
    entities::{contract, project},
    errors::ServiceError,
    services::{present_or_null, scope},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

pub const DEFAULT_WORK_STATUS: &str = "Pending";

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateContract {
    pub project_id: Option<i32>,
    #[serde(default)]
    #[validate(length(min = 1, message = "Contractor name is required"))]
    pub contractor_name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Contact number is required"))]
    pub contact_number: String,
    pub contract_amount: Option<Decimal>,
    pub work_status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContract {
    pub project_id: Option<i32>,
    pub contractor_name: Option<String>,
    pub contact_number: Option<String>,
    pub contract_amount: Option<Decimal>,
    pub work_status: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub details: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    #[serde(flatten)]
    pub contract: contract::Model,
    pub project_name: Option<String>,
}

fn ensure_amount(amount: Decimal) -> Result<(), ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Contract amount cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Subcontractor agreements attached to company projects
#[derive(Clone)]
pub struct ContractService {
    db_pool: Arc<DbPool>,
}

impl ContractService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    async fn company_contract(
        &self,
        company_id: i32,
        contract_id: i32,
    ) -> Result<(contract::Model, Option<project::Model>), ServiceError> {
        contract::Entity::find_by_id(contract_id)
            .filter(contract::Column::CompanyId.eq(company_id))
            .find_also_related(project::Entity)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Contract not found".to_string()))
    }

    fn view((contract, project): (contract::Model, Option<project::Model>)) -> ContractView {
        ContractView {
            project_name: project.map(|p| p.name),
            contract,
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, company_id: i32) -> Result<Vec<ContractView>, ServiceError> {
        let rows = contract::Entity::find()
            .filter(contract::Column::CompanyId.eq(company_id))
            .find_also_related(project::Entity)
            .order_by_desc(contract::Column::CreatedAt)
            .order_by_desc(contract::Column::Id)
            .all(&*self.db_pool)
            .await?;
        Ok(rows.into_iter().map(Self::view).collect())
    }

    #[instrument(skip(self))]
    pub async fn list_for_project(
        &self,
        company_id: i32,
        project_id: i32,
    ) -> Result<Vec<ContractView>, ServiceError> {
        let db = &*self.db_pool;
        let owner = scope::company_project(db, company_id, project_id).await?;
        let rows = contract::Entity::find()
            .filter(contract::Column::ProjectId.eq(owner.id))
            .order_by_desc(contract::Column::CreatedAt)
            .order_by_desc(contract::Column::Id)
            .all(db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|contract| ContractView {
                contract,
                project_name: Some(owner.name.clone()),
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, company_id: i32, contract_id: i32) -> Result<ContractView, ServiceError> {
        Ok(Self::view(self.company_contract(company_id, contract_id).await?))
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        company_id: i32,
        input: CreateContract,
    ) -> Result<ContractView, ServiceError> {
        input.validate()?;
        let (project_id, amount) = match (input.project_id, input.contract_amount) {
            (Some(project_id), Some(amount)) => (project_id, amount),
            _ => {
                return Err(ServiceError::ValidationError(
                    "Missing required fields: projectId, contractorName, contactNumber, contractAmount"
                        .to_string(),
                ))
            }
        };
        ensure_amount(amount)?;

        let db = &*self.db_pool;
        let owner = scope::company_project(db, company_id, project_id).await?;

        let now = Utc::now();
        let created = contract::ActiveModel {
            company_id: Set(company_id),
            project_id: Set(owner.id),
            contractor_name: Set(input.contractor_name.trim().to_string()),
            contact_number: Set(input.contact_number.trim().to_string()),
            contract_amount: Set(amount),
            work_status: Set(non_empty(input.work_status)
                .unwrap_or_else(|| DEFAULT_WORK_STATUS.to_string())),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            details: Set(non_empty(input.details)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(contract_id = created.id, project_id, "contract created");
        Ok(ContractView {
            contract: created,
            project_name: Some(owner.name),
        })
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        company_id: i32,
        contract_id: i32,
        input: UpdateContract,
    ) -> Result<ContractView, ServiceError> {
        let (existing, _) = self.company_contract(company_id, contract_id).await?;
        let db = &*self.db_pool;

        let mut active: contract::ActiveModel = existing.into();
        if let Some(project_id) = input.project_id {
            let owner = scope::company_project(db, company_id, project_id).await?;
            active.project_id = Set(owner.id);
        }
        if let Some(name) = non_empty(input.contractor_name) {
            active.contractor_name = Set(name);
        }
        if let Some(number) = non_empty(input.contact_number) {
            active.contact_number = Set(number);
        }
        if let Some(amount) = input.contract_amount {
            ensure_amount(amount)?;
            active.contract_amount = Set(amount);
        }
        if let Some(status) = non_empty(input.work_status) {
            active.work_status = Set(status);
        }
        if let Some(start) = input.start_date {
            active.start_date = Set(start);
        }
        if let Some(end) = input.end_date {
            active.end_date = Set(end);
        }
        if let Some(details) = input.details {
            active.details = Set(non_empty(details));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        info!(contract_id, "contract updated");
        self.get(company_id, updated.id).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, company_id: i32, contract_id: i32) -> Result<(), ServiceError> {
        let (existing, _) = self.company_contract(company_id, contract_id).await?;
        contract::Entity::delete_by_id(existing.id)
            .exec(&*self.db_pool)
            .await?;
        info!(contract_id, "contract deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_may_be_zero_but_not_negative() {
        assert!(ensure_amount(dec!(0)).is_ok());
        assert!(ensure_amount(dec!(-10)).is_err());
    }

    #[test]
    fn blank_status_falls_back_to_default() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(
            non_empty(Some(" In Progress ".into())).as_deref(),
            Some("In Progress")
        );
    }
}
