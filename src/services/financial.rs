use crate::{
    db::DbPool,
    entities::{
        project::{self, ProjectStatus},
        project_expense,
    },
    errors::ServiceError,
    services::{codes, scope},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBudgetProject {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub budget: Option<Decimal>,
    pub quotation_amount: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseLine {
    pub id: i32,
    pub category: String,
    pub amount: Decimal,
}

impl From<project_expense::Model> for ExpenseLine {
    fn from(expense: project_expense::Model) -> Self {
        Self {
            id: expense.id,
            category: expense.category,
            amount: expense.amount,
        }
    }
}

/// A project seen from the budget side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetProject {
    pub id: i32,
    pub name: String,
    pub budget: Decimal,
    pub due_date: Option<NaiveDate>,
    pub quotation_amount: Decimal,
    pub expenses: Vec<ExpenseLine>,
}

impl BudgetProject {
    /// Missing budget reads as zero; missing due date falls back to the end
    /// date; missing quotation falls back to the budget.
    pub fn new(project: project::Model, expenses: Vec<ExpenseLine>) -> Self {
        let budget = project.budget.unwrap_or(Decimal::ZERO);
        Self {
            id: project.id,
            name: project.name,
            budget,
            due_date: project.due_date.or(project.end_date),
            quotation_amount: project.quotation_amount.unwrap_or(budget),
            expenses,
        }
    }

    pub fn spent(&self) -> Decimal {
        self.expenses.iter().map(|e| e.amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub total_budget: Decimal,
    pub total_spent: Decimal,
    pub total_remaining: Decimal,
    pub total_projects: usize,
    pub projects_over_budget: usize,
    /// Percent of the total budget spent, two decimals.
    pub utilization_percentage: Decimal,
}

pub fn summarize(projects: &[BudgetProject]) -> FinancialSummary {
    let total_budget: Decimal = projects.iter().map(|p| p.budget).sum();
    let total_spent: Decimal = projects.iter().map(BudgetProject::spent).sum();
    let utilization_percentage = if total_budget.is_zero() {
        Decimal::ZERO
    } else {
        (total_spent / total_budget * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    };

    FinancialSummary {
        total_budget,
        total_spent,
        total_remaining: total_budget - total_spent,
        total_projects: projects.len(),
        projects_over_budget: projects.iter().filter(|p| p.spent() > p.budget).count(),
        utilization_percentage,
    }
}

fn ensure_positive_amount(amount: Option<Decimal>) -> Result<Decimal, ServiceError> {
    match amount {
        Some(amount) if amount > Decimal::ZERO => Ok(amount),
        Some(_) => Err(ServiceError::ValidationError(
            "Amount must be greater than zero".to_string(),
        )),
        None => Err(ServiceError::ValidationError(
            "Category and amount are required".to_string(),
        )),
    }
}

fn generated_project_code(existing_projects: u64) -> String {
    format!(
        "PRJ-{}-{}",
        Utc::now().timestamp_millis(),
        existing_projects + 1
    )
}

/// Budgets, quotations and expenses per project
#[derive(Clone)]
pub struct FinancialService {
    db_pool: Arc<DbPool>,
}

impl FinancialService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    async fn budget_projects(
        &self,
        projects: Vec<project::Model>,
    ) -> Result<Vec<BudgetProject>, ServiceError> {
        let ids: Vec<i32> = projects.iter().map(|p| p.id).collect();
        let mut expenses: HashMap<i32, Vec<ExpenseLine>> = HashMap::new();
        for expense in project_expense::Entity::find()
            .filter(project_expense::Column::ProjectId.is_in(ids))
            .order_by_desc(project_expense::Column::CreatedAt)
            .order_by_desc(project_expense::Column::Id)
            .all(&*self.db_pool)
            .await?
        {
            expenses
                .entry(expense.project_id)
                .or_default()
                .push(expense.into());
        }

        Ok(projects
            .into_iter()
            .map(|project| {
                let lines = expenses.remove(&project.id).unwrap_or_default();
                BudgetProject::new(project, lines)
            })
            .collect())
    }

    /// Loads an expense; it must hang off a project of the caller's company.
    async fn company_expense(
        &self,
        company_id: i32,
        expense_id: i32,
    ) -> Result<project_expense::Model, ServiceError> {
        let not_found = || ServiceError::NotFound("Expense not found".to_string());
        let (expense, owner) = project_expense::Entity::find_by_id(expense_id)
            .find_also_related(project::Entity)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(not_found)?;
        match owner {
            Some(owner) if owner.company_id == company_id => Ok(expense),
            _ => Err(not_found()),
        }
    }

    #[instrument(skip(self))]
    pub async fn projects(&self, company_id: i32) -> Result<Vec<BudgetProject>, ServiceError> {
        let projects = project::Entity::find()
            .filter(project::Column::CompanyId.eq(company_id))
            .order_by_desc(project::Column::CreatedAt)
            .order_by_desc(project::Column::Id)
            .all(&*self.db_pool)
            .await?;
        self.budget_projects(projects).await
    }

    #[instrument(skip(self))]
    pub async fn project(&self, company_id: i32, project_id: i32) -> Result<BudgetProject, ServiceError> {
        let project = scope::company_project(&*self.db_pool, company_id, project_id).await?;
        self.budget_projects(vec![project])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("budget view missing".to_string()))
    }

    /// Quick project creation from the budgeting screen: ONGOING, client "N/A",
    /// type "Interior", with a generated code.
    #[instrument(skip(self, input))]
    pub async fn create_project(
        &self,
        company_id: i32,
        input: CreateBudgetProject,
    ) -> Result<BudgetProject, ServiceError> {
        input.validate()?;
        let (budget, quotation, due_date) =
            match (input.budget, input.quotation_amount, input.due_date) {
                (Some(b), Some(q), Some(d)) => (b, q, d),
                _ => {
                    return Err(ServiceError::ValidationError(
                        "Name, budget, quotation amount, and due date are required".to_string(),
                    ))
                }
            };
        if budget < Decimal::ZERO || quotation < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Budget and quotation amount cannot be negative".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let name = input.name.trim().to_string();
        let created = codes::retry_on_code_collision("create_budget_project", || {
            let name = name.clone();
            async move {
                let existing = project::Entity::find()
                    .filter(project::Column::CompanyId.eq(company_id))
                    .count(db)
                    .await?;
                let now = Utc::now();
                let row = project::ActiveModel {
                    project_code: Set(generated_project_code(existing)),
                    name: Set(name),
                    client_name: Set("N/A".to_string()),
                    project_type: Set("Interior".to_string()),
                    budget: Set(Some(budget)),
                    quotation_amount: Set(Some(quotation)),
                    due_date: Set(Some(due_date)),
                    status: Set(ProjectStatus::Ongoing),
                    company_id: Set(company_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(db)
                .await?;
                Ok(row)
            }
        })
        .await?;

        info!(project_id = created.id, project_code = %created.project_code, "budget project created");
        Ok(BudgetProject::new(created, Vec::new()))
    }

    #[instrument(skip(self, input))]
    pub async fn add_expense(
        &self,
        company_id: i32,
        project_id: i32,
        input: ExpenseInput,
    ) -> Result<ExpenseLine, ServiceError> {
        input.validate()?;
        let amount = ensure_positive_amount(input.amount)?;
        let db = &*self.db_pool;
        scope::company_project(db, company_id, project_id).await?;

        let expense = project_expense::ActiveModel {
            project_id: Set(project_id),
            category: Set(input.category.trim().to_string()),
            amount: Set(amount),
            description: Set(input.description.filter(|d| !d.trim().is_empty())),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(expense_id = expense.id, project_id, amount = %expense.amount, "expense added");
        Ok(expense.into())
    }

    #[instrument(skip(self, input))]
    pub async fn update_expense(
        &self,
        company_id: i32,
        expense_id: i32,
        input: ExpenseInput,
    ) -> Result<ExpenseLine, ServiceError> {
        input.validate()?;
        let amount = ensure_positive_amount(input.amount)?;
        let existing = self.company_expense(company_id, expense_id).await?;

        let mut active: project_expense::ActiveModel = existing.into();
        active.category = Set(input.category.trim().to_string());
        active.amount = Set(amount);
        if let Some(description) = input.description {
            active.description = Set(Some(description).filter(|d| !d.trim().is_empty()));
        }
        let updated = active.update(&*self.db_pool).await?;

        info!(expense_id, "expense updated");
        Ok(updated.into())
    }

    #[instrument(skip(self))]
    pub async fn delete_expense(&self, company_id: i32, expense_id: i32) -> Result<(), ServiceError> {
        let existing = self.company_expense(company_id, expense_id).await?;
        project_expense::Entity::delete_by_id(existing.id)
            .exec(&*self.db_pool)
            .await?;
        info!(expense_id, "expense deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn summary(&self, company_id: i32) -> Result<FinancialSummary, ServiceError> {
        Ok(summarize(&self.projects(company_id).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn budget_project(id: i32, budget: Decimal, spent: &[Decimal]) -> BudgetProject {
        BudgetProject {
            id,
            name: format!("P{}", id),
            budget,
            due_date: None,
            quotation_amount: budget,
            expenses: spent
                .iter()
                .enumerate()
                .map(|(i, amount)| ExpenseLine {
                    id: i as i32,
                    category: "Labour".into(),
                    amount: *amount,
                })
                .collect(),
        }
    }

    #[test]
    fn summary_totals_and_utilization() {
        let projects = vec![
            budget_project(1, dec!(1000), &[dec!(400), dec!(100)]),
            budget_project(2, dec!(2000), &[dec!(2500)]),
        ];
        let summary = summarize(&projects);
        assert_eq!(summary.total_budget, dec!(3000));
        assert_eq!(summary.total_spent, dec!(3000));
        assert_eq!(summary.total_remaining, dec!(0));
        assert_eq!(summary.total_projects, 2);
        assert_eq!(summary.projects_over_budget, 1);
        assert_eq!(summary.utilization_percentage, dec!(100.00));
    }

    #[test]
    fn utilization_rounds_to_two_places_and_is_zero_without_budget() {
        let thirds = summarize(&[budget_project(1, dec!(3), &[dec!(1)])]);
        assert_eq!(thirds.utilization_percentage, dec!(33.33));

        let empty = summarize(&[budget_project(1, dec!(0), &[dec!(50)])]);
        assert_eq!(empty.utilization_percentage, Decimal::ZERO);
        assert_eq!(empty.projects_over_budget, 1);
    }

    #[test]
    fn fallbacks_for_missing_budget_fields() {
        let now = Utc::now();
        let project = project::Model {
            id: 9,
            project_code: "P-9".into(),
            name: "Loft".into(),
            client_name: "N/A".into(),
            project_type: "Interior".into(),
            budget: Some(dec!(500)),
            quotation_amount: None,
            description: None,
            start_date: None,
            end_date: NaiveDate::from_ymd_opt(2024, 6, 30),
            due_date: None,
            status: ProjectStatus::Ongoing,
            company_id: 1,
            created_at: now,
            updated_at: now,
        };
        let view = BudgetProject::new(project, Vec::new());
        assert_eq!(view.quotation_amount, dec!(500));
        assert_eq!(view.due_date, NaiveDate::from_ymd_opt(2024, 6, 30));
    }

    #[test]
    fn expense_amounts_must_be_positive() {
        assert!(ensure_positive_amount(Some(dec!(0))).is_err());
        assert!(ensure_positive_amount(None).is_err());
        assert_eq!(ensure_positive_amount(Some(dec!(12.5))).unwrap(), dec!(12.5));
    }
}
