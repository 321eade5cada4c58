use crate::{
    db::DbPool,
    entities::{labour, labour_payment},
    errors::ServiceError,
    services::{present_or_null, scope},
};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Payments shown inline on list entries.
const RECENT_PAYMENTS: usize = 10;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct LabourFilter {
    pub project_id: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLabour {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    pub address: Option<String>,
    pub project_id: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLabour {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub address: Option<Option<String>>,
    /// `null` detaches the labourer from any project.
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<i32>)]
    pub project_id: Option<Option<i32>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayment {
    pub amount: Decimal,
    /// Defaults to now.
    pub date: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabourView {
    #[serde(flatten)]
    pub labour: labour::Model,
    pub total_paid: Decimal,
    pub payments: Vec<labour_payment::Model>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectHeadcount {
    pub project_id: Option<i32>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabourStatistics {
    pub total_labourers: usize,
    pub total_paid: Decimal,
    pub total_paid_this_month: Decimal,
    pub labourers_by_project: Vec<ProjectHeadcount>,
}

/// First instant of the UTC month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    Utc.from_utc_datetime(&first)
}

fn statistics(
    labourers: &[labour::Model],
    payments: &[labour_payment::Model],
    now: DateTime<Utc>,
) -> LabourStatistics {
    let since = month_start(now);
    let mut by_project: BTreeMap<Option<i32>, usize> = BTreeMap::new();
    for labourer in labourers {
        *by_project.entry(labourer.project_id).or_default() += 1;
    }

    LabourStatistics {
        total_labourers: labourers.len(),
        total_paid: payments.iter().map(|p| p.amount).sum(),
        total_paid_this_month: payments
            .iter()
            .filter(|p| p.date >= since)
            .map(|p| p.amount)
            .sum(),
        labourers_by_project: by_project
            .into_iter()
            .map(|(project_id, count)| ProjectHeadcount { project_id, count })
            .collect(),
    }
}

/// Daily-wage labourers and the payments made to them
#[derive(Clone)]
pub struct LabourService {
    db_pool: Arc<DbPool>,
}

impl LabourService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    async fn company_labourer(
        &self,
        company_id: i32,
        labour_id: i32,
    ) -> Result<labour::Model, ServiceError> {
        labour::Entity::find_by_id(labour_id)
            .filter(labour::Column::CompanyId.eq(company_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Labourer not found".to_string()))
    }

    async fn payments_by_labourer(
        &self,
        labour_ids: Vec<i32>,
    ) -> Result<HashMap<i32, Vec<labour_payment::Model>>, ServiceError> {
        let mut grouped: HashMap<i32, Vec<labour_payment::Model>> = HashMap::new();
        for payment in labour_payment::Entity::find()
            .filter(labour_payment::Column::LabourId.is_in(labour_ids))
            .order_by_desc(labour_payment::Column::Date)
            .order_by_desc(labour_payment::Column::Id)
            .all(&*self.db_pool)
            .await?
        {
            grouped.entry(payment.labour_id).or_default().push(payment);
        }
        Ok(grouped)
    }

    async fn views(
        &self,
        labourers: Vec<labour::Model>,
        keep: Option<usize>,
    ) -> Result<Vec<LabourView>, ServiceError> {
        let mut payments = self
            .payments_by_labourer(labourers.iter().map(|l| l.id).collect())
            .await?;
        Ok(labourers
            .into_iter()
            .map(|labour| {
                let mut own = payments.remove(&labour.id).unwrap_or_default();
                let total_paid = own.iter().map(|p| p.amount).sum();
                if let Some(n) = keep {
                    own.truncate(n);
                }
                LabourView {
                    labour,
                    total_paid,
                    payments: own,
                }
            })
            .collect())
    }

    async fn view(&self, labour: labour::Model) -> Result<LabourView, ServiceError> {
        self.views(vec![labour], None)
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("labour view missing".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        company_id: i32,
        project_id: Option<i32>,
    ) -> Result<Vec<LabourView>, ServiceError> {
        let mut query = labour::Entity::find().filter(labour::Column::CompanyId.eq(company_id));
        if let Some(project_id) = project_id {
            query = query.filter(labour::Column::ProjectId.eq(project_id));
        }
        let labourers = query
            .order_by_desc(labour::Column::CreatedAt)
            .order_by_desc(labour::Column::Id)
            .all(&*self.db_pool)
            .await?;
        self.views(labourers, Some(RECENT_PAYMENTS)).await
    }

    #[instrument(skip(self))]
    pub async fn list_for_project(
        &self,
        company_id: i32,
        project_id: i32,
    ) -> Result<Vec<LabourView>, ServiceError> {
        scope::company_project(&*self.db_pool, company_id, project_id).await?;
        self.list(company_id, Some(project_id)).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, company_id: i32, labour_id: i32) -> Result<LabourView, ServiceError> {
        let labourer = self.company_labourer(company_id, labour_id).await?;
        self.view(labourer).await
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, company_id: i32, input: CreateLabour) -> Result<LabourView, ServiceError> {
        input.validate()?;
        let db = &*self.db_pool;
        if let Some(project_id) = input.project_id {
            scope::company_project(db, company_id, project_id).await?;
        }

        let now = Utc::now();
        let created = labour::ActiveModel {
            company_id: Set(company_id),
            project_id: Set(input.project_id),
            name: Set(input.name.trim().to_string()),
            phone: Set(input.phone.trim().to_string()),
            address: Set(input.address.filter(|a| !a.trim().is_empty())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(labour_id = created.id, "labourer created");
        Ok(LabourView {
            labour: created,
            total_paid: Decimal::ZERO,
            payments: Vec::new(),
        })
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        company_id: i32,
        labour_id: i32,
        input: UpdateLabour,
    ) -> Result<LabourView, ServiceError> {
        let existing = self.company_labourer(company_id, labour_id).await?;
        let db = &*self.db_pool;

        let mut active: labour::ActiveModel = existing.into();
        if let Some(name) = input.name.map(|n| n.trim().to_string()) {
            if name.is_empty() {
                return Err(ServiceError::ValidationError("Name cannot be empty".to_string()));
            }
            active.name = Set(name);
        }
        if let Some(phone) = input.phone.map(|p| p.trim().to_string()) {
            if phone.is_empty() {
                return Err(ServiceError::ValidationError("Phone cannot be empty".to_string()));
            }
            active.phone = Set(phone);
        }
        if let Some(address) = input.address {
            active.address = Set(address.filter(|a| !a.trim().is_empty()));
        }
        if let Some(project_id) = input.project_id {
            if let Some(id) = project_id {
                scope::company_project(db, company_id, id).await?;
            }
            active.project_id = Set(project_id);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        self.view(updated).await
    }

    /// Payments go with the labourer.
    #[instrument(skip(self))]
    pub async fn delete(&self, company_id: i32, labour_id: i32) -> Result<(), ServiceError> {
        let existing = self.company_labourer(company_id, labour_id).await?;
        labour::Entity::delete_by_id(existing.id)
            .exec(&*self.db_pool)
            .await?;
        info!(labour_id, "labourer deleted");
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn add_payment(
        &self,
        company_id: i32,
        labour_id: i32,
        input: RecordPayment,
    ) -> Result<labour_payment::Model, ServiceError> {
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Amount must be greater than zero".to_string(),
            ));
        }
        let labourer = self.company_labourer(company_id, labour_id).await?;

        let payment = labour_payment::ActiveModel {
            labour_id: Set(labourer.id),
            amount: Set(input.amount),
            date: Set(input.date.unwrap_or_else(Utc::now)),
            remarks: Set(input.remarks.filter(|r| !r.trim().is_empty())),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(labour_id, payment_id = payment.id, amount = %payment.amount, "labour payment recorded");
        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn payments(
        &self,
        company_id: i32,
        labour_id: i32,
    ) -> Result<Vec<labour_payment::Model>, ServiceError> {
        let labourer = self.company_labourer(company_id, labour_id).await?;
        Ok(self
            .payments_by_labourer(vec![labourer.id])
            .await?
            .remove(&labourer.id)
            .unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn delete_payment(
        &self,
        company_id: i32,
        labour_id: i32,
        payment_id: i32,
    ) -> Result<(), ServiceError> {
        let labourer = self.company_labourer(company_id, labour_id).await?;
        let deleted = labour_payment::Entity::delete_many()
            .filter(labour_payment::Column::Id.eq(payment_id))
            .filter(labour_payment::Column::LabourId.eq(labourer.id))
            .exec(&*self.db_pool)
            .await?;
        if deleted.rows_affected == 0 {
            return Err(ServiceError::NotFound("Payment not found".to_string()));
        }
        info!(labour_id, payment_id, "labour payment deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn statistics(
        &self,
        company_id: i32,
        project_id: Option<i32>,
    ) -> Result<LabourStatistics, ServiceError> {
        let db = &*self.db_pool;
        let mut query = labour::Entity::find().filter(labour::Column::CompanyId.eq(company_id));
        if let Some(project_id) = project_id {
            query = query.filter(labour::Column::ProjectId.eq(project_id));
        }
        let labourers = query.all(db).await?;

        let payments = labour_payment::Entity::find()
            .filter(labour_payment::Column::LabourId.is_in(labourers.iter().map(|l| l.id)))
            .all(db)
            .await?;

        Ok(statistics(&labourers, &payments, Utc::now()))
    }
}
