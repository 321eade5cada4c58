use crate::{
    db::{with_transaction, DbPool},
    entities::{material, material_request, project_material},
    errors::ServiceError,
    services::{codes, scope},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Pseudo-category that disables category filtering.
pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct MaterialFilter {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateMaterial {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Unit is required"))]
    pub unit: String,
    /// Defaults to zero.
    pub default_rate: Option<Decimal>,
    pub vendor: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMaterial {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub default_rate: Option<Decimal>,
    pub vendor: Option<String>,
    pub description: Option<String>,
}

/// Catalog fields for a material about to be inserted.
#[derive(Debug, Clone)]
pub(crate) struct NewMaterial {
    pub name: String,
    pub category: String,
    pub unit: String,
    pub default_rate: Decimal,
    pub vendor: Option<String>,
    pub description: Option<String>,
}

impl From<&material_request::Model> for NewMaterial {
    fn from(request: &material_request::Model) -> Self {
        Self {
            name: request.name.clone(),
            category: request.category.clone(),
            unit: request.unit.clone(),
            default_rate: request.default_rate,
            vendor: request.vendor.clone(),
            description: request.description.clone(),
        }
    }
}

impl From<CreateMaterial> for NewMaterial {
    fn from(input: CreateMaterial) -> Self {
        Self {
            name: input.name.trim().to_string(),
            category: input.category.trim().to_string(),
            unit: input.unit.trim().to_string(),
            default_rate: input.default_rate.unwrap_or(Decimal::ZERO),
            vendor: input.vendor.filter(|v| !v.trim().is_empty()),
            description: input.description.filter(|d| !d.trim().is_empty()),
        }
    }
}

/// Inserts a catalog row under the next MAT code. Must run inside the caller's
/// transaction so a code collision rolls back everything written with it.
pub(crate) async fn insert_material<C>(
    db: &C,
    company_id: i32,
    fields: NewMaterial,
) -> Result<material::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let material_code = codes::next_material_code(db).await?;
    let now = Utc::now();
    let row = material::ActiveModel {
        material_code: Set(material_code),
        name: Set(fields.name),
        category: Set(fields.category),
        unit: Set(fields.unit),
        default_rate: Set(fields.default_rate),
        vendor: Set(fields.vendor),
        description: Set(fields.description),
        company_id: Set(company_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(row)
}

fn ensure_rate(rate: Decimal) -> Result<(), ServiceError> {
    if rate < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Default rate cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn search_condition(search: &str) -> Condition {
    let pattern = format!("%{}%", search.to_lowercase());
    Condition::any()
        .add(Expr::expr(Func::lower(Expr::col(material::Column::Name))).like(pattern.clone()))
        .add(Expr::expr(Func::lower(Expr::col(material::Column::Vendor))).like(pattern))
}

/// Prepends the "All" pseudo-category to the sorted, de-duplicated list.
pub fn category_menu(mut categories: Vec<String>) -> Vec<String> {
    categories.retain(|c| c != ALL_CATEGORIES);
    categories.sort();
    categories.dedup();
    std::iter::once(ALL_CATEGORIES.to_string())
        .chain(categories)
        .collect()
}

/// Company material catalog
#[derive(Clone)]
pub struct MaterialService {
    db_pool: Arc<DbPool>,
}

impl MaterialService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        company_id: i32,
        filter: MaterialFilter,
    ) -> Result<Vec<material::Model>, ServiceError> {
        let mut query = material::Entity::find().filter(material::Column::CompanyId.eq(company_id));

        if let Some(category) = filter
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != ALL_CATEGORIES)
        {
            query = query.filter(material::Column::Category.eq(category));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(search_condition(search));
        }

        Ok(query
            .order_by_asc(material::Column::Name)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn categories(&self, company_id: i32) -> Result<Vec<String>, ServiceError> {
        let categories: Vec<String> = material::Entity::find()
            .select_only()
            .column(material::Column::Category)
            .distinct()
            .filter(material::Column::CompanyId.eq(company_id))
            .into_tuple()
            .all(&*self.db_pool)
            .await?;
        Ok(category_menu(categories))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, company_id: i32, material_id: i32) -> Result<material::Model, ServiceError> {
        scope::company_material(&*self.db_pool, company_id, material_id).await
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        company_id: i32,
        input: CreateMaterial,
    ) -> Result<material::Model, ServiceError> {
        input.validate()?;
        if let Some(rate) = input.default_rate {
            ensure_rate(rate)?;
        }
        let fields = NewMaterial::from(input);

        let created = codes::retry_on_code_collision("create_material", || {
            let fields = fields.clone();
            with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
                Box::pin(async move { insert_material(txn, company_id, fields).await })
            })
        })
        .await?;

        info!(material_code = %created.material_code, "material created");
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        company_id: i32,
        material_id: i32,
        input: UpdateMaterial,
    ) -> Result<material::Model, ServiceError> {
        let existing = scope::company_material(&*self.db_pool, company_id, material_id).await?;
        let mut active: material::ActiveModel = existing.into();

        let required = |value: String, field: &str| {
            let value = value.trim().to_string();
            if value.is_empty() {
                Err(ServiceError::ValidationError(format!("{} cannot be empty", field)))
            } else {
                Ok(value)
            }
        };

        if let Some(name) = input.name {
            active.name = Set(required(name, "Name")?);
        }
        if let Some(category) = input.category {
            active.category = Set(required(category, "Category")?);
        }
        if let Some(unit) = input.unit {
            active.unit = Set(required(unit, "Unit")?);
        }
        if let Some(rate) = input.default_rate {
            ensure_rate(rate)?;
            active.default_rate = Set(rate);
        }
        if let Some(vendor) = input.vendor {
            active.vendor = Set(Some(vendor).filter(|v| !v.trim().is_empty()));
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description).filter(|d| !d.trim().is_empty()));
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db_pool).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, company_id: i32, material_id: i32) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = scope::company_material(db, company_id, material_id).await?;

        let allocations = project_material::Entity::find()
            .filter(project_material::Column::MaterialId.eq(existing.id))
            .count(db)
            .await?;
        if allocations > 0 {
            return Err(ServiceError::Conflict(
                "Cannot delete material that is assigned to projects".to_string(),
            ));
        }

        material::Entity::delete_by_id(existing.id).exec(db).await?;
        info!(material_code = %existing.material_code, "material deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn menu_starts_with_all_and_is_sorted() {
        let menu = category_menu(vec![
            "Wood".into(),
            "Electrical".into(),
            "All".into(),
            "Civil".into(),
            "Wood".into(),
        ]);
        assert_eq!(menu, vec!["All", "Civil", "Electrical", "Wood"]);
        assert_eq!(category_menu(Vec::new()), vec!["All"]);
    }

    #[test]
    fn create_defaults_rate_and_trims() {
        let fields = NewMaterial::from(CreateMaterial {
            name: " Cement ".into(),
            category: "Civil".into(),
            unit: "bag".into(),
            vendor: Some("   ".into()),
            ..Default::default()
        });
        assert_eq!(fields.name, "Cement");
        assert_eq!(fields.default_rate, Decimal::ZERO);
        assert_eq!(fields.vendor, None);
    }

    #[test]
    fn negative_rate_is_rejected() {
        assert!(ensure_rate(dec!(-0.01)).is_err());
        assert!(ensure_rate(dec!(0)).is_ok());
    }
}
