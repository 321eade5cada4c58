use crate::{
    auth::AuthService,
    db::{with_transaction, DbPool},
    entities::{
        company,
        user::{self, UserRole},
    },
    errors::ServiceError,
    services::scope,
};
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "All fields are required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "All fields are required"))]
    pub role: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "All fields are required"))]
    pub company_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CompanySummary {
    pub id: i32,
    pub name: String,
}

impl From<company::Model> for CompanySummary {
    fn from(company: company::Model) -> Self {
        Self {
            id: company.id,
            name: company.name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    #[serde(flatten)]
    pub user: user::Model,
    pub company: Option<CompanySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user: AccountView,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Finds a company by name ignoring case, creating it when absent.
async fn find_or_create_company<C>(db: &C, name: &str) -> Result<company::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let existing = company::Entity::find()
        .filter(Expr::expr(Func::lower(Expr::col(company::Column::Name))).eq(name.to_lowercase()))
        .one(db)
        .await?;
    if let Some(company) = existing {
        return Ok(company);
    }

    let now = Utc::now();
    let created = company::ActiveModel {
        name: Set(name.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(company_id = created.id, "company created on signup");
    Ok(created)
}

/// Registration, login and the user directory of a company
#[derive(Clone)]
pub struct AccountService {
    db_pool: Arc<DbPool>,
    auth: Arc<AuthService>,
}

impl AccountService {
    pub fn new(db_pool: Arc<DbPool>, auth: Arc<AuthService>) -> Self {
        Self { db_pool, auth }
    }

    async fn view(&self, user: user::Model) -> Result<AccountView, ServiceError> {
        let company = company::Entity::find_by_id(user.company_id)
            .one(&*self.db_pool)
            .await?
            .map(CompanySummary::from);
        Ok(AccountView { user, company })
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn signup(&self, input: SignupRequest) -> Result<Session, ServiceError> {
        input.validate()?;
        let role = UserRole::parse_loose(&input.role).ok_or_else(|| {
            ServiceError::ValidationError("Invalid role. Must be Admin or Site_Engineer".to_string())
        })?;
        let email = normalize_email(&input.email);
        let company_name = input.company_name.trim().to_string();
        let name = input.name.trim().to_string();
        if company_name.is_empty() || name.is_empty() {
            return Err(ServiceError::ValidationError("All fields are required".to_string()));
        }

        let taken = || ServiceError::Conflict("Email already registered".to_string());
        if user::Entity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(&*self.db_pool)
            .await?
            .is_some()
        {
            return Err(taken());
        }

        let password_hash = self.auth.hash_password(&input.password)?;

        let created = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                let company = find_or_create_company(txn, &company_name).await?;
                let now = Utc::now();
                let user = user::ActiveModel {
                    name: Set(name),
                    email: Set(Some(email)),
                    password_hash: Set(Some(password_hash)),
                    role: Set(role),
                    company_id: Set(company.id),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await?;
                Ok(user)
            })
        })
        .await
        .map_err(|e| if e.is_unique_violation() { taken() } else { e })?;

        let token = self.auth.issue_token(&created)?;
        info!(user_id = created.id, role = %created.role, "user signed up");
        Ok(Session {
            token,
            user: self.view(created).await?,
        })
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginRequest) -> Result<Session, ServiceError> {
        if input.email.trim().is_empty() || input.password.is_empty() {
            return Err(ServiceError::ValidationError(
                "Email and password are required".to_string(),
            ));
        }
        let invalid = || ServiceError::Unauthorized("Invalid credentials".to_string());

        let user = user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(&input.email)))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(invalid)?;

        let verified = user
            .password_hash
            .as_deref()
            .map(|hash| self.auth.verify_password(&input.password, hash))
            .unwrap_or(false);
        if !verified {
            warn!(user_id = user.id, "login rejected");
            return Err(invalid());
        }

        let token = self.auth.issue_token(&user)?;
        info!(user_id = user.id, "user logged in");
        Ok(Session {
            token,
            user: self.view(user).await?,
        })
    }

    /// Every company, for the signup form.
    #[instrument(skip(self))]
    pub async fn companies(&self) -> Result<Vec<CompanySummary>, ServiceError> {
        Ok(company::Entity::find()
            .order_by_asc(company::Column::Name)
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .map(CompanySummary::from)
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn profile(&self, user_id: i32) -> Result<AccountView, ServiceError> {
        let user = user::Entity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        self.view(user).await
    }

    #[instrument(skip(self))]
    pub async fn users(&self, company_id: i32) -> Result<Vec<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::CompanyId.eq(company_id))
            .order_by_asc(user::Column::Name)
            .all(&*self.db_pool)
            .await?)
    }

    /// Site engineers of the company, by name.
    #[instrument(skip(self))]
    pub async fn employees(&self, company_id: i32) -> Result<Vec<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::CompanyId.eq(company_id))
            .filter(user::Column::Role.eq(UserRole::SiteEngineer))
            .order_by_asc(user::Column::Name)
            .all(&*self.db_pool)
            .await?)
    }

    /// The caller's own company; any other id is forbidden.
    #[instrument(skip(self))]
    pub async fn company(
        &self,
        caller_company_id: i32,
        company_id: i32,
    ) -> Result<company::Model, ServiceError> {
        scope::ensure_same_company(company_id, caller_company_id).map_err(|_| {
            ServiceError::Forbidden(
                "Access denied. You can only view your own company.".to_string(),
            )
        })?;
        company::Entity::find_by_id(company_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Company not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> SignupRequest {
        SignupRequest {
            name: "Asha".into(),
            email: "asha@acme.test".into(),
            password: "secret1".into(),
            role: "Admin".into(),
            company_name: "Acme".into(),
        }
    }

    #[test]
    fn signup_validation() {
        assert!(signup().validate().is_ok());
        assert!(SignupRequest { password: "12345".into(), ..signup() }.validate().is_err());
        assert!(SignupRequest { email: "not-an-email".into(), ..signup() }.validate().is_err());
        assert!(SignupRequest { company_name: String::new(), ..signup() }.validate().is_err());
    }

    #[test]
    fn emails_are_compared_normalized() {
        assert_eq!(normalize_email("  Asha@ACME.test "), "asha@acme.test");
    }
}
