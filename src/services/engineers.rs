use crate::{
    auth::AuthService,
    db::{with_transaction, DbPool},
    entities::{
        engineer, material_request, material_usage, project, project_assignment,
        user::{self, UserRole},
    },
    errors::ServiceError,
    services::present_or_null,
    storage::{self, FileStorage, Upload},
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10}$").unwrap());
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{4,}$").unwrap());

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EngineerLogin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEngineer {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(regex(path = "PHONE_RE", message = "Phone number must be 10 digits"))]
    pub phone: String,
    #[validate(regex(path = "PHONE_RE", message = "Alternate phone number must be 10 digits"))]
    pub alternate_phone: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "Employee ID is required"))]
    pub emp_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[serde(default)]
    #[validate(regex(
        path = "USERNAME_RE",
        message = "Username must be at least 4 characters of letters, digits or underscores"
    ))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEngineer {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(regex(path = "PHONE_RE", message = "Phone number must be 10 digits"))]
    pub phone: Option<String>,
    /// `null` or an empty string removes the alternate number.
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub alternate_phone: Option<Option<String>>,
    #[validate(length(min = 1, message = "Employee ID cannot be empty"))]
    pub emp_id: Option<String>,
    #[validate(length(min = 1, message = "Address cannot be empty"))]
    pub address: Option<String>,
    #[validate(regex(
        path = "USERNAME_RE",
        message = "Username must be at least 4 characters of letters, digits or underscores"
    ))]
    pub username: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: i32,
    #[serde(rename = "projectId")]
    pub project_code: String,
    pub name: String,
    pub status: project::ProjectStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineerView {
    #[serde(flatten)]
    pub engineer: engineer::Model,
    pub project_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<ProjectSummary>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineerSession {
    pub token: String,
    pub engineer: EngineerView,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Stored name of an engineer image from its public URL.
fn blob_name(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|name| !name.is_empty())
}

async fn ensure_unique_identity<C>(
    db: &C,
    company_id: i32,
    username: Option<&str>,
    emp_id: Option<&str>,
    except_id: Option<i32>,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if let Some(username) = username {
        let mut query = engineer::Entity::find().filter(engineer::Column::Username.eq(username));
        if let Some(id) = except_id {
            query = query.filter(engineer::Column::Id.ne(id));
        }
        if query.one(db).await?.is_some() {
            return Err(ServiceError::Conflict("Username already taken".to_string()));
        }
    }
    if let Some(emp_id) = emp_id {
        let mut query = engineer::Entity::find()
            .filter(engineer::Column::CompanyId.eq(company_id))
            .filter(engineer::Column::EmpId.eq(emp_id));
        if let Some(id) = except_id {
            query = query.filter(engineer::Column::Id.ne(id));
        }
        if query.one(db).await?.is_some() {
            return Err(ServiceError::Conflict(
                "Employee ID already exists in your company".to_string(),
            ));
        }
    }
    Ok(())
}

/// Site engineer profiles, their logins and profile images
#[derive(Clone)]
pub struct EngineerService {
    db_pool: Arc<DbPool>,
    auth: Arc<AuthService>,
    storage: Arc<FileStorage>,
}

impl EngineerService {
    pub fn new(db_pool: Arc<DbPool>, auth: Arc<AuthService>, storage: Arc<FileStorage>) -> Self {
        Self {
            db_pool,
            auth,
            storage,
        }
    }

    async fn company_engineer(
        &self,
        company_id: i32,
        engineer_id: i32,
    ) -> Result<engineer::Model, ServiceError> {
        engineer::Entity::find_by_id(engineer_id)
            .filter(engineer::Column::CompanyId.eq(company_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Engineer not found".to_string()))
    }

    async fn projects_of(&self, user_id: i32) -> Result<Vec<ProjectSummary>, ServiceError> {
        let rows = project_assignment::Entity::find()
            .filter(project_assignment::Column::UserId.eq(user_id))
            .find_also_related(project::Entity)
            .order_by_desc(project_assignment::Column::AssignedAt)
            .all(&*self.db_pool)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, project)| project)
            .map(|p| ProjectSummary {
                id: p.id,
                project_code: p.project_code,
                name: p.name,
                status: p.status,
            })
            .collect())
    }

    async fn detailed(&self, engineer: engineer::Model) -> Result<EngineerView, ServiceError> {
        let projects = self.projects_of(engineer.user_id).await?;
        Ok(EngineerView {
            project_count: projects.len(),
            projects: Some(projects),
            engineer,
        })
    }

    /// Username login for engineers; issues a token for their user row.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn login(&self, input: EngineerLogin) -> Result<EngineerSession, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid username or password".to_string());
        if input.username.trim().is_empty() || input.password.is_empty() {
            return Err(ServiceError::ValidationError(
                "Username and password are required".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let engineer = engineer::Entity::find()
            .filter(engineer::Column::Username.eq(input.username.trim()))
            .one(db)
            .await?
            .ok_or_else(invalid)?;
        let account = user::Entity::find_by_id(engineer.user_id)
            .one(db)
            .await?
            .ok_or_else(invalid)?;

        let hash = account.password_hash.as_deref().ok_or_else(|| {
            ServiceError::Unauthorized(
                "No credentials set for this engineer. Please contact your administrator."
                    .to_string(),
            )
        })?;
        if !self.auth.verify_password(&input.password, hash) {
            warn!(engineer_id = engineer.id, "engineer login rejected");
            return Err(invalid());
        }

        let token = self.auth.issue_token(&account)?;
        info!(engineer_id = engineer.id, "engineer logged in");
        Ok(EngineerSession {
            token,
            engineer: self.detailed(engineer).await?,
        })
    }

    /// Company engineers, newest first, with their assignment counts.
    #[instrument(skip(self))]
    pub async fn list(&self, company_id: i32) -> Result<Vec<EngineerView>, ServiceError> {
        let db = &*self.db_pool;
        let engineers = engineer::Entity::find()
            .filter(engineer::Column::CompanyId.eq(company_id))
            .order_by_desc(engineer::Column::CreatedAt)
            .order_by_desc(engineer::Column::Id)
            .all(db)
            .await?;

        let user_ids: Vec<i32> = engineers.iter().map(|e| e.user_id).collect();
        let mut counts: HashMap<i32, usize> = HashMap::new();
        for assignment in project_assignment::Entity::find()
            .filter(project_assignment::Column::UserId.is_in(user_ids))
            .all(db)
            .await?
        {
            *counts.entry(assignment.user_id).or_default() += 1;
        }

        Ok(engineers
            .into_iter()
            .map(|engineer| EngineerView {
                project_count: counts.get(&engineer.user_id).copied().unwrap_or(0),
                projects: None,
                engineer,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, company_id: i32, engineer_id: i32) -> Result<EngineerView, ServiceError> {
        let engineer = self.company_engineer(company_id, engineer_id).await?;
        self.detailed(engineer).await
    }

    /// Creates the engineer's user row and profile row together.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create(
        &self,
        company_id: i32,
        mut input: CreateEngineer,
    ) -> Result<EngineerView, ServiceError> {
        input.alternate_phone = blank_to_none(input.alternate_phone);
        input.name = input.name.trim().to_string();
        input.phone = input.phone.trim().to_string();
        input.emp_id = input.emp_id.trim().to_string();
        input.address = input.address.trim().to_string();
        input.username = input.username.trim().to_string();
        input.validate()?;

        let password_hash = self.auth.hash_password(&input.password)?;

        let created = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                ensure_unique_identity(
                    txn,
                    company_id,
                    Some(&input.username),
                    Some(&input.emp_id),
                    None,
                )
                .await?;

                let now = Utc::now();
                let account = user::ActiveModel {
                    name: Set(input.name.clone()),
                    email: Set(None),
                    password_hash: Set(Some(password_hash)),
                    role: Set(UserRole::SiteEngineer),
                    company_id: Set(company_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                let profile = engineer::ActiveModel {
                    user_id: Set(account.id),
                    company_id: Set(company_id),
                    name: Set(input.name),
                    emp_id: Set(input.emp_id),
                    phone: Set(input.phone),
                    alternate_phone: Set(input.alternate_phone),
                    address: Set(input.address),
                    username: Set(input.username),
                    profile_image: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await?;
                Ok(profile)
            })
        })
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                ServiceError::Conflict("Username or employee ID already exists".to_string())
            } else {
                e
            }
        })?;

        info!(engineer_id = created.id, user_id = created.user_id, "engineer created");
        self.detailed(created).await
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        company_id: i32,
        engineer_id: i32,
        input: UpdateEngineer,
    ) -> Result<EngineerView, ServiceError> {
        let trim = |v: Option<String>| v.map(|s| s.trim().to_string());
        let input = UpdateEngineer {
            name: trim(input.name),
            phone: trim(input.phone),
            alternate_phone: input.alternate_phone.map(blank_to_none),
            emp_id: trim(input.emp_id),
            address: trim(input.address),
            username: trim(input.username),
            password: input.password,
        };
        input.validate()?;
        if let Some(Some(alternate)) = &input.alternate_phone {
            if !PHONE_RE.is_match(alternate) {
                return Err(ServiceError::ValidationError(
                    "Alternate phone number must be 10 digits".to_string(),
                ));
            }
        }

        let existing = self.company_engineer(company_id, engineer_id).await?;
        let password_hash = input
            .password
            .as_deref()
            .map(|p| self.auth.hash_password(p))
            .transpose()?;

        let updated = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                ensure_unique_identity(
                    txn,
                    company_id,
                    input.username.as_deref(),
                    input.emp_id.as_deref(),
                    Some(existing.id),
                )
                .await?;

                let user_id = existing.user_id;
                let mut profile: engineer::ActiveModel = existing.into();
                if let Some(name) = input.name.clone() {
                    profile.name = Set(name);
                }
                if let Some(phone) = input.phone {
                    profile.phone = Set(phone);
                }
                if let Some(alternate) = input.alternate_phone {
                    profile.alternate_phone = Set(alternate);
                }
                if let Some(emp_id) = input.emp_id {
                    profile.emp_id = Set(emp_id);
                }
                if let Some(address) = input.address {
                    profile.address = Set(address);
                }
                if let Some(username) = input.username {
                    profile.username = Set(username);
                }
                profile.updated_at = Set(Utc::now());
                let profile = profile.update(txn).await?;

                if input.name.is_some() || password_hash.is_some() {
                    let account = user::Entity::find_by_id(user_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
                    let mut account: user::ActiveModel = account.into();
                    if let Some(name) = input.name {
                        account.name = Set(name);
                    }
                    if let Some(hash) = password_hash {
                        account.password_hash = Set(Some(hash));
                    }
                    account.updated_at = Set(Utc::now());
                    account.update(txn).await?;
                }
                Ok(profile)
            })
        })
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                ServiceError::Conflict("Username or employee ID already exists".to_string())
            } else {
                e
            }
        })?;

        info!(engineer_id, "engineer updated");
        self.detailed(updated).await
    }

    /// Removes the engineer with their login and assignments. Engineers with
    /// usage logs or material requests on record are kept.
    #[instrument(skip(self))]
    pub async fn delete(&self, company_id: i32, engineer_id: i32) -> Result<(), ServiceError> {
        let existing = self.company_engineer(company_id, engineer_id).await?;
        let db = &*self.db_pool;

        let usage = material_usage::Entity::find()
            .filter(material_usage::Column::UserId.eq(existing.user_id))
            .count(db)
            .await?;
        let requests = material_request::Entity::find()
            .filter(material_request::Column::EmployeeId.eq(existing.user_id))
            .count(db)
            .await?;
        if usage > 0 || requests > 0 {
            return Err(ServiceError::Conflict(
                "Cannot delete engineer with usage logs or material requests on record"
                    .to_string(),
            ));
        }

        let image = existing.profile_image.clone();
        let (profile_id, user_id) = (existing.id, existing.user_id);
        with_transaction::<_, _, ServiceError>(db, move |txn| {
            Box::pin(async move {
                project_assignment::Entity::delete_many()
                    .filter(project_assignment::Column::UserId.eq(user_id))
                    .exec(txn)
                    .await?;
                engineer::Entity::delete_by_id(profile_id).exec(txn).await?;
                user::Entity::delete_by_id(user_id).exec(txn).await?;
                Ok(())
            })
        })
        .await?;

        if let Some(name) = image.as_deref().and_then(blob_name) {
            self.storage.remove(storage::ENGINEER_AREA, name).await;
        }
        info!(engineer_id, "engineer deleted");
        Ok(())
    }

    /// Stores a new profile image and drops the previous one.
    #[instrument(skip(self, upload), fields(original_name = %upload.original_name))]
    pub async fn upload_image(
        &self,
        company_id: i32,
        engineer_id: i32,
        upload: Upload,
    ) -> Result<EngineerView, ServiceError> {
        let ext = storage::accepted_extension(&upload.original_name, storage::IMAGE_EXTENSIONS)
            .map_err(|_| {
                ServiceError::ValidationError(
                    "Only image files are allowed (jpeg, jpg, png, gif)".to_string(),
                )
            })?;
        if !upload.mime_type().starts_with("image/") {
            return Err(ServiceError::ValidationError(
                "Only image files are allowed (jpeg, jpg, png, gif)".to_string(),
            ));
        }
        if upload.bytes.len() > storage::MAX_IMAGE_BYTES {
            return Err(ServiceError::ValidationError(
                "Image must be 5MB or smaller".to_string(),
            ));
        }

        let existing = self.company_engineer(company_id, engineer_id).await?;
        let previous = existing.profile_image.clone();

        let file_name = storage::generate_file_name("engineer", &ext);
        self.storage
            .save(storage::ENGINEER_AREA, &file_name, &upload.bytes)
            .await?;

        let mut profile: engineer::ActiveModel = existing.into();
        profile.profile_image = Set(Some(storage::public_url(storage::ENGINEER_AREA, &file_name)));
        profile.updated_at = Set(Utc::now());
        let updated = match profile.update(&*self.db_pool).await {
            Ok(updated) => updated,
            Err(e) => {
                self.storage.remove(storage::ENGINEER_AREA, &file_name).await;
                return Err(e.into());
            }
        };

        if let Some(old) = previous.as_deref().and_then(blob_name) {
            self.storage.remove(storage::ENGINEER_AREA, old).await;
        }
        info!(engineer_id, "engineer image replaced");
        self.detailed(updated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn valid() -> CreateEngineer {
        CreateEngineer {
            name: "Ravi".into(),
            phone: "9876543210".into(),
            alternate_phone: None,
            emp_id: "E-01".into(),
            address: "Site road".into(),
            username: "ravi_k".into(),
            password: "secret1".into(),
        }
    }

    #[test]
    fn valid_engineer_passes() {
        assert!(valid().validate().is_ok());
    }

    #[rstest]
    #[case::short_phone(CreateEngineer { phone: "98765".into(), ..valid() })]
    #[case::letters_in_phone(CreateEngineer { phone: "98765abcde".into(), ..valid() })]
    #[case::bad_alternate(CreateEngineer { alternate_phone: Some("12".into()), ..valid() })]
    #[case::short_username(CreateEngineer { username: "rk".into(), ..valid() })]
    #[case::username_symbols(CreateEngineer { username: "ravi.k".into(), ..valid() })]
    #[case::short_password(CreateEngineer { password: "12345".into(), ..valid() })]
    #[case::missing_address(CreateEngineer { address: String::new(), ..valid() })]
    fn invalid_engineers_are_rejected(#[case] input: CreateEngineer) {
        assert!(input.validate().is_err());
    }

    #[test]
    fn image_blob_name_comes_from_url() {
        assert_eq!(
            blob_name("/uploads/engineers/engineer-1-2.png"),
            Some("engineer-1-2.png")
        );
        assert_eq!(blob_name("/uploads/engineers/"), None);
    }
}
