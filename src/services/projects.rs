use crate::{
    db::{with_transaction, DbPool},
    entities::{
        contract, labour, material_request, material_usage,
        project::{self, ProjectStatus},
        project_assignment, project_expense, project_file, project_material, user,
    },
    errors::ServiceError,
    services::{present_or_null, scope, usage::UserSummary},
    storage::{self, FileStorage, Upload},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub const DEFAULT_PROJECT_TYPE: &str = "Residential";

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilter {
    pub status: Option<String>,
    pub project_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
    /// Project code chosen by the admin, unique across the system.
    #[serde(default)]
    #[validate(length(min = 1, message = "Project ID is required"))]
    pub project_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Client name is required"))]
    pub client_name: String,
    pub project_type: Option<String>,
    pub budget: Option<Decimal>,
    pub quotation_amount: Option<Decimal>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub assigned_user_id: Option<i32>,
}

/// Partial update. For the nullable fields an explicit `null` clears the value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProject {
    pub name: Option<String>,
    pub client_name: Option<String>,
    pub project_type: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub budget: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub quotation_amount: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
    /// Replaces the current assignments; `null` removes them all.
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<i32>)]
    pub assigned_user_id: Option<Option<i32>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub id: i32,
    pub user_id: i32,
    pub assigned_at: chrono::DateTime<Utc>,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: project::Model,
    pub assignments: Vec<AssignmentView>,
}

fn ensure_budget(field: &str, value: Option<Decimal>) -> Result<(), ServiceError> {
    match value {
        Some(v) if v < Decimal::ZERO => Err(ServiceError::ValidationError(format!(
            "{} cannot be negative",
            field
        ))),
        _ => Ok(()),
    }
}

fn ensure_date_order(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), ServiceError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(ServiceError::ValidationError(
            "End date cannot be before start date".to_string(),
        )),
        _ => Ok(()),
    }
}

fn parse_status(value: &str) -> Result<ProjectStatus, ServiceError> {
    ProjectStatus::parse(value).ok_or_else(|| {
        ServiceError::ValidationError(
            "Status must be one of PENDING, ONGOING, COMPLETED".to_string(),
        )
    })
}

/// Checks that `user_id` is a user of the company before it is assigned.
async fn company_user<C>(db: &C, company_id: i32, user_id: i32) -> Result<user::Model, ServiceError>
where
    C: ConnectionTrait,
{
    user::Entity::find_by_id(user_id)
        .filter(user::Column::CompanyId.eq(company_id))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Assigned user not found".to_string()))
}

async fn assign<C>(db: &C, project_id: i32, user_id: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    project_assignment::ActiveModel {
        project_id: Set(project_id),
        user_id: Set(user_id),
        assigned_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Deletes every row that hangs off a project, then the project itself.
/// Returns the stored names of the project's file blobs.
async fn delete_project_rows<C>(db: &C, project_id: i32) -> Result<Vec<String>, ServiceError>
where
    C: ConnectionTrait,
{
    let blobs: Vec<String> = project_file::Entity::find()
        .select_only()
        .column(project_file::Column::FileName)
        .filter(project_file::Column::ProjectId.eq(project_id))
        .into_tuple()
        .all(db)
        .await?;

    material_usage::Entity::delete_many()
        .filter(material_usage::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;
    project_material::Entity::delete_many()
        .filter(project_material::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;
    material_request::Entity::delete_many()
        .filter(material_request::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;
    project_assignment::Entity::delete_many()
        .filter(project_assignment::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;
    project_expense::Entity::delete_many()
        .filter(project_expense::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;
    project_file::Entity::delete_many()
        .filter(project_file::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;
    contract::Entity::delete_many()
        .filter(contract::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;
    // Labourers outlive the project; they just lose the link.
    labour::Entity::update_many()
        .col_expr(labour::Column::ProjectId, Expr::value(Option::<i32>::None))
        .filter(labour::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;

    project::Entity::delete_by_id(project_id).exec(db).await?;
    Ok(blobs)
}

/// Company projects, their assignments and their documents
#[derive(Clone)]
pub struct ProjectService {
    db_pool: Arc<DbPool>,
    storage: Arc<FileStorage>,
    max_upload_bytes: usize,
}

impl ProjectService {
    pub fn new(db_pool: Arc<DbPool>, storage: Arc<FileStorage>, max_upload_bytes: usize) -> Self {
        Self {
            db_pool,
            storage,
            max_upload_bytes,
        }
    }

    async fn views(&self, projects: Vec<project::Model>) -> Result<Vec<ProjectView>, ServiceError> {
        let db = &*self.db_pool;
        let ids: Vec<i32> = projects.iter().map(|p| p.id).collect();

        let assignments = project_assignment::Entity::find()
            .filter(project_assignment::Column::ProjectId.is_in(ids))
            .find_also_related(user::Entity)
            .order_by_asc(project_assignment::Column::Id)
            .all(db)
            .await?;

        let mut by_project: HashMap<i32, Vec<AssignmentView>> = HashMap::new();
        for (assignment, user) in assignments {
            by_project
                .entry(assignment.project_id)
                .or_default()
                .push(AssignmentView {
                    id: assignment.id,
                    user_id: assignment.user_id,
                    assigned_at: assignment.assigned_at,
                    user: user.map(UserSummary::from),
                });
        }

        Ok(projects
            .into_iter()
            .map(|project| ProjectView {
                assignments: by_project.remove(&project.id).unwrap_or_default(),
                project,
            })
            .collect())
    }

    async fn view(&self, project: project::Model) -> Result<ProjectView, ServiceError> {
        self.views(vec![project])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("project view missing".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        company_id: i32,
        filter: ProjectFilter,
    ) -> Result<Vec<ProjectView>, ServiceError> {
        let mut query = project::Entity::find().filter(project::Column::CompanyId.eq(company_id));
        if let Some(status) = filter.status.as_deref().filter(|s| !s.trim().is_empty()) {
            query = query.filter(project::Column::Status.eq(parse_status(status)?));
        }
        if let Some(kind) = filter.project_type.as_deref().filter(|t| !t.trim().is_empty()) {
            query = query.filter(project::Column::ProjectType.eq(kind.trim()));
        }

        let projects = query
            .order_by_desc(project::Column::CreatedAt)
            .order_by_desc(project::Column::Id)
            .all(&*self.db_pool)
            .await?;
        self.views(projects).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, company_id: i32, project_id: i32) -> Result<ProjectView, ServiceError> {
        let project = scope::company_project(&*self.db_pool, company_id, project_id).await?;
        self.view(project).await
    }

    #[instrument(skip(self, input), fields(project_code = %input.project_id))]
    pub async fn create(
        &self,
        company_id: i32,
        input: CreateProject,
    ) -> Result<ProjectView, ServiceError> {
        input.validate()?;
        ensure_budget("Budget", input.budget)?;
        ensure_budget("Quotation amount", input.quotation_amount)?;
        ensure_date_order(input.start_date, input.end_date)?;

        let project_code = input.project_id.trim().to_string();
        let duplicate = || ServiceError::Conflict("Project ID already exists".to_string());

        let existing = project::Entity::find()
            .filter(project::Column::ProjectCode.eq(project_code.clone()))
            .one(&*self.db_pool)
            .await?;
        if existing.is_some() {
            return Err(duplicate());
        }

        let created = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                if let Some(user_id) = input.assigned_user_id {
                    company_user(txn, company_id, user_id).await?;
                }

                let now = Utc::now();
                let project = project::ActiveModel {
                    project_code: Set(project_code),
                    name: Set(input.name.trim().to_string()),
                    client_name: Set(input.client_name.trim().to_string()),
                    project_type: Set(input
                        .project_type
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| DEFAULT_PROJECT_TYPE.to_string())),
                    budget: Set(input.budget),
                    quotation_amount: Set(input.quotation_amount),
                    description: Set(input.description),
                    start_date: Set(input.start_date),
                    end_date: Set(input.end_date),
                    due_date: Set(input.due_date),
                    status: Set(ProjectStatus::Pending),
                    company_id: Set(company_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                if let Some(user_id) = input.assigned_user_id {
                    assign(txn, project.id, user_id).await?;
                }
                Ok(project)
            })
        })
        .await
        .map_err(|e| if e.is_unique_violation() { duplicate() } else { e })?;

        info!(project_id = created.id, "project created");
        self.view(created).await
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        company_id: i32,
        project_id: i32,
        input: UpdateProject,
    ) -> Result<ProjectView, ServiceError> {
        let existing = scope::company_project(&*self.db_pool, company_id, project_id).await?;

        let status = input.status.as_deref().map(parse_status).transpose()?;
        if let Some(budget) = input.budget {
            ensure_budget("Budget", budget)?;
        }
        if let Some(quotation) = input.quotation_amount {
            ensure_budget("Quotation amount", quotation)?;
        }
        ensure_date_order(
            input.start_date.or(existing.start_date),
            input.end_date.or(existing.end_date),
        )?;

        let updated = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                let mut active: project::ActiveModel = existing.into();

                let text = |value: String| Some(value.trim().to_string()).filter(|v| !v.is_empty());
                if let Some(name) = input.name.and_then(text) {
                    active.name = Set(name);
                }
                if let Some(client) = input.client_name.and_then(text) {
                    active.client_name = Set(client);
                }
                if let Some(kind) = input.project_type.and_then(text) {
                    active.project_type = Set(kind);
                }
                if let Some(budget) = input.budget {
                    active.budget = Set(budget);
                }
                if let Some(quotation) = input.quotation_amount {
                    active.quotation_amount = Set(quotation);
                }
                if let Some(description) = input.description {
                    active.description = Set(description);
                }
                if let Some(start) = input.start_date {
                    active.start_date = Set(Some(start));
                }
                if let Some(end) = input.end_date {
                    active.end_date = Set(Some(end));
                }
                if let Some(due) = input.due_date {
                    active.due_date = Set(Some(due));
                }
                if let Some(status) = status {
                    active.status = Set(status);
                }
                active.updated_at = Set(Utc::now());
                let project = active.update(txn).await?;

                if let Some(assignee) = input.assigned_user_id {
                    if let Some(user_id) = assignee {
                        company_user(txn, company_id, user_id).await?;
                    }
                    project_assignment::Entity::delete_many()
                        .filter(project_assignment::Column::ProjectId.eq(project.id))
                        .exec(txn)
                        .await?;
                    if let Some(user_id) = assignee {
                        assign(txn, project.id, user_id).await?;
                    }
                }
                Ok(project)
            })
        })
        .await?;

        info!(project_id, status = ?updated.status, "project updated");
        self.view(updated).await
    }

    /// Removes the project with everything recorded against it, then its blobs.
    #[instrument(skip(self))]
    pub async fn delete(&self, company_id: i32, project_id: i32) -> Result<(), ServiceError> {
        scope::company_project(&*self.db_pool, company_id, project_id).await?;

        let blobs = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move { delete_project_rows(txn, project_id).await })
        })
        .await?;

        for blob in &blobs {
            self.storage.remove(storage::PROJECT_AREA, blob).await;
        }
        info!(project_id, files = blobs.len(), "project deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_files(
        &self,
        company_id: i32,
        project_id: i32,
    ) -> Result<Vec<project_file::Model>, ServiceError> {
        let db = &*self.db_pool;
        scope::company_project(db, company_id, project_id).await?;
        Ok(project_file::Entity::find()
            .filter(project_file::Column::ProjectId.eq(project_id))
            .order_by_desc(project_file::Column::UploadedAt)
            .order_by_desc(project_file::Column::Id)
            .all(db)
            .await?)
    }

    /// Stores an uploaded document and records it against the project.
    #[instrument(skip(self, upload), fields(original_name = %upload.original_name, size = upload.bytes.len()))]
    pub async fn upload_file(
        &self,
        company_id: i32,
        project_id: i32,
        uploaded_by: i32,
        upload: Upload,
    ) -> Result<project_file::Model, ServiceError> {
        let ext = storage::accepted_extension(&upload.original_name, storage::PROJECT_FILE_EXTENSIONS)?;
        if upload.bytes.is_empty() {
            return Err(ServiceError::ValidationError("No file uploaded".to_string()));
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(ServiceError::ValidationError(format!(
                "File exceeds the {} byte limit",
                self.max_upload_bytes
            )));
        }

        let db = &*self.db_pool;
        scope::company_project(db, company_id, project_id).await?;

        let file_name = storage::generate_file_name("file", &ext);
        self.storage
            .save(storage::PROJECT_AREA, &file_name, &upload.bytes)
            .await?;

        let row = project_file::ActiveModel {
            project_id: Set(project_id),
            original_name: Set(upload.original_name.clone()),
            file_name: Set(file_name.clone()),
            url: Set(storage::public_url(storage::PROJECT_AREA, &file_name)),
            mime_type: Set(upload.mime_type()),
            size: Set(upload.bytes.len() as i64),
            uploaded_by: Set(uploaded_by),
            uploaded_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await;

        match row {
            Ok(row) => {
                info!(file_id = row.id, project_id, "project file uploaded");
                Ok(row)
            }
            Err(e) => {
                warn!(file_name = %file_name, "discarding blob after failed insert");
                self.storage.remove(storage::PROJECT_AREA, &file_name).await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_file(
        &self,
        company_id: i32,
        project_id: i32,
        file_id: i32,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        scope::company_project(db, company_id, project_id).await?;

        let file = project_file::Entity::find_by_id(file_id)
            .filter(project_file::Column::ProjectId.eq(project_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("File not found".to_string()))?;

        project_file::Entity::delete_by_id(file.id).exec(db).await?;
        self.storage.remove(storage::PROJECT_AREA, &file.file_name).await;
        info!(file_id, project_id, "project file deleted");
        Ok(())
    }
}
