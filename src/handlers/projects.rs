use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    entities::project_file,
    errors::ServiceError,
    handlers::common::read_upload,
    services::projects::{CreateProject, ProjectFilter, ProjectView, UpdateProject},
    ApiResponse, ApiResult, AppState,
};

/// Multipart field carrying a project document.
const FILE_FIELD: &str = "file";

pub async fn list_projects(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
    auth_user: AuthUser,
) -> ApiResult<Vec<ProjectView>> {
    let projects = state
        .services
        .projects
        .list(auth_user.company_id, filter)
        .await?;
    Ok(Json(ApiResponse::success(projects)))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<ProjectView> {
    let project = state
        .services
        .projects
        .get(auth_user.company_id, id)
        .await?;
    Ok(Json(ApiResponse::success(project)))
}

pub async fn create_project(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateProject>,
) -> Result<(StatusCode, Json<ApiResponse<ProjectView>>), ServiceError> {
    let created = state
        .services
        .projects
        .create(auth_user.company_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created).with_message("Project created successfully")),
    ))
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateProject>,
) -> ApiResult<ProjectView> {
    let updated = state
        .services
        .projects
        .update(auth_user.company_id, id, payload)
        .await?;
    Ok(Json(
        ApiResponse::success(updated).with_message("Project updated successfully"),
    ))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .projects
        .delete(auth_user.company_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Project deleted successfully"),
    ))
}

pub async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<Vec<project_file::Model>> {
    let files = state
        .services
        .projects
        .list_files(auth_user.company_id, id)
        .await?;
    Ok(Json(ApiResponse::success(files)))
}

pub async fn upload_file(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<project_file::Model>>), ServiceError> {
    let upload = read_upload(multipart, FILE_FIELD).await?;
    let stored = state
        .services
        .projects
        .upload_file(auth_user.company_id, id, auth_user.user_id, upload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(stored).with_message("File uploaded successfully")),
    ))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(i32, i32)>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .projects
        .delete_file(auth_user.company_id, id, file_id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("File deleted successfully"),
    ))
}
