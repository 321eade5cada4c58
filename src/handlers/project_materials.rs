use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::project_materials::{AddProjectMaterial, AllocationView, UpdateProjectMaterial},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/project-materials/{id}",
    summary = "List project allocations",
    description = "Materials allocated to a project with their remaining quantity",
    params(("id" = i32, Path, description = "Project id")),
    responses(
        (status = 200, description = "Allocations retrieved"),
        (status = 404, description = "Project not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Project Materials"
)]
pub async fn list_for_project(
    State(state): State<AppState>,
    Path(project_id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<Vec<AllocationView>> {
    let allocations = state
        .services
        .project_materials
        .list_for_project(auth_user.company_id, project_id)
        .await?;
    Ok(Json(ApiResponse::success(allocations)))
}

#[utoipa::path(
    post,
    path = "/api/project-materials",
    summary = "Allocate a material to a project",
    request_body = AddProjectMaterial,
    responses(
        (status = 201, description = "Allocation created"),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Project or material not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Material already assigned to this project", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Project Materials"
)]
pub async fn add_allocation(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<AddProjectMaterial>,
) -> Result<(StatusCode, Json<ApiResponse<AllocationView>>), ServiceError> {
    let created = state
        .services
        .project_materials
        .add(auth_user.company_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created).with_message("Material assigned to project")),
    ))
}

#[utoipa::path(
    put,
    path = "/api/project-materials/{id}",
    summary = "Adjust an allocation",
    description = "Changes the assigned quantity; used is owned by usage logs",
    params(("id" = i32, Path, description = "Allocation id")),
    request_body = UpdateProjectMaterial,
    responses(
        (status = 200, description = "Allocation updated"),
        (status = 404, description = "Allocation not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Project Materials"
)]
pub async fn update_allocation(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateProjectMaterial>,
) -> ApiResult<AllocationView> {
    let updated = state
        .services
        .project_materials
        .update(auth_user.company_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/project-materials/{id}",
    summary = "Remove an allocation",
    params(("id" = i32, Path, description = "Allocation id")),
    responses(
        (status = 200, description = "Allocation removed"),
        (status = 404, description = "Allocation not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Material has usage records", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Project Materials"
)]
pub async fn remove_allocation(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .project_materials
        .remove(auth_user.company_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Material removed from project"),
    ))
}
