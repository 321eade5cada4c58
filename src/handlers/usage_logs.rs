use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::ProjectQuery,
    services::usage::{RecordUsage, UpdateUsage, UsageLogView, UsageOutcome},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/usage-logs",
    summary = "List usage logs of a project",
    params(ProjectQuery),
    responses(
        (status = 200, description = "Usage logs retrieved, newest first"),
        (status = 400, description = "Project ID is required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Usage Logs"
)]
pub async fn list_usage(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
    auth_user: AuthUser,
) -> ApiResult<Vec<UsageLogView>> {
    let project_id = query.required()?;
    let logs = state
        .services
        .usage
        .list(auth_user.company_id, project_id)
        .await?;
    Ok(Json(ApiResponse::success(logs)))
}

#[utoipa::path(
    post,
    path = "/api/usage-logs",
    summary = "Record material usage",
    description = "Adds the quantity to the allocation's used total; the response carries a warning when usage exceeds the assignment",
    request_body = RecordUsage,
    responses(
        (status = 201, description = "Usage recorded"),
        (status = 400, description = "Invalid quantity or material not assigned", body = crate::errors::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Usage Logs"
)]
pub async fn record_usage(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<RecordUsage>,
) -> Result<(StatusCode, Json<ApiResponse<UsageOutcome>>), ServiceError> {
    let outcome = state
        .services
        .usage
        .record(auth_user.company_id, auth_user.user_id, payload)
        .await?;
    let warning = outcome.warning.clone();
    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::success(outcome)
                .with_message("Usage logged successfully")
                .with_warning(warning),
        ),
    ))
}

#[utoipa::path(
    put,
    path = "/api/usage-logs/{id}",
    summary = "Update a usage log",
    params(("id" = i32, Path, description = "Usage log id")),
    request_body = UpdateUsage,
    responses(
        (status = 200, description = "Usage updated"),
        (status = 403, description = "Usage log belongs to another company", body = crate::errors::ErrorResponse),
        (status = 404, description = "Usage log not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Allocation changed concurrently", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Usage Logs"
)]
pub async fn update_usage(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateUsage>,
) -> ApiResult<UsageOutcome> {
    let outcome = state
        .services
        .usage
        .update(auth_user.company_id, id, payload)
        .await?;
    let warning = outcome.warning.clone();
    Ok(Json(
        ApiResponse::success(outcome)
            .with_message("Usage updated successfully")
            .with_warning(warning),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/usage-logs/{id}",
    summary = "Delete a usage log",
    description = "Subtracts the logged quantity from the allocation, never below zero",
    params(("id" = i32, Path, description = "Usage log id")),
    responses(
        (status = 200, description = "Usage deleted"),
        (status = 403, description = "Usage log belongs to another company", body = crate::errors::ErrorResponse),
        (status = 404, description = "Usage log not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Usage Logs"
)]
pub async fn delete_usage(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .usage
        .delete(auth_user.company_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Usage deleted successfully"),
    ))
}
