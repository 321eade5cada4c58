use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::material_requests::{
        ApproveMaterialRequest, RejectMaterialRequest, RequestView, SubmitMaterialRequest,
    },
    ApiResponse, ApiResult, AppState,
};

/// Requests submitted by the caller
#[utoipa::path(
    get,
    path = "/api/material-requests/my-requests",
    summary = "List my material requests",
    description = "Requests submitted by the authenticated user, newest first",
    responses(
        (status = 200, description = "Requests retrieved"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Material Requests"
)]
pub async fn my_requests(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<RequestView>> {
    let requests = state
        .services
        .material_requests
        .my_requests(auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(requests)))
}

#[utoipa::path(
    get,
    path = "/api/material-requests/pending",
    summary = "List pending material requests",
    description = "PENDING requests of the caller's company, newest first",
    responses(
        (status = 200, description = "Requests retrieved"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Material Requests"
)]
pub async fn pending_requests(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<RequestView>> {
    let requests = state
        .services
        .material_requests
        .pending(auth_user.company_id)
        .await?;
    Ok(Json(ApiResponse::success(requests)))
}

#[utoipa::path(
    get,
    path = "/api/material-requests",
    summary = "List all material requests",
    responses(
        (status = 200, description = "Requests retrieved"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Material Requests"
)]
pub async fn list_requests(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<RequestView>> {
    let requests = state
        .services
        .material_requests
        .all(auth_user.company_id)
        .await?;
    Ok(Json(ApiResponse::success(requests)))
}

#[utoipa::path(
    post,
    path = "/api/material-requests",
    summary = "Submit a material request",
    description = "Submit a GLOBAL, PROJECT or PROJECT_MATERIAL request for admin review",
    request_body = SubmitMaterialRequest,
    responses(
        (status = 201, description = "Request submitted"),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Project or material not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Material Requests"
)]
pub async fn submit_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<SubmitMaterialRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RequestView>>), ServiceError> {
    let created = state
        .services
        .material_requests
        .submit(&auth_user, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created).with_message("Material request submitted successfully")),
    ))
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/approve",
    summary = "Approve a material request",
    description = "Approve a PENDING request and apply its catalog and allocation effects atomically",
    params(("id" = i32, Path, description = "Material request id")),
    request_body = ApproveMaterialRequest,
    responses(
        (status = 200, description = "Request approved"),
        (status = 403, description = "Request belongs to another company", body = crate::errors::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Request has already been reviewed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Material Requests"
)]
pub async fn approve_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    payload: Option<Json<ApproveMaterialRequest>>,
) -> ApiResult<RequestView> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let approved = state
        .services
        .material_requests
        .approve(&auth_user, id, payload)
        .await?;
    Ok(Json(
        ApiResponse::success(approved).with_message("Material request approved successfully"),
    ))
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/reject",
    summary = "Reject a material request",
    params(("id" = i32, Path, description = "Material request id")),
    request_body = RejectMaterialRequest,
    responses(
        (status = 200, description = "Request rejected"),
        (status = 400, description = "Rejection reason is required", body = crate::errors::ErrorResponse),
        (status = 403, description = "Request belongs to another company", body = crate::errors::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Request has already been reviewed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Material Requests"
)]
pub async fn reject_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<RejectMaterialRequest>,
) -> ApiResult<RequestView> {
    let rejected = state
        .services
        .material_requests
        .reject(&auth_user, id, payload)
        .await?;
    Ok(Json(
        ApiResponse::success(rejected).with_message("Material request rejected"),
    ))
}
