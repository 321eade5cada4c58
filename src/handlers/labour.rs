use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    entities::labour_payment,
    errors::ServiceError,
    services::labour::{
        CreateLabour, LabourFilter, LabourStatistics, LabourView, RecordPayment, UpdateLabour,
    },
    ApiResponse, ApiResult, AppState,
};

pub async fn list_labour(
    State(state): State<AppState>,
    Query(filter): Query<LabourFilter>,
    auth_user: AuthUser,
) -> ApiResult<Vec<LabourView>> {
    let labourers = state
        .services
        .labour
        .list(auth_user.company_id, filter.project_id)
        .await?;
    Ok(Json(ApiResponse::success(labourers)))
}

pub async fn list_for_project(
    State(state): State<AppState>,
    Path(project_id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<Vec<LabourView>> {
    let labourers = state
        .services
        .labour
        .list_for_project(auth_user.company_id, project_id)
        .await?;
    Ok(Json(ApiResponse::success(labourers)))
}

pub async fn statistics(
    State(state): State<AppState>,
    Query(filter): Query<LabourFilter>,
    auth_user: AuthUser,
) -> ApiResult<LabourStatistics> {
    let stats = state
        .services
        .labour
        .statistics(auth_user.company_id, filter.project_id)
        .await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn get_labour(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<LabourView> {
    let labour = state
        .services
        .labour
        .get(auth_user.company_id, id)
        .await?;
    Ok(Json(ApiResponse::success(labour)))
}

pub async fn create_labour(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateLabour>,
) -> Result<(StatusCode, Json<ApiResponse<LabourView>>), ServiceError> {
    let created = state
        .services
        .labour
        .create(auth_user.company_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created).with_message("Labour added successfully")),
    ))
}

pub async fn update_labour(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateLabour>,
) -> ApiResult<LabourView> {
    let updated = state
        .services
        .labour
        .update(auth_user.company_id, id, payload)
        .await?;
    Ok(Json(
        ApiResponse::success(updated).with_message("Labour updated successfully"),
    ))
}

pub async fn delete_labour(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .labour
        .delete(auth_user.company_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Labour deleted successfully"),
    ))
}

pub async fn add_payment(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<RecordPayment>,
) -> Result<(StatusCode, Json<ApiResponse<labour_payment::Model>>), ServiceError> {
    let payment = state
        .services
        .labour
        .add_payment(auth_user.company_id, id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(payment).with_message("Payment recorded successfully")),
    ))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<Vec<labour_payment::Model>> {
    let payments = state
        .services
        .labour
        .payments(auth_user.company_id, id)
        .await?;
    Ok(Json(ApiResponse::success(payments)))
}

pub async fn delete_payment(
    State(state): State<AppState>,
    Path((id, payment_id)): Path<(i32, i32)>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .labour
        .delete_payment(auth_user.company_id, id, payment_id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Payment deleted successfully"),
    ))
}
