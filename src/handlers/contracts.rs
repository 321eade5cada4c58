use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::contracts::{ContractView, CreateContract, UpdateContract},
    ApiResponse, ApiResult, AppState,
};

pub async fn list_contracts(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<ContractView>> {
    let contracts = state
        .services
        .contracts
        .list(auth_user.company_id)
        .await?;
    Ok(Json(ApiResponse::success(contracts)))
}

pub async fn list_for_project(
    State(state): State<AppState>,
    Path(project_id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<Vec<ContractView>> {
    let contracts = state
        .services
        .contracts
        .list_for_project(auth_user.company_id, project_id)
        .await?;
    Ok(Json(ApiResponse::success(contracts)))
}

pub async fn get_contract(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<ContractView> {
    let contract = state
        .services
        .contracts
        .get(auth_user.company_id, id)
        .await?;
    Ok(Json(ApiResponse::success(contract)))
}

pub async fn create_contract(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateContract>,
) -> Result<(StatusCode, Json<ApiResponse<ContractView>>), ServiceError> {
    let created = state
        .services
        .contracts
        .create(auth_user.company_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created).with_message("Contract created successfully")),
    ))
}

pub async fn update_contract(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateContract>,
) -> ApiResult<ContractView> {
    let updated = state
        .services
        .contracts
        .update(auth_user.company_id, id, payload)
        .await?;
    Ok(Json(
        ApiResponse::success(updated).with_message("Contract updated successfully"),
    ))
}

pub async fn delete_contract(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .contracts
        .delete(auth_user.company_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Contract deleted successfully"),
    ))
}
