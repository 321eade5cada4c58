use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    entities::material,
    errors::ServiceError,
    services::materials::{CreateMaterial, MaterialFilter, UpdateMaterial},
    ApiResponse, ApiResult, AppState,
};

pub async fn list_materials(
    State(state): State<AppState>,
    Query(filter): Query<MaterialFilter>,
    auth_user: AuthUser,
) -> ApiResult<Vec<material::Model>> {
    let materials = state
        .services
        .materials
        .list(auth_user.company_id, filter)
        .await?;
    Ok(Json(ApiResponse::success(materials)))
}

/// Category menu for the catalog filter, led by "All".
pub async fn list_categories(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<String>> {
    let categories = state
        .services
        .materials
        .categories(auth_user.company_id)
        .await?;
    Ok(Json(ApiResponse::success(categories)))
}

pub async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<material::Model> {
    let material = state
        .services
        .materials
        .get(auth_user.company_id, id)
        .await?;
    Ok(Json(ApiResponse::success(material)))
}

pub async fn create_material(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateMaterial>,
) -> Result<(StatusCode, Json<ApiResponse<material::Model>>), ServiceError> {
    let created = state
        .services
        .materials
        .create(auth_user.company_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created).with_message("Material created successfully")),
    ))
}

pub async fn update_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateMaterial>,
) -> ApiResult<material::Model> {
    let updated = state
        .services
        .materials
        .update(auth_user.company_id, id, payload)
        .await?;
    Ok(Json(
        ApiResponse::success(updated).with_message("Material updated successfully"),
    ))
}

pub async fn delete_material(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .materials
        .delete(auth_user.company_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Material deleted successfully"),
    ))
}
