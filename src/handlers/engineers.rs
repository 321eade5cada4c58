use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::read_upload,
    services::engineers::{
        CreateEngineer, EngineerLogin, EngineerSession, EngineerView, UpdateEngineer,
    },
    ApiResponse, ApiResult, AppState,
};

const IMAGE_FIELD: &str = "profileImage";

/// Username/password login for site engineers. Public.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<EngineerLogin>,
) -> ApiResult<EngineerSession> {
    let session = state.services.engineers.login(payload).await?;
    Ok(Json(
        ApiResponse::success(session).with_message("Login successful"),
    ))
}

pub async fn list_engineers(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<EngineerView>> {
    let engineers = state
        .services
        .engineers
        .list(auth_user.company_id)
        .await?;
    Ok(Json(ApiResponse::success(engineers)))
}

pub async fn get_engineer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<EngineerView> {
    let engineer = state
        .services
        .engineers
        .get(auth_user.company_id, id)
        .await?;
    Ok(Json(ApiResponse::success(engineer)))
}

pub async fn create_engineer(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateEngineer>,
) -> Result<(StatusCode, Json<ApiResponse<EngineerView>>), ServiceError> {
    let created = state
        .services
        .engineers
        .create(auth_user.company_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created).with_message("Engineer created successfully")),
    ))
}

pub async fn update_engineer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateEngineer>,
) -> ApiResult<EngineerView> {
    let updated = state
        .services
        .engineers
        .update(auth_user.company_id, id, payload)
        .await?;
    Ok(Json(
        ApiResponse::success(updated).with_message("Engineer updated successfully"),
    ))
}

pub async fn delete_engineer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .engineers
        .delete(auth_user.company_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Engineer deleted successfully"),
    ))
}

pub async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> ApiResult<EngineerView> {
    let upload = read_upload(multipart, IMAGE_FIELD).await?;
    let updated = state
        .services
        .engineers
        .upload_image(auth_user.company_id, id, upload)
        .await?;
    Ok(Json(
        ApiResponse::success(updated).with_message("Profile image uploaded successfully"),
    ))
}
