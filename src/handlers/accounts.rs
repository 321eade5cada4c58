use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    entities::{company, user},
    errors::ServiceError,
    services::accounts::{AccountView, CompanySummary, LoginRequest, Session, SignupRequest},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    summary = "Register a user",
    description = "Creates the user, and the company when no company of that name exists",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User registered; returns a token and the user"),
        (status = 400, description = "Invalid signup data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "Auth"
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Session>>), ServiceError> {
    let session = state.services.accounts.signup(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(session).with_message("User registered successfully")),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    summary = "Log in with email and password",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Returns a token and the user"),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Session> {
    let session = state.services.accounts.login(payload).await?;
    Ok(Json(
        ApiResponse::success(session).with_message("Login successful"),
    ))
}

#[utoipa::path(
    get,
    path = "/api/auth/companies",
    summary = "List companies for the signup form",
    responses((status = 200, description = "Companies", body = ApiResponse<Vec<CompanySummary>>)),
    tag = "Auth"
)]
pub async fn companies(State(state): State<AppState>) -> ApiResult<Vec<CompanySummary>> {
    let companies = state.services.accounts.companies().await?;
    Ok(Json(ApiResponse::success(companies)))
}

pub async fn profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<AccountView> {
    let profile = state.services.accounts.profile(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

pub async fn users(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<user::Model>> {
    let users = state.services.accounts.users(auth_user.company_id).await?;
    Ok(Json(ApiResponse::success(users)))
}

pub async fn employees(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<user::Model>> {
    let employees = state
        .services
        .accounts
        .employees(auth_user.company_id)
        .await?;
    Ok(Json(ApiResponse::success(employees)))
}

pub async fn company(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<company::Model> {
    let company = state
        .services
        .accounts
        .company(auth_user.company_id, id)
        .await?;
    Ok(Json(ApiResponse::success(company)))
}
