use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::financial::{
        BudgetProject, CreateBudgetProject, ExpenseInput, ExpenseLine, FinancialSummary,
    },
    ApiResponse, ApiResult, AppState,
};

pub async fn list_projects(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<BudgetProject>> {
    let projects = state
        .services
        .financial
        .projects(auth_user.company_id)
        .await?;
    Ok(Json(ApiResponse::success(projects)))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<BudgetProject> {
    let project = state
        .services
        .financial
        .project(auth_user.company_id, id)
        .await?;
    Ok(Json(ApiResponse::success(project)))
}

pub async fn create_project(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateBudgetProject>,
) -> Result<(StatusCode, Json<ApiResponse<BudgetProject>>), ServiceError> {
    let created = state
        .services
        .financial
        .create_project(auth_user.company_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn add_expense(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<ExpenseInput>,
) -> Result<(StatusCode, Json<ApiResponse<ExpenseLine>>), ServiceError> {
    let expense = state
        .services
        .financial
        .add_expense(auth_user.company_id, id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(expense))))
}

pub async fn update_expense(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
    Json(payload): Json<ExpenseInput>,
) -> ApiResult<ExpenseLine> {
    let expense = state
        .services
        .financial
        .update_expense(auth_user.company_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(expense)))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .financial
        .delete_expense(auth_user.company_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Expense deleted successfully"),
    ))
}

pub async fn summary(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<FinancialSummary> {
    let summary = state
        .services
        .financial
        .summary(auth_user.company_id)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
