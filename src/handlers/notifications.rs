use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthUser,
    entities::notification,
    services::notifications::NotificationList,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct Affected {
    pub count: u64,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
    auth_user: AuthUser,
) -> ApiResult<NotificationList> {
    let inbox = state
        .services
        .notifications
        .list(auth_user.user_id, query.unread_only)
        .await?;
    Ok(Json(ApiResponse::success(inbox)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<notification::Model> {
    let updated = state
        .services
        .notifications
        .mark_read(auth_user.user_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(updated).with_message("Notification marked as read"),
    ))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Affected> {
    let count = state
        .services
        .notifications
        .mark_all_read(auth_user.user_id)
        .await?;
    Ok(Json(
        ApiResponse::success(Affected { count })
            .with_message("All notifications marked as read"),
    ))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    auth_user: AuthUser,
) -> ApiResult<()> {
    state
        .services
        .notifications
        .delete(auth_user.user_id, id)
        .await?;
    Ok(Json(
        ApiResponse::success(()).with_message("Notification deleted"),
    ))
}

pub async fn clear_read(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Affected> {
    let count = state
        .services
        .notifications
        .clear_read(auth_user.user_id)
        .await?;
    Ok(Json(
        ApiResponse::success(Affected { count }).with_message("Read notifications cleared"),
    ))
}
