use crate::{
    db::DbPool,
    entities::notification::{self, NotificationKind},
    errors::ServiceError,
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Newest notifications returned by a listing.
pub const LIST_LIMIT: u64 = 50;

/// Delivery seam for user-facing notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient_id: i32,
        message: &str,
        kind: NotificationKind,
    ) -> Result<(), ServiceError>;
}

/// Stores each notification as an unread row for the recipient.
#[derive(Clone)]
pub struct DbNotifier {
    db_pool: Arc<DbPool>,
}

impl DbNotifier {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn notify(
        &self,
        recipient_id: i32,
        message: &str,
        kind: NotificationKind,
    ) -> Result<(), ServiceError> {
        notification::ActiveModel {
            recipient_id: Set(recipient_id),
            message: Set(message.to_string()),
            kind: Set(kind),
            read: Set(false),
            date: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        debug!(recipient_id, %kind, "notification stored");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub count: usize,
    pub unread_count: u64,
    pub notifications: Vec<notification::Model>,
}

/// Read side of the notification inbox
#[derive(Clone)]
pub struct NotificationService {
    db_pool: Arc<DbPool>,
}

impl NotificationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        recipient_id: i32,
        unread_only: bool,
    ) -> Result<NotificationList, ServiceError> {
        let db = &*self.db_pool;

        let mut query =
            notification::Entity::find().filter(notification::Column::RecipientId.eq(recipient_id));
        if unread_only {
            query = query.filter(notification::Column::Read.eq(false));
        }

        let notifications = query
            .order_by_desc(notification::Column::Date)
            .order_by_desc(notification::Column::Id)
            .limit(LIST_LIMIT)
            .all(db)
            .await?;

        let unread_count = notification::Entity::find()
            .filter(notification::Column::RecipientId.eq(recipient_id))
            .filter(notification::Column::Read.eq(false))
            .count(db)
            .await?;

        Ok(NotificationList {
            count: notifications.len(),
            unread_count,
            notifications,
        })
    }

    async fn owned(
        &self,
        recipient_id: i32,
        notification_id: i32,
    ) -> Result<notification::Model, ServiceError> {
        let found = notification::Entity::find_by_id(notification_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Notification not found".to_string()))?;

        if found.recipient_id != recipient_id {
            return Err(ServiceError::Forbidden(
                "Not authorized to access this notification".to_string(),
            ));
        }
        Ok(found)
    }

    #[instrument(skip(self))]
    pub async fn mark_read(
        &self,
        recipient_id: i32,
        notification_id: i32,
    ) -> Result<notification::Model, ServiceError> {
        let found = self.owned(recipient_id, notification_id).await?;
        let mut active: notification::ActiveModel = found.into();
        active.read = Set(true);
        Ok(active.update(&*self.db_pool).await?)
    }

    /// Returns the number of notifications flipped to read.
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, recipient_id: i32) -> Result<u64, ServiceError> {
        let result = notification::Entity::update_many()
            .col_expr(notification::Column::Read, Expr::value(true))
            .filter(notification::Column::RecipientId.eq(recipient_id))
            .filter(notification::Column::Read.eq(false))
            .exec(&*self.db_pool)
            .await?;
        Ok(result.rows_affected)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, recipient_id: i32, notification_id: i32) -> Result<(), ServiceError> {
        let found = self.owned(recipient_id, notification_id).await?;
        notification::Entity::delete_by_id(found.id)
            .exec(&*self.db_pool)
            .await?;
        Ok(())
    }

    /// Deletes every read notification of the recipient.
    #[instrument(skip(self))]
    pub async fn clear_read(&self, recipient_id: i32) -> Result<u64, ServiceError> {
        let result = notification::Entity::delete_many()
            .filter(notification::Column::RecipientId.eq(recipient_id))
            .filter(notification::Column::Read.eq(true))
            .exec(&*self.db_pool)
            .await?;
        Ok(result.rows_affected)
    }
}
