//! Notification Endpoints
//!
//! 모두 인증 필요. 본인 알림만 조회/변경 가능 (다른 사용자 알림은 404).

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Notification, NotificationStatus};
use crate::error::ApiError;
use crate::routes::ApiPath;
use crate::services::NotificationService;
use crate::types::{MessageResponse, Page, PageRequest};
use crate::AppState;

// ============ Request/Response Types ============

/// 목록 쿼리 (`?status=unread&page=1&limit=20`)
#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub status: Option<NotificationStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

// ============ Handlers ============

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Page<Notification>>, ApiError> {
    let page = PageRequest::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(PageRequest::DEFAULT_LIMIT),
    );
    let notifications = NotificationService::new(state.store.clone())
        .list(user.id, query.status, page)
        .await?;
    Ok(Json(notifications))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let count = NotificationService::new(state.store.clone())
        .unread_count(user.id)
        .await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// PUT /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    let notification = NotificationService::new(state.store.clone())
        .mark_read(id, user.id)
        .await?;
    Ok(Json(notification))
}

/// PUT /api/notifications/mark-all-read
pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let updated = NotificationService::new(state.store.clone())
        .mark_all_read(user.id)
        .await?;
    Ok(Json(MessageResponse::new(format!(
        "{} notifications marked as read",
        updated
    ))))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    NotificationService::new(state.store.clone())
        .delete(id, user.id)
        .await?;
    Ok(Json(MessageResponse::new("Notification deleted successfully")))
}
