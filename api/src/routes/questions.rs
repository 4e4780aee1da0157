//! Question Endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::Question;
use crate::error::ApiError;
use crate::routes::{ApiJson, ApiPath};
use crate::services::{NewQuestion, QuestionChanges, QuestionService};
use crate::types::{MessageResponse, Page, PageQuery};
use crate::AppState;

/// GET /api/questions?page=1&limit=10
///
/// 최신순, deleted 제외
pub async fn list_questions(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Question>>, ApiError> {
    let page = QuestionService::new(state.store.clone())
        .list(query.into())
        .await?;
    Ok(Json(page))
}

/// POST /api/questions
///
/// ```json
/// { "title": "...", "description": "...", "tags": ["rust", "axum"] }
/// ```
///
/// 없는 태그는 자동 생성됨
pub async fn create_question(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(req): ApiJson<NewQuestion>,
) -> Result<(StatusCode, Json<Question>), ApiError> {
    let question = QuestionService::new(state.store.clone())
        .create(&user, req)
        .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// GET /api/questions/:id
pub async fn get_question(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Question>, ApiError> {
    let question = QuestionService::new(state.store.clone()).get(id).await?;
    Ok(Json(question))
}

/// PUT /api/questions/:id
pub async fn update_question(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<QuestionChanges>,
) -> Result<Json<Question>, ApiError> {
    let question = QuestionService::new(state.store.clone())
        .update(&user, id, req)
        .await?;
    Ok(Json(question))
}

/// DELETE /api/questions/:id
pub async fn delete_question(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    QuestionService::new(state.store.clone())
        .delete(&user, id)
        .await?;
    Ok(Json(MessageResponse::new("Question deleted successfully")))
}
