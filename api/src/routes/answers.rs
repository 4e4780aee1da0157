//! Answer Endpoints
//!
//! 답변 작성/수정/삭제, 채택, 댓글.

use axum::{extract::State, http::StatusCode, Json};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Answer, Comment};
use crate::error::ApiError;
use crate::routes::{ApiJson, ApiPath};
use crate::services::{AnswerChanges, AnswerService, NewAnswer, NewComment};
use crate::types::MessageResponse;
use crate::AppState;

/// POST /api/answers
///
/// ```json
/// { "question": "uuid", "content": "..." }
/// ```
pub async fn create_answer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(req): ApiJson<NewAnswer>,
) -> Result<(StatusCode, Json<Answer>), ApiError> {
    let answer = AnswerService::new(state.store.clone())
        .create_answer(&user, req)
        .await?;
    Ok((StatusCode::CREATED, Json(answer)))
}

/// GET /api/answers/question/:questionId
pub async fn list_answers(
    State(state): State<AppState>,
    ApiPath(question_id): ApiPath<Uuid>,
) -> Result<Json<Vec<Answer>>, ApiError> {
    let answers = AnswerService::new(state.store.clone())
        .list_for_question(question_id)
        .await?;
    Ok(Json(answers))
}

/// PUT /api/answers/:id
pub async fn update_answer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AnswerChanges>,
) -> Result<Json<Answer>, ApiError> {
    let answer = AnswerService::new(state.store.clone())
        .update_answer(&user, id, req)
        .await?;
    Ok(Json(answer))
}

/// DELETE /api/answers/:id
pub async fn delete_answer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    AnswerService::new(state.store.clone())
        .delete_answer(&user, id)
        .await?;
    Ok(Json(MessageResponse::new("Answer deleted successfully")))
}

/// POST /api/answers/:id/accept
///
/// 질문 작성자만 가능 (403). 기존 채택 답변은 자동으로 해제됨
pub async fn accept_answer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    AnswerService::new(state.store.clone())
        .accept_answer(id, &user)
        .await?;
    Ok(Json(MessageResponse::new("Answer accepted successfully")))
}

/// POST /api/answers/:id/comments
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<NewComment>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = AnswerService::new(state.store.clone())
        .create_comment(&user, id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
