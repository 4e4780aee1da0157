//! Vote Endpoints
//!
//! `targetType` 은 `Question | Answer | Comment` (대소문자 구분),
//! `voteType` 은 `upvote | downvote`.

use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{TargetType, VoteTarget, VoteType};
use crate::error::{ApiError, FieldError};
use crate::routes::{ApiJson, ApiPath};
use crate::services::VoteService;
use crate::types::MessageResponse;
use crate::AppState;

// ============ Request Types ============

/// 투표 요청
///
/// enum 필드는 문자열로 받아 필드 단위 에러로 검증함
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub target: Uuid,
    pub target_type: String,
    pub vote_type: String,
}

fn parse_vote_type(value: &str) -> Result<VoteType, String> {
    match value {
        "upvote" => Ok(VoteType::Upvote),
        "downvote" => Ok(VoteType::Downvote),
        other => Err(format!("voteType must be upvote or downvote (got '{}')", other)),
    }
}

// ============ Handlers ============

/// POST /api/votes
///
/// # Request
///
/// ```json
/// { "target": "uuid", "targetType": "Answer", "voteType": "upvote" }
/// ```
///
/// # Errors
/// - 400: 같은 방향으로 이미 투표함 / 필드 오류
/// - 404: 대상 없음
pub async fn cast_vote(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(req): ApiJson<VoteRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (target_type, vote_type) = match (
        req.target_type.parse::<TargetType>(),
        parse_vote_type(&req.vote_type),
    ) {
        (Ok(target_type), Ok(vote_type)) => (target_type, vote_type),
        (target_type, vote_type) => {
            let errors = [("targetType", target_type.err()), ("voteType", vote_type.err())]
                .into_iter()
                .filter_map(|(field, e)| e.map(|message| FieldError::new(field, message)))
                .collect();
            return Err(ApiError::ValidationError(errors));
        }
    };

    let receipt = VoteService::new(state.store.clone())
        .cast_vote(user.id, VoteTarget::new(req.target, target_type), vote_type)
        .await?;

    Ok(Json(MessageResponse::new(receipt.message())))
}

/// DELETE /api/votes/:targetId/:targetType
pub async fn remove_vote(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath((target_id, target_type)): ApiPath<(Uuid, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target_type = target_type
        .parse::<TargetType>()
        .map_err(|e| ApiError::invalid("targetType", e))?;

    VoteService::new(state.store.clone())
        .remove_vote(user.id, VoteTarget::new(target_id, target_type))
        .await?;

    Ok(Json(MessageResponse::new("Vote removed successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vote_type_is_lowercase_only() {
        assert_eq!(parse_vote_type("upvote"), Ok(VoteType::Upvote));
        assert!(parse_vote_type("Upvote").is_err());
        assert!(parse_vote_type("sideways").is_err());
    }
}
