//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;

/// 필드 단위 검증 에러
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// API 에러 타입
///
/// 각 variant 는 HTTP 상태 코드 하나에 매핑됨.
/// 5xx 의 내부 정보는 로그로만 남기고 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Validation failed")]
    ValidationError(Vec<FieldError>),

    #[error("You have already voted")]
    DuplicateVote,

    // ============ 401 Unauthorized ============
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    // ============ 403 Forbidden ============
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    // ============ 404 Not Found ============
    #[error("{0} not found")]
    NotFound(String),

    #[error("Vote not found")]
    VoteNotFound,

    // ============ 409 Conflict ============
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ 429 Too Many Requests ============
    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    // ============ 500 Internal Server Error ============
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    InternalError,
}

impl ApiError {
    /// 단일 필드 검증 에러
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) | ApiError::DuplicateVote => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::VoteNotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::DatabaseError(_) | ApiError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::DuplicateVote => "DUPLICATE_VOTE",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::NotAuthorized(_) => "NOT_AUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::VoteNotFound => "VOTE_NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            // 내부 에러는 클라이언트에 상세 정보 노출 안 함
            ApiError::DatabaseError(detail) => {
                tracing::error!(%detail, "database error");
                "Database error occurred".to_string()
            }
            ApiError::InternalError => {
                tracing::error!("internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let errors = match &self {
            ApiError::ValidationError(fields) => Some(fields.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            code: self.code().to_string(),
            message,
            errors,
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Store 에러를 ApiError로 변환
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(constraint) => {
                tracing::warn!(%constraint, "unique constraint race");
                ApiError::Conflict(format!("concurrent update on {}", constraint))
            }
            StoreError::Database(e) => ApiError::DatabaseError(e.to_string()),
            StoreError::Corrupt(detail) => {
                tracing::error!(%detail, "corrupt record");
                ApiError::InternalError
            }
        }
    }
}

/// 잘못된 JSON body 는 검증 에러로 취급
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid("body", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::invalid("path", rejection.body_text())
    }
}

/// anyhow 에러를 ApiError로 변환
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {:?}", err);
        ApiError::InternalError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::DuplicateVote.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::VoteNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::NotAuthorized("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unique_violation_becomes_conflict() {
        let err: ApiError = StoreError::UniqueViolation("votes_user_target_key".into()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
