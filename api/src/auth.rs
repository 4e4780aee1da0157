//! JWT Authentication
//!
//! 토큰 발급은 외부 auth 서비스 담당. 여기서는 `Authorization: Bearer <jwt>`
//! (HS256) 를 검증하고 `sub` 의 사용자를 store 에서 로드함.
//!
//! # Interview Q&A
//!
//! Q: 왜 middleware 가 아니라 extractor 인가?
//! A: 인증이 필요한 핸들러만 `AuthUser` 를 인자로 받으면 되므로 라우트 단위로
//!    명시적임. 공개 라우트와 보호 라우트를 같은 Router 에 섞어 둘 수 있음.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{User, UserRole, UserStatus};
use crate::error::ApiError;
use crate::AppState;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 사용자 id
    pub sub: String,
    /// 만료 시각 (Unix timestamp)
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, ApiError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))
    }
}

/// `Bearer <token>` 에서 토큰 추출
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Authorization header is required".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ApiError::Unauthorized("Expected: Authorization: Bearer <token>".to_string())
        })
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(secret.as_bytes());

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ApiError::Unauthorized("Token has expired".to_string()),
            _ => ApiError::Unauthorized("Invalid token".to_string()),
        })
}

/// 서명 검증만 하고 사용자 id 반환 (rate limit 키 용, store 조회 없음)
pub fn token_subject(headers: &HeaderMap, secret: &str) -> Option<Uuid> {
    let token = bearer_token(headers).ok()?;
    decode_claims(token, secret).ok()?.user_id().ok()
}

/// 인증된 활성 사용자
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let user_id = decode_claims(token, &state.config.jwt_secret)?.user_id()?;

        let mut tx = state.store.begin().await?;
        let user = tx
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;

        match user.status {
            UserStatus::Active => Ok(AuthUser(user)),
            UserStatus::Suspended | UserStatus::Banned => {
                tracing::debug!(%user_id, status = ?user.status, "inactive user rejected");
                Err(ApiError::NotAuthorized("Account is not active".to_string()))
            }
        }
    }
}

/// admin 전용 라우트
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role != UserRole::Admin {
            return Err(ApiError::NotAuthorized("Admin role required".to_string()));
        }
        Ok(AdminUser(user))
    }
}
