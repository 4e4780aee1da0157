//! User Service
//!
//! 프로필 조회 / 수정, 리더보드, 계정 비활성화.
//! 비활성화는 status = suspended 로 저장되며 이후 인증 extractor 에서 403.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::db::{Store, StoreError, User, UserStatus};
use crate::error::{ApiError, FieldError};
use crate::services::Validation;

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;
const BIO_MAX: usize = 500;
const LOCATION_MAX: usize = 100;

/// 프로필 부분 수정. 빈 문자열은 해당 프로필 필드 삭제
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
}

impl ProfileChanges {
    fn validate(&self) -> Result<(), ApiError> {
        let mut validation = Validation::default();

        if let Some(username) = &self.username {
            validation.length("username", username, USERNAME_LEN);
            if !username
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                validation.push(
                    "username",
                    "username can only contain letters, numbers, and underscores",
                );
            }
        }
        if let Some(email) = &self.email {
            if !looks_like_email(email.trim()) {
                validation.push("email", "email must be a valid email address");
            }
        }
        if let Some(bio) = &self.bio {
            validation.length("bio", bio, 0..=BIO_MAX);
        }
        if let Some(location) = &self.location {
            validation.length("location", location, 0..=LOCATION_MAX);
        }
        if let Some(website) = &self.website {
            let website = website.trim();
            if !website.is_empty() && !looks_like_url(website) {
                validation.push("website", "website must be a valid http(s) URL");
            }
        }

        validation.finish()
    }

    fn apply(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username.trim().to_string();
        }
        if let Some(email) = self.email {
            user.email = email.trim().to_lowercase();
        }
        if let Some(bio) = self.bio {
            user.bio = non_empty(bio);
        }
        if let Some(location) = self.location {
            user.location = non_empty(location);
        }
        if let Some(website) = self.website {
            user.website = non_empty(website);
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn looks_like_url(url: &str) -> bool {
    ["https://", "http://"]
        .iter()
        .filter_map(|scheme| url.strip_prefix(scheme))
        .any(|rest| !rest.is_empty() && !rest.chars().any(char::is_whitespace))
}

/// unique index 위반 → 필드 에러
fn taken(err: StoreError) -> ApiError {
    match &err {
        StoreError::UniqueViolation(constraint) if constraint == "users_username_key" => {
            ApiError::ValidationError(vec![FieldError::new("username", "username is already taken")])
        }
        StoreError::UniqueViolation(constraint) if constraint == "users_email_key" => {
            ApiError::ValidationError(vec![FieldError::new("email", "email is already registered")])
        }
        _ => err.into(),
    }
}

pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub const LEADERBOARD_DEFAULT: u32 = 20;
    pub const LEADERBOARD_MAX: u32 = 100;

    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn by_id(&self, id: Uuid) -> Result<User, ApiError> {
        let mut tx = self.store.begin().await?;
        tx.user_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User".to_string()))
    }

    pub async fn by_username(&self, username: &str) -> Result<User, ApiError> {
        let mut tx = self.store.begin().await?;
        tx.user_by_username(username)
            .await?
            .ok_or_else(|| ApiError::NotFound("User".to_string()))
    }

    /// active 사용자 reputation 순위
    pub async fn leaderboard(&self, limit: Option<u32>) -> Result<Vec<User>, ApiError> {
        let limit = limit
            .unwrap_or(Self::LEADERBOARD_DEFAULT)
            .clamp(1, Self::LEADERBOARD_MAX);
        let mut tx = self.store.begin().await?;
        Ok(tx.top_users(i64::from(limit)).await?)
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, ApiError> {
        changes.validate()?;

        let mut tx = self.store.begin().await?;
        let mut user = tx
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

        changes.apply(&mut user);
        tx.save_user(&user).await.map_err(taken)?;
        tx.commit().await?;

        tracing::info!(%user_id, username = %user.username, "profile updated");
        Ok(user)
    }

    /// 계정 비활성화 (suspended)
    pub async fn deactivate(&self, user_id: Uuid) -> Result<(), ApiError> {
        let mut tx = self.store.begin().await?;
        let mut user = tx
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

        user.status = UserStatus::Suspended;
        tx.save_user(&user).await?;
        tx.commit().await?;

        tracing::info!(%user_id, "account deactivated");
        Ok(())
    }
}
