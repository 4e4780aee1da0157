//! User Endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{User, UserRole};
use crate::error::ApiError;
use crate::routes::{ApiJson, ApiPath};
use crate::services::{ProfileChanges, UserService};
use crate::types::MessageResponse;
use crate::AppState;

/// 공개 프로필 (email, credential 제외)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub reputation: i64,
    pub role: UserRole,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            reputation: user.reputation,
            role: user.role,
            bio: user.bio,
            location: user.location,
            website: user.website,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

/// GET /api/users/me
pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// PUT /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(changes): ApiJson<ProfileChanges>,
) -> Result<Json<User>, ApiError> {
    let updated = UserService::new(state.store.clone())
        .update_profile(user.id, changes)
        .await?;
    Ok(Json(updated))
}

/// DELETE /api/users/me
pub async fn deactivate_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    UserService::new(state.store.clone())
        .deactivate(user.id)
        .await?;
    Ok(Json(MessageResponse::new("Account deactivated successfully")))
}

/// GET /api/users/leaderboard?limit=
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<PublicProfile>>, ApiError> {
    let users = UserService::new(state.store.clone())
        .leaderboard(query.limit)
        .await?;
    Ok(Json(users.into_iter().map(PublicProfile::from).collect()))
}

/// GET /api/users/profile/:username
pub async fn profile_by_username(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
) -> Result<Json<PublicProfile>, ApiError> {
    let user = UserService::new(state.store.clone())
        .by_username(&username)
        .await?;
    Ok(Json(user.into()))
}

/// GET /api/users/:id
pub async fn profile(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PublicProfile>, ApiError> {
    let user = UserService::new(state.store.clone()).by_id(id).await?;
    Ok(Json(user.into()))
}
