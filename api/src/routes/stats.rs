//! Stats Endpoints

use axum::{extract::State, Json};

use crate::auth::AuthUser;
use crate::db::CommunityCounts;
use crate::error::ApiError;
use crate::services::{DashboardStats, StatsService};
use crate::AppState;

/// GET /api/stats/community
pub async fn community(State(state): State<AppState>) -> Result<Json<CommunityCounts>, ApiError> {
    let counts = StatsService::new(state.store.clone()).community().await?;
    Ok(Json(counts))
}

/// GET /api/stats/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<DashboardStats>, ApiError> {
    let stats = StatsService::new(state.store.clone())
        .dashboard(user.id)
        .await?;
    Ok(Json(stats))
}
