//! Tag Endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use uuid::Uuid;

use crate::db::Tag;
use crate::error::ApiError;
use crate::routes::ApiPath;
use crate::services::TagService;
use crate::types::{Page, PageQuery};
use crate::AppState;

/// GET /api/tags (questionCount 내림차순)
pub async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Tag>>, ApiError> {
    Ok(Json(TagService::new(state.store.clone()).list(query.into()).await?))
}

/// GET /api/tags/:id
pub async fn get_tag(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(TagService::new(state.store.clone()).get(id).await?))
}
