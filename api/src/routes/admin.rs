//! Admin Endpoints

use axum::{extract::State, Json};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::services::{ReconcileReport, Reconciler};
use crate::AppState;

/// POST /api/admin/reconcile
///
/// 파생 카운터 즉시 재계산 (주기 작업과 동일)
pub async fn reconcile(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<ReconcileReport>, ApiError> {
    tracing::info!(admin = %admin.id, "manual reconciliation requested");

    let report = Reconciler::new(state.store.clone(), state.config.rate_limit_window)
        .run_once()
        .await?;
    Ok(Json(report))
}
