use axum::{extract::State, routing::get, Json, Router};

use crate::middleware::CurrentUser;
use crate::models::dashboard::DashboardStats;
use crate::models::ApiResult;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard/stats", get(dashboard_stats))
}

/// GET /api/v1/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<DashboardStats>> {
    Ok(Json(state.db.dashboard_stats(&user).await?))
}
