use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Query;
use crate::middleware::SuperUser;
use crate::models::token::Message;
use crate::models::ApiResult;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/utils/test-email/", post(test_email))
        .route("/utils/health-check/", get(health_check))
        .route("/utils/health/", get(health))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TestEmailQuery {
    #[validate(email)]
    pub email_to: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ServiceStatus {
    fn from_probe(ok: bool) -> Self {
        if ok {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ServiceStatus,
    pub service: String,
    pub version: String,
    pub database: ServiceStatus,
    pub redis: ServiceStatus,
}

/// POST /api/v1/utils/test-email/?email_to=
pub async fn test_email(
    State(state): State<AppState>,
    SuperUser(_admin): SuperUser,
    Query(query): Query<TestEmailQuery>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    query.validate()?;
    let email_data = state.email.templates().test_email(&query.email_to)?;
    state.email.send_in_background(query.email_to, email_data);

    Ok((
        StatusCode::CREATED,
        Json(Message::new("Test email sent in the background")),
    ))
}

/// GET /api/v1/utils/health-check/
pub async fn health_check() -> Json<bool> {
    Json(true)
}

/// Probe Postgres and Redis. Degraded when either is down.
///
/// GET /api/v1/utils/health/
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = state.db.ping().await;
    let redis = match &state.redis {
        Some(redis) => redis.ping().await,
        None => false,
    };

    Json(HealthResponse {
        status: if database && redis {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Degraded
        },
        service: state.config.server.project_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: ServiceStatus::from_probe(database),
        redis: ServiceStatus::from_probe(redis),
    })
}
