use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::AppState;

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": format!("Hello From {}", state.config.server.project_name)
    }))
}
