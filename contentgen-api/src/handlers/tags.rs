use axum::{extract::State, routing::get, Json, Router};
use tracing::info;

use super::ValidJson;
use crate::middleware::SuperUser;
use crate::models::post::{TagCreate, TagResponse};
use crate::models::ApiResult;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/tags/", get(read_tags).post(create_tag))
}

/// Every tag with the number of posts carrying it, most used first
///
/// GET /api/v1/tags/
pub async fn read_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<TagResponse>>> {
    Ok(Json(state.db.list_tags().await?))
}

/// POST /api/v1/tags/
pub async fn create_tag(
    State(state): State<AppState>,
    SuperUser(_admin): SuperUser,
    ValidJson(input): ValidJson<TagCreate>,
) -> ApiResult<Json<TagResponse>> {
    let tag = state.db.create_tag(input.name.trim()).await?;
    info!(tag = %tag.name, "Tag created");
    Ok(Json(tag))
}
