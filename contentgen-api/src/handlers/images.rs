use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use super::{FileUpload, Path, Query};
use crate::models::image::{FluxModel, UploadResult};
use crate::models::ApiResult;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/images/upload/:id", post(upload_image))
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageUploadQuery {
    pub model: Option<FluxModel>,
}

/// Store an image under `/uploads` and record it. `id` is the Flux task id
/// when the image came from a generation.
///
/// POST /api/v1/images/upload/{id}
pub async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ImageUploadQuery>,
    file: FileUpload,
) -> ApiResult<Json<UploadResult>> {
    let result = state
        .uploader
        .upload(id, &file.filename, &file.bytes, query.model)
        .await?;
    Ok(Json(result))
}
