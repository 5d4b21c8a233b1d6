use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use mime::Mime;
use std::collections::HashMap;
use uuid::Uuid;

use super::{FileUpload, Path, Query};
use crate::models::media::{MediaListQuery, MediaListResponse, MediaResponse, MediaUploadQuery};
use crate::models::token::Message;
use crate::models::ApiResult;
use crate::services::image_uploader::{allowed_extension, check_size};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/media/", get(list_media))
        .route("/media/upload/:id", post(upload_media))
        .route("/media/:key", get(get_media).delete(delete_media))
}

/// Content type for the stored object. A well-formed type sent by the client
/// wins; otherwise it is derived from the extension.
fn object_content_type(declared: Option<&str>, ext: &str) -> Mime {
    if let Some(mime) = declared.and_then(|raw| raw.parse::<Mime>().ok()) {
        if mime != mime::APPLICATION_OCTET_STREAM {
            return mime;
        }
    }
    match ext {
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "webp" => "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        "mp4" => "video/mp4".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

fn upload_metadata(id: Uuid, query: MediaUploadQuery) -> HashMap<String, String> {
    let mut metadata = HashMap::from([
        ("id".to_string(), id.to_string()),
        ("media_type".to_string(), query.media_type.to_string()),
    ]);
    if let Some(prompt) = query.prompt {
        metadata.insert("prompt".to_string(), prompt);
    }
    if let Some(model) = query.model {
        metadata.insert("model".to_string(), model);
    }
    metadata
}

/// Upload a file to the media bucket as `{id}.{ext}`
///
/// POST /api/v1/media/upload/{id}?media_type=&model=&prompt=
pub async fn upload_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MediaUploadQuery>,
    file: FileUpload,
) -> ApiResult<Json<MediaResponse>> {
    let ext = allowed_extension(&state.config.storage, &file.filename)?;
    check_size(&state.config.storage, file.bytes.len())?;

    let key = format!("{}.{}", id, ext);
    let content_type = object_content_type(file.content_type.as_deref(), &ext);
    let response = state
        .media
        .upload_media(
            &key,
            file.bytes,
            Some(content_type.as_ref()),
            upload_metadata(id, query),
        )
        .await?;
    Ok(Json(response))
}

/// GET /api/v1/media/?prefix&max_keys&continuation_token&media_type
pub async fn list_media(
    State(state): State<AppState>,
    Query(query): Query<MediaListQuery>,
) -> ApiResult<Json<MediaListResponse>> {
    Ok(Json(state.media.list_media(&query).await?))
}

/// GET /api/v1/media/{key}
pub async fn get_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<MediaResponse>> {
    Ok(Json(state.media.get_media(&key).await?))
}

/// DELETE /api/v1/media/{key}
pub async fn delete_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<Message>> {
    state.media.delete_media(&key).await?;
    Ok(Json(Message::new("Media deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::MediaType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_upload_metadata() {
        let id = Uuid::new_v4();
        let metadata = upload_metadata(
            id,
            MediaUploadQuery {
                media_type: MediaType::Video,
                model: None,
                prompt: Some("a cat".to_string()),
            },
        );

        assert_eq!(metadata["id"], id.to_string());
        assert_eq!(metadata["media_type"], "video");
        assert_eq!(metadata["prompt"], "a cat");
        assert!(!metadata.contains_key("model"));
    }

    #[test]
    fn test_object_content_type() {
        assert_eq!(object_content_type(Some("image/png"), "png"), mime::IMAGE_PNG);
        assert_eq!(object_content_type(None, "jpeg"), mime::IMAGE_JPEG);
        assert_eq!(
            object_content_type(Some("application/octet-stream"), "mp4").as_ref(),
            "video/mp4"
        );
        assert_eq!(object_content_type(Some("not a type"), "webp").as_ref(), "image/webp");
        assert_eq!(
            object_content_type(None, "bin"),
            mime::APPLICATION_OCTET_STREAM
        );
    }
}
