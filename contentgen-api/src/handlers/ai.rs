use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use serde_json::Value;
use std::convert::Infallible;
use tracing::info;

use super::{Query, ValidJson};
use crate::middleware::rate_limiter::{rate_limit_middleware, RateLimitScope};
use crate::middleware::auth::require_user;
use crate::middleware::CurrentUser;
use crate::models::ai::{DraftContentRequest, ModerationQuery, ModerationResult, ToneQuery};
use crate::models::image::{ImageCreate, ImageResult};
use crate::models::ApiResult;
use crate::AppState;

pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/ai/public/generate-image", post(generate_image))
        .route("/ai/public/generate-draft-content", post(generate_draft_content))
        .route(
            "/ai/public/generate-sandbox-content",
            post(generate_sandbox_content),
        )
        .route("/ai/public/moderate-content", post(moderate_content))
        .route_layer(middleware::from_fn_with_state(
            state.limiter(RateLimitScope::PublicAi),
            rate_limit_middleware,
        ));

    let private = Router::new()
        .route("/ai/private/generate-image", post(generate_image_private))
        .route(
            "/ai/private/generate-draft-content",
            post(generate_draft_content_private),
        )
        .route(
            "/ai/private/generate-sandbox-content",
            post(generate_sandbox_content_private),
        )
        .route("/ai/private/moderate-content", post(moderate_content_private))
        .route_layer(middleware::from_fn_with_state(
            state.limiter(RateLimitScope::ProtectedAi),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    public.merge(private)
}

/// Wrap an NDJSON draft stream in the headers the editor client expects
fn draft_response(state: &AppState, request: DraftContentRequest, tone: ToneQuery) -> ApiResult<Response> {
    let stream = state.ai.stream_draft_content(request, tone.tone)?;
    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));

    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(DATA_STREAM_HEADER, HeaderValue::from_static("v1"));
    Ok(response)
}

/// Generate an image with Flux and store it in the media bucket
///
/// POST /api/v1/ai/public/generate-image
pub async fn generate_image(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<ImageCreate>,
) -> ApiResult<Json<ImageResult>> {
    Ok(Json(state.ai.generate_image(&request).await?))
}

/// POST /api/v1/ai/private/generate-image
pub async fn generate_image_private(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(request): ValidJson<ImageCreate>,
) -> ApiResult<Json<ImageResult>> {
    info!(user_id = %user.id, model = request.model.as_str(), "Image generation requested");
    Ok(Json(state.ai.generate_image(&request).await?))
}

/// Stream a post draft as newline-delimited JSON snapshots
///
/// POST /api/v1/ai/public/generate-draft-content?tone=
pub async fn generate_draft_content(
    State(state): State<AppState>,
    Query(tone): Query<ToneQuery>,
    ValidJson(request): ValidJson<DraftContentRequest>,
) -> ApiResult<Response> {
    draft_response(&state, request, tone)
}

/// POST /api/v1/ai/private/generate-draft-content?tone=
pub async fn generate_draft_content_private(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(tone): Query<ToneQuery>,
    ValidJson(request): ValidJson<DraftContentRequest>,
) -> ApiResult<Response> {
    info!(user_id = %user.id, tone = tone.tone.as_str(), "Draft generation requested");
    draft_response(&state, request, tone)
}

/// POST /api/v1/ai/public/generate-sandbox-content?tone=
pub async fn generate_sandbox_content(
    State(state): State<AppState>,
    Query(tone): Query<ToneQuery>,
    ValidJson(request): ValidJson<DraftContentRequest>,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        state
            .ai
            .generate_sandbox_content(&request, tone.tone)
            .await?,
    ))
}

/// POST /api/v1/ai/private/generate-sandbox-content?tone=
pub async fn generate_sandbox_content_private(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(tone): Query<ToneQuery>,
    ValidJson(request): ValidJson<DraftContentRequest>,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        state
            .ai
            .generate_sandbox_content(&request, tone.tone)
            .await?,
    ))
}

/// POST /api/v1/ai/public/moderate-content?content=
pub async fn moderate_content(
    State(state): State<AppState>,
    Query(query): Query<ModerationQuery>,
) -> ApiResult<Json<ModerationResult>> {
    Ok(Json(state.ai.moderate_content(&query.content).await?))
}

/// POST /api/v1/ai/private/moderate-content?content=
pub async fn moderate_content_private(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<ModerationQuery>,
) -> ApiResult<Json<ModerationResult>> {
    Ok(Json(state.ai.moderate_content(&query.content).await?))
}
