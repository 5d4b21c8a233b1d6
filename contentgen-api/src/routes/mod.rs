use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::AppConfig;
use crate::handlers::{ai, dashboard, images, login, media, posts, private, root, tags, users, utils};
use crate::middleware::logging::request_logging_middleware;
use crate::AppState;

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .all_cors_origins()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Every API route, relative to the API prefix
fn api_router(state: &AppState) -> Router<AppState> {
    let mut api = Router::new()
        .merge(login::router(state))
        .merge(users::router())
        .merge(posts::router())
        .merge(tags::router())
        .merge(dashboard::router())
        .merge(ai::router(state))
        .merge(images::router())
        .merge(media::router())
        .merge(utils::router());

    if state.config.server.environment.is_local() {
        api = api.merge(private::router());
    }
    api
}

/// Build the application: API routes under the prefix, static uploads and
/// the shared middleware stack
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();
    let upload_dir = config.storage.upload_dir.clone();

    Router::new()
        .route("/", get(root::root))
        .route_service(
            "/favicon.ico",
            ServeFile::new(format!("{}/logo.svg", upload_dir)),
        )
        .nest_service("/uploads", ServeDir::new(&upload_dir))
        .nest(&config.server.api_prefix, api_router(&state))
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(request_logging_middleware))
                .layer(cors_layer(&config))
                .layer(DefaultBodyLimit::disable()),
        )
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::testing::test_state;
    use super::*;
    use crate::middleware::logging::REQUEST_ID_HEADER;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn app() -> Router {
        create_router(test_state(AppConfig::default()))
    }

    #[tokio::test]
    async fn test_root_greets() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(
            body_json(response).await,
            json!({"message": "Hello From ContentGen"})
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/utils/health-check/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!(true));
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/users/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(body["error"]["message"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_bad_token_is_forbidden() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/dashboard/stats")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Could not validate credentials");
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_access_token() {
        let state = test_state(AppConfig::default());
        let refresh = state
            .auth
            .create_refresh_token(uuid::Uuid::new_v4())
            .unwrap();

        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/login/test-token")
                    .header(header::AUTHORIZATION, format!("Bearer {}", refresh))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_login_is_rate_limited() {
        let mut config = AppConfig::default();
        config.rate_limits.login = "1/minute".to_string();
        let app = create_router(test_state(config));

        let login = || {
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/login/access-token")
                .header("x-forwarded-for", "203.0.113.7")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=someone"))
                .unwrap()
        };

        let first = app.clone().oneshot(login()).await.unwrap();
        assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

        let second = app.oneshot(login()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");
        let body = body_json(second).await;
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(
            body["error"]["message"],
            "Rate limit exceeded: 1 per 1 minute"
        );
    }

    #[tokio::test]
    async fn test_allowed_response_carries_rate_limit_headers() {
        let mut config = AppConfig::default();
        config.rate_limits.public_ai = "2/minute".to_string();

        let response = create_router(test_state(config))
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/ai/public/moderate-content?content=hello")
                    .header("x-forwarded-for", "203.0.113.8")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "1");
    }

    #[tokio::test]
    async fn test_anonymous_private_ai_does_not_spend_budget() {
        let mut config = AppConfig::default();
        config.rate_limits.protected_ai = "1/minute".to_string();
        let app = create_router(test_state(config));

        let moderate = || {
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/ai/private/moderate-content?content=x")
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..2 {
            let response = app.clone().oneshot(moderate()).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(!response.headers().contains_key("x-ratelimit-limit"));
        }
    }

    #[tokio::test]
    async fn test_bad_path_param_is_json_error() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/posts/not-a-uuid")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert!(body["error"]["message"].as_str().unwrap().contains("UUID"));
        assert_eq!(body["request_id"], "req-42");
    }

    #[tokio::test]
    async fn test_incomplete_login_form_is_json_error() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/login/access-token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=someone"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("password"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut config = AppConfig::default();
        config.storage.max_file_size = 0;
        let oversized = 2 * 1024 * 1024;

        let response = create_router(test_state(config))
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("/api/v1/media/upload/{}", uuid::Uuid::new_v4()))
                    .header(header::CONTENT_TYPE, "multipart/form-data; boundary=b")
                    .header(header::CONTENT_LENGTH, oversized)
                    .body(Body::from(vec![b'x'; oversized]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_draft_without_openai_key_is_unavailable() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/ai/public/generate-draft-content?tone=casual")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"prompt": "Rust error handling"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_media_upload_then_get() {
        let app = app();
        let id = uuid::Uuid::new_v4();
        let boundary = "contentgen-boundary";
        let multipart = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cover.png\"\r\n\
             Content-Type: image/png\r\n\r\nnot-really-a-png\r\n--{b}--\r\n",
            b = boundary
        );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("/api/v1/media/upload/{}?prompt=sunset", id))
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(multipart))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let uploaded = body_json(response).await;
        let key = format!("{}.png", id);
        assert_eq!(uploaded["key"], key.as_str());
        assert_eq!(uploaded["content_type"], "image/png");
        assert_eq!(uploaded["metadata"]["prompt"], "sunset");
        assert_eq!(uploaded["metadata"]["media_type"], "image");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/media/{}", key))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = body_json(response).await;
        assert_eq!(fetched["size"], 16);
        assert!(fetched["presigned_url"].as_str().is_some());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/media/missing.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_media_upload_rejects_extension() {
        let boundary = "b";
        let multipart = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"run.sh\"\r\n\r\necho\r\n--{b}--\r\n",
            b = boundary
        );

        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("/api/v1/media/upload/{}", uuid::Uuid::new_v4()))
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(multipart))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cors_allows_frontend() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/v1/tags/")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }

    #[tokio::test]
    async fn test_private_routes_only_in_local() {
        let mut config = AppConfig::default();
        config.server.environment = crate::config::Environment::Production;

        let response = create_router(test_state(config))
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/private/users/")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
