use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tracing::{info, warn};

use super::{Form, Path, Query, ValidJson};
use crate::middleware::rate_limiter::{rate_limit_middleware, RateLimitScope};
use crate::middleware::{CurrentUser, SuperUser};
use crate::models::token::{
    LoginForm, MagicLinkRequest, Message, NewPassword, RefreshTokenRequest, Token, TokenQuery,
};
use crate::models::user::{User, UserPublic};
use crate::models::{ApiError, ApiResult};
use crate::services::auth_service::TokenKind;
use crate::AppState;

const MAGIC_LINK_MESSAGE: &str = "If your email is registered, you'll receive a magic link";

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/login/access-token", post(login_access_token))
        .route("/login/magic-link", post(request_magic_link))
        .route_layer(middleware::from_fn_with_state(
            state.limiter(RateLimitScope::Login),
            rate_limit_middleware,
        ))
        .route("/login/refresh-token", post(refresh_token))
        .route("/login/test-token", post(test_token))
        .route("/login/verify-magic-link", post(verify_magic_link))
        .route("/password-recovery/:email", post(recover_password))
        .route("/reset-password/", post(reset_password))
        .route(
            "/password-recovery-html-content/:email",
            post(recover_password_html_content),
        )
}

fn unknown_email() -> ApiError {
    ApiError::NotFound("The user with this email does not exist in the system.".to_string())
}

fn ensure_active(user: &User) -> ApiResult<()> {
    if user.is_active {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Inactive user".to_string()))
    }
}

/// OAuth2-compatible password login
///
/// POST /api/v1/login/access-token
pub async fn login_access_token(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Json<Token>> {
    let user = state.db.get_user_by_email(&form.username).await?;
    let user = match user {
        Some(user) if state.auth.verify_password(&form.password, &user.hashed_password) => user,
        _ => {
            warn!(email = %form.username, "Failed login attempt");
            return Err(ApiError::BadRequest(
                "Incorrect email or password".to_string(),
            ));
        }
    };
    ensure_active(&user)?;

    info!(user_id = %user.id, "User logged in");
    Ok(Json(state.auth.create_token_pair(user.id)?))
}

/// Exchange a refresh token for a fresh token pair
///
/// POST /api/v1/login/refresh-token
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<RefreshTokenRequest>,
) -> ApiResult<Json<Token>> {
    let invalid = || ApiError::Forbidden("Could not validate credentials".to_string());
    let claims = state
        .auth
        .decode(&body.refresh_token, TokenKind::Refresh)
        .map_err(|_| invalid())?;
    let user_id = claims.user_uuid().map_err(|_| invalid())?;

    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(invalid)?;
    ensure_active(&user)?;

    Ok(Json(state.auth.create_token_pair(user.id)?))
}

/// POST /api/v1/login/test-token
pub async fn test_token(CurrentUser(user): CurrentUser) -> Json<UserPublic> {
    Json(user.into())
}

/// POST /api/v1/password-recovery/{email}
pub async fn recover_password(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Json<Message>> {
    let user = state
        .db
        .get_user_by_email(&email)
        .await?
        .ok_or_else(unknown_email)?;

    let token = state.auth.create_password_reset_token(&user.email)?;
    let email_data = state
        .email
        .templates()
        .reset_password_email(&user.email, &token)?;
    state.email.send_in_background(user.email, email_data);

    Ok(Json(Message::new("Password recovery email sent")))
}

/// POST /api/v1/reset-password/
pub async fn reset_password(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<NewPassword>,
) -> ApiResult<Json<Message>> {
    let email = state
        .auth
        .verify_password_reset_token(&body.token)
        .map_err(|_| ApiError::BadRequest("Invalid token".to_string()))?;
    let user = state
        .db
        .get_user_by_email(&email)
        .await?
        .ok_or_else(unknown_email)?;
    ensure_active(&user)?;

    let hashed = state.auth.hash_password(&body.new_password)?;
    state.db.update_password(user.id, &hashed).await?;
    info!(user_id = %user.id, "Password reset");

    Ok(Json(Message::new("Password updated successfully")))
}

/// Rendered password recovery email, for previewing the template
///
/// POST /api/v1/password-recovery-html-content/{email}
pub async fn recover_password_html_content(
    State(state): State<AppState>,
    SuperUser(_admin): SuperUser,
    Path(email): Path<String>,
) -> ApiResult<Response> {
    let user = state
        .db
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(
                "The user with this username does not exist in the system.".to_string(),
            )
        })?;

    let token = state.auth.create_password_reset_token(&user.email)?;
    let email_data = state
        .email
        .templates()
        .reset_password_email(&user.email, &token)?;

    let mut response = Html(email_data.html_content).into_response();
    if let Ok(subject) = HeaderValue::from_str(&email_data.subject) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("subject"), subject);
    }
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    Ok(response)
}

/// Send a passwordless login link. The reply does not reveal whether the
/// address is registered.
///
/// POST /api/v1/login/magic-link
pub async fn request_magic_link(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<MagicLinkRequest>,
) -> ApiResult<Json<Message>> {
    let Some(user) = state.db.get_user_by_email(&body.email).await? else {
        return Ok(Json(Message::new(MAGIC_LINK_MESSAGE)));
    };
    ensure_active(&user)?;

    let token = state.auth.create_magic_link_token(&user.email)?;
    let email_data = state.email.templates().magic_link_email(&token)?;
    state.email.send_in_background(user.email, email_data);

    Ok(Json(Message::new(MAGIC_LINK_MESSAGE)))
}

/// POST /api/v1/login/verify-magic-link?token=
pub async fn verify_magic_link(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<Token>> {
    let email = state.auth.verify_magic_link_token(&query.token)?;
    let user = state
        .db
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    ensure_active(&user)?;

    info!(user_id = %user.id, "User logged in with magic link");
    Ok(Json(state.auth.create_token_pair(user.id)?))
}
