use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::models::error::ApiError;
use crate::models::user::User;
use crate::services::auth_service::{extract_bearer_token, TokenKind};
use crate::AppState;

/// Active user resolved from an `Authorization: Bearer` access token
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Active user that also has `is_superuser`
#[derive(Debug, Clone)]
pub struct SuperUser(pub User);

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))
}

fn credentials_error() -> ApiError {
    ApiError::Forbidden("Could not validate credentials".to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(parts)?;
        let claims = state.auth.decode(token, TokenKind::Access).map_err(|e| {
            debug!("Rejected access token: {}", e);
            credentials_error()
        })?;
        let user_id = claims.user_uuid().map_err(|_| credentials_error())?;

        let user = state
            .db
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        if !user.is_active {
            return Err(ApiError::BadRequest("Inactive user".to_string()));
        }

        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for SuperUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_superuser {
            return Err(ApiError::Forbidden(
                "The user doesn't have enough privileges".to_string(),
            ));
        }
        Ok(SuperUser(user))
    }
}

/// Resolve the caller before the inner layers run. Layered outside a rate
/// limiter so anonymous requests are turned away without spending budget.
pub async fn require_user(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    match CurrentUser::from_request_parts(&mut parts, &state).await {
        Ok(user) => {
            parts.extensions.insert(user);
            next.run(Request::from_parts(parts, body)).await
        }
        Err(e) => e.into_response(),
    }
}
