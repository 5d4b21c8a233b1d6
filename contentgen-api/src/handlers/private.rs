use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

use super::ValidJson;
use crate::models::user::{PrivateUserCreate, UserCreate, UserPublic};
use crate::models::{ApiError, ApiResult};
use crate::AppState;

/// Routes mounted only in the `local` environment
pub fn router() -> Router<AppState> {
    Router::new().route("/private/users/", post(create_user))
}

/// Create a user without authentication, for local seeding
///
/// POST /api/v1/private/users/
pub async fn create_user(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<PrivateUserCreate>,
) -> ApiResult<Json<UserPublic>> {
    if state.db.get_user_by_email(&input.email).await?.is_some() {
        return Err(ApiError::Conflict(
            "The user with this email already exists in the system".to_string(),
        ));
    }

    let create = UserCreate {
        email: input.email,
        password: input.password,
        full_name: input.full_name,
        image_url: None,
        is_active: true,
        is_superuser: false,
        email_verified: input.is_verified,
    };
    let hashed = state.auth.hash_password(&create.password)?;
    let user = state.db.create_user(&create, &hashed).await?;
    info!(user_id = %user.id, "Local user created");
    Ok(Json(user.into()))
}
