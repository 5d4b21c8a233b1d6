use axum::{
    extract::State,
    response::Redirect,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, warn};
use uuid::Uuid;

use super::{Path, Query, ValidJson};
use crate::middleware::{CurrentUser, SuperUser};
use crate::models::post::Pagination;
use crate::models::token::{Message, TokenQuery};
use crate::models::user::{
    UpdatePassword, User, UserCreate, UserPublic, UserRegister, UserUpdate, UserUpdateMe,
    UsersPublic,
};
use crate::models::{ApiError, ApiResult};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/", get(read_users).post(create_user))
        .route(
            "/users/me",
            get(read_user_me).patch(update_user_me).delete(delete_user_me),
        )
        .route("/users/me/password", patch(update_password_me))
        .route("/users/signup", post(register_user))
        .route(
            "/users/verify-email",
            get(verify_email_redirect).patch(verify_email),
        )
        .route("/users/send-verification-email", post(send_verification_email))
        .route(
            "/users/:user_id",
            get(read_user_by_id).patch(update_user).delete(delete_user),
        )
}

/// 409 when `email` belongs to someone other than `user_id`
async fn ensure_email_free(state: &AppState, email: Option<&str>, user_id: Uuid) -> ApiResult<()> {
    let Some(email) = email else {
        return Ok(());
    };
    match state.db.get_user_by_email(email).await? {
        Some(existing) if existing.id != user_id => Err(ApiError::Conflict(
            "User with this email already exists".to_string(),
        )),
        _ => Ok(()),
    }
}

/// GET /api/v1/users/
pub async fn read_users(
    State(state): State<AppState>,
    SuperUser(_admin): SuperUser,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<UsersPublic>> {
    let (users, count) = state.db.list_users(page).await?;
    Ok(Json(UsersPublic {
        data: users.into_iter().map(UserPublic::from).collect(),
        count,
    }))
}

/// Create a user; the new account email goes out when email is configured
///
/// POST /api/v1/users/
pub async fn create_user(
    State(state): State<AppState>,
    SuperUser(admin): SuperUser,
    ValidJson(input): ValidJson<UserCreate>,
) -> ApiResult<Json<UserPublic>> {
    if state.db.get_user_by_email(&input.email).await?.is_some() {
        return Err(ApiError::BadRequest(
            "The user with this email already exists in the system.".to_string(),
        ));
    }

    let hashed = state.auth.hash_password(&input.password)?;
    let user = state.db.create_user(&input, &hashed).await?;
    info!(user_id = %user.id, created_by = %admin.id, "User created");

    if state.config.emails_enabled() {
        let email_data = state.email.templates().new_account_email(
            &input.email,
            &input.email,
            &input.password,
        )?;
        state.email.send_in_background(input.email.clone(), email_data);
    }

    Ok(Json(user.into()))
}

/// GET /api/v1/users/me
pub async fn read_user_me(CurrentUser(user): CurrentUser) -> Json<UserPublic> {
    Json(user.into())
}

/// PATCH /api/v1/users/me
pub async fn update_user_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(input): ValidJson<UserUpdateMe>,
) -> ApiResult<Json<UserPublic>> {
    ensure_email_free(&state, input.email.as_deref(), user.id).await?;

    let update = UserUpdate::from(input);
    let user = state.db.update_user(user.id, &update, None).await?;
    Ok(Json(user.into()))
}

/// PATCH /api/v1/users/me/password
pub async fn update_password_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(body): ValidJson<UpdatePassword>,
) -> ApiResult<Json<Message>> {
    let current_matches = state
        .auth
        .verify_password(&body.current_password, &user.hashed_password);
    check_password_change(current_matches, &body)?;

    let hashed = state.auth.hash_password(&body.new_password)?;
    state.db.update_password(user.id, &hashed).await?;
    Ok(Json(Message::new("Password updated successfully")))
}

fn check_password_change(current_matches: bool, body: &UpdatePassword) -> ApiResult<()> {
    if !current_matches {
        return Err(ApiError::BadRequest("Incorrect password".to_string()));
    }
    if body.current_password == body.new_password {
        return Err(ApiError::BadRequest(
            "New password cannot be the same as the current one".to_string(),
        ));
    }
    Ok(())
}

fn self_delete_forbidden() -> ApiError {
    ApiError::Forbidden("Super users are not allowed to delete themselves".to_string())
}

/// Superusers keep their account
fn ensure_can_delete_self(user: &User) -> ApiResult<()> {
    if user.is_superuser {
        return Err(self_delete_forbidden());
    }
    Ok(())
}

/// DELETE /api/v1/users/me
pub async fn delete_user_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Message>> {
    ensure_can_delete_self(&user)?;
    state.db.delete_user(user.id).await?;
    info!(user_id = %user.id, "User deleted own account");
    Ok(Json(Message::new("User deleted successfully")))
}

/// Open registration
///
/// POST /api/v1/users/signup
pub async fn register_user(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<UserRegister>,
) -> ApiResult<Json<UserPublic>> {
    if state.db.get_user_by_email(&input.email).await?.is_some() {
        return Err(ApiError::Conflict(
            "The user with this email already exists in the system".to_string(),
        ));
    }

    let create = UserCreate::from(input);
    let hashed = state.auth.hash_password(&create.password)?;
    let user = state.db.create_user(&create, &hashed).await?;
    info!(user_id = %user.id, "User registered");
    Ok(Json(user.into()))
}

/// Frontend page that finishes verification, with the token as a query value
fn verification_redirect_url(frontend: &str, token: &str) -> String {
    format!(
        "{}/verify-email?token={}",
        frontend.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

/// Check the token from the verification email and hand it to the frontend.
/// Nothing is written here; the frontend completes with the PATCH below.
///
/// GET /api/v1/users/verify-email?token=
pub async fn verify_email_redirect(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Redirect {
    let frontend = state.config.server.frontend_host.trim_end_matches('/');
    match state.auth.verify_email_verification_token(&query.token) {
        Ok(_) => Redirect::to(&verification_redirect_url(frontend, &query.token)),
        Err(e) => {
            warn!("Rejected email verification token: {}", e);
            Redirect::to(&format!("{}/verify-email/error", frontend))
        }
    }
}

/// PATCH /api/v1/users/verify-email?token=
pub async fn verify_email(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<UserPublic>> {
    let (email, user_id) = state.auth.verify_email_verification_token(&query.token)?;
    check_verification_target(&user, &email, user_id)?;

    state.db.set_email_verified(user.id).await?;
    info!(user_id = %user.id, "Email verified");
    Ok(Json(UserPublic {
        email_verified: true,
        ..UserPublic::from(user)
    }))
}

/// The token must name the caller, who is not verified yet
fn check_verification_target(user: &User, email: &str, user_id: Uuid) -> ApiResult<()> {
    if user.email_verified {
        return Err(ApiError::BadRequest("Email already verified".to_string()));
    }
    if user.email != email || user.id != user_id {
        return Err(ApiError::BadRequest("Invalid token".to_string()));
    }
    Ok(())
}

/// POST /api/v1/users/send-verification-email
pub async fn send_verification_email(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Message>> {
    if user.email_verified {
        return Err(ApiError::BadRequest("Email already verified".to_string()));
    }

    let token = state
        .auth
        .create_email_verification_token(&user.email, user.id)?;
    let username = user.full_name.as_deref().unwrap_or(&user.email);
    let email_data =
        state
            .email
            .templates()
            .email_verification_email(&user.email, username, &token)?;
    state.email.send_in_background(user.email.clone(), email_data);

    Ok(Json(Message::new("Verification email sent successfully")))
}

/// A user may read their own record; anyone else needs superuser
///
/// GET /api/v1/users/{id}
pub async fn read_user_by_id(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserPublic>> {
    if current.id == user_id {
        return Ok(Json(current.into()));
    }
    if !current.is_superuser {
        return Err(ApiError::Forbidden(
            "The user doesn't have enough privileges".to_string(),
        ));
    }

    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(user.into()))
}

async fn existing_user(state: &AppState, user_id: Uuid) -> ApiResult<User> {
    state.db.get_user_by_id(user_id).await?.ok_or_else(|| {
        ApiError::NotFound("The user with this id does not exist in the system".to_string())
    })
}

/// PATCH /api/v1/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    SuperUser(_admin): SuperUser,
    Path(user_id): Path<Uuid>,
    ValidJson(input): ValidJson<UserUpdate>,
) -> ApiResult<Json<UserPublic>> {
    existing_user(&state, user_id).await?;
    ensure_email_free(&state, input.email.as_deref(), user_id).await?;

    let hashed = input
        .password
        .as_deref()
        .map(|password| state.auth.hash_password(password))
        .transpose()?;
    let user = state
        .db
        .update_user(user_id, &input, hashed.as_deref())
        .await?;
    Ok(Json(user.into()))
}

/// DELETE /api/v1/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    SuperUser(admin): SuperUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Message>> {
    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    if user.id == admin.id {
        return Err(self_delete_forbidden());
    }

    state.db.delete_user(user.id).await?;
    info!(user_id = %user.id, deleted_by = %admin.id, "User deleted");
    Ok(Json(Message::new("User deleted successfully")))
}
