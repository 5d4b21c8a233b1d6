use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use super::{Path, Query, ValidJson};
use crate::middleware::{CurrentUser, SuperUser};
use crate::models::content::TiptapDoc;
use crate::models::post::{
    Ack, Post, PostCreate, PostListQuery, PostPublic, PostPublicWithContent,
    PostUpdate, PostsPublic,
};
use crate::models::token::Message;
use crate::models::user::User;
use crate::models::{ApiError, ApiResult};
use crate::services::database::PostFilter;
use crate::AppState;

/// Excerpt column holds 500 characters including the trailing "..."
const EXCERPT_CHARS: usize = 497;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/posts/",
            get(read_posts).post(create_post).delete(delete_all_posts),
        )
        .route("/posts/me", get(read_my_posts))
        .route("/posts/drafts/", get(read_drafts))
        .route("/posts/drafts/:draft_id", get(read_draft))
        .route(
            "/posts/:post_id",
            get(read_post).put(update_post).delete(delete_post),
        )
}

fn posts_page(posts: Vec<Post>, count: i64) -> PostsPublic {
    PostsPublic {
        data: posts.into_iter().map(PostPublic::from).collect(),
        count,
    }
}

fn found<T>(value: Option<T>, message: &str) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::NotFound(message.to_string()))
}

/// Only the author may change a post
fn ensure_author(post: Post, user: &User) -> ApiResult<Post> {
    if post.author_id != user.id {
        return Err(ApiError::Forbidden("Not enough permissions".to_string()));
    }
    Ok(post)
}

/// Post owned by `user`, or 404/403
async fn owned_post(state: &AppState, post_id: Uuid, user: &User) -> ApiResult<Post> {
    let post = found(state.db.get_post(post_id).await?, "Post not found")?;
    ensure_author(post, user)
}

/// Create a post. The content must be a valid Tiptap document; the excerpt
/// is taken from its text when not supplied.
///
/// POST /api/v1/posts/
pub async fn create_post(
    State(state): State<AppState>,
    SuperUser(user): SuperUser,
    ValidJson(mut input): ValidJson<PostCreate>,
) -> ApiResult<Json<PostPublic>> {
    let doc = TiptapDoc::from_value(input.content)?;
    if input.excerpt.is_none() {
        input.excerpt = doc.excerpt(EXCERPT_CHARS);
    }
    input.content = doc.to_value();

    let post = state.db.create_post(user.id, &input).await?;
    Ok(Json(post.into()))
}

/// GET /api/v1/posts/?skip&limit&tag&published
pub async fn read_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> ApiResult<Json<PostsPublic>> {
    let filter = PostFilter::published(query.published).with_tag(query.tag.clone());
    let (posts, count) = state.db.list_posts(&filter, query.pagination()).await?;
    Ok(Json(posts_page(posts, count)))
}

/// GET /api/v1/posts/me
pub async fn read_my_posts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PostListQuery>,
) -> ApiResult<Json<PostsPublic>> {
    let (posts, count) = state
        .db
        .list_posts_by_author(user.id, query.pagination(), query.published)
        .await?;
    Ok(Json(posts_page(posts, count)))
}

/// GET /api/v1/posts/drafts/
pub async fn read_drafts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PostListQuery>,
) -> ApiResult<Json<PostsPublic>> {
    let filter = PostFilter::by_author(user.id, Some(false)).with_tag(query.tag.clone());
    let (posts, count) = state.db.list_posts(&filter, query.pagination()).await?;
    Ok(Json(posts_page(posts, count)))
}

/// GET /api/v1/posts/drafts/{id}
pub async fn read_draft(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(draft_id): Path<Uuid>,
) -> ApiResult<Json<PostPublicWithContent>> {
    let draft = found(
        state.db.get_draft(user.id, draft_id).await?,
        "Draft not found",
    )?;
    Ok(Json(PostPublicWithContent::new(draft, user.into())))
}

/// GET /api/v1/posts/{id}
pub async fn read_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<PostPublicWithContent>> {
    let (post, author) = found(
        state.db.get_post_with_author(post_id).await?,
        "Post not found",
    )?;
    Ok(Json(PostPublicWithContent::new(post, author.into())))
}

/// PUT /api/v1/posts/{id}
pub async fn update_post(
    State(state): State<AppState>,
    SuperUser(user): SuperUser,
    Path(post_id): Path<Uuid>,
    ValidJson(mut input): ValidJson<PostUpdate>,
) -> ApiResult<Json<PostPublic>> {
    owned_post(&state, post_id, &user).await?;

    if let Some(content) = input.content.take() {
        input.content = Some(TiptapDoc::from_value(content)?.to_value());
    }
    let post = state.db.update_post(post_id, &input).await?;
    info!(post_id = %post_id, "Post updated");
    Ok(Json(post.into()))
}

/// DELETE /api/v1/posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    SuperUser(user): SuperUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Ack>> {
    owned_post(&state, post_id, &user).await?;
    state.db.delete_post(post_id).await?;
    info!(post_id = %post_id, "Post deleted");
    Ok(Json(Ack { ok: true }))
}

/// DELETE /api/v1/posts/
pub async fn delete_all_posts(
    State(state): State<AppState>,
    SuperUser(user): SuperUser,
) -> ApiResult<Json<Message>> {
    let deleted = state.db.delete_all_posts().await?;
    info!(deleted, by = %user.id, "All posts deleted");
    Ok(Json(Message::new(format!("Deleted {} posts", deleted))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn author() -> User {
        User {
            id: Uuid::new_v4(),
            email: "editor@example.com".to_string(),
            hashed_password: "$argon2id$v=19$...".to_string(),
            full_name: Some("Editor".to_string()),
            image_url: None,
            is_active: true,
            is_superuser: true,
            email_verified: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn post_by(author_id: Uuid, is_published: bool) -> Post {
        Post {
            id: Uuid::new_v4(),
            title: "Async Rust".to_string(),
            slug: "async-rust".to_string(),
            content: serde_json::json!({"type": "doc", "content": []}),
            excerpt: None,
            feature_image_url: None,
            is_published,
            author_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_only_author_may_edit() {
        let owner = author();
        let post = post_by(owner.id, true);
        assert_eq!(ensure_author(post.clone(), &owner).unwrap().id, post.id);

        let err = ensure_author(post, &author()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Not enough permissions");
    }

    #[test]
    fn test_missing_draft_is_not_found() {
        let err = found(None::<Post>, "Draft not found").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Draft not found");

        let draft = post_by(Uuid::new_v4(), false);
        assert_eq!(found(Some(draft.clone()), "Draft not found").unwrap().id, draft.id);
    }
}
