use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::user::UserPublic;

/// Post row joined with its tag names
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: Value,
    pub excerpt: Option<String>,
    pub feature_image_url: Option<String>,
    pub is_published: bool,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PostCreate {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    pub content: Value,
    #[validate(length(max = 500))]
    pub excerpt: Option<String>,
    #[validate(length(max = 255))]
    pub feature_image_url: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    #[validate(custom(function = "validate_tag_names"))]
    pub tags: Vec<String>,
}

/// Partial update; `tags` replaces the whole set when present
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PostUpdate {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    pub content: Option<Value>,
    #[validate(length(max = 500))]
    pub excerpt: Option<String>,
    #[validate(length(max = 255))]
    pub feature_image_url: Option<String>,
    pub is_published: Option<bool>,
    #[validate(custom(function = "validate_tag_names"))]
    pub tags: Option<Vec<String>>,
}

#[allow(clippy::ptr_arg)]
fn validate_tag_names(tags: &Vec<String>) -> Result<(), validator::ValidationError> {
    for tag in tags {
        let len = tag.trim().chars().count();
        if len == 0 || len > 50 {
            let mut err = validator::ValidationError::new("tag_length");
            err.message = Some("Tag names must be 1-50 characters".into());
            return Err(err);
        }
    }
    Ok(())
}

/// Normalize tag names: trimmed, de-duplicated, original order kept
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !seen.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            seen.push(tag.to_string());
        }
    }
    seen
}

/// Post summary without the document body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPublic {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub feature_image_url: Option<String>,
    pub is_published: bool,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

impl From<Post> for PostPublic {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            title: post.title,
            slug: post.slug,
            excerpt: post.excerpt,
            feature_image_url: post.feature_image_url,
            is_published: post.is_published,
            author_id: post.author_id,
            created_at: post.created_at,
            updated_at: post.updated_at,
            tags: post.tags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPublicWithContent {
    #[serde(flatten)]
    pub post: PostPublic,
    pub content: Value,
    pub author: UserPublic,
}

impl PostPublicWithContent {
    pub fn new(post: Post, author: UserPublic) -> Self {
        let content = post.content.clone();
        Self {
            post: post.into(),
            content,
            author,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostsPublic {
    pub data: Vec<PostPublic>,
    pub count: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TagCreate {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TagResponse {
    pub id: Uuid,
    pub name: String,
    pub post_count: i64,
}

fn default_limit() -> i64 {
    100
}

/// `?skip=&limit=` pagination
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}

impl Pagination {
    /// Clamp to sane bounds for SQL OFFSET/LIMIT
    pub fn clamped(self) -> Self {
        Self {
            skip: self.skip.max(0),
            limit: self.limit.clamp(1, 1000),
        }
    }
}

fn default_published() -> Option<bool> {
    Some(true)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub tag: Option<String>,
    #[serde(default = "default_published")]
    pub published: Option<bool>,
}

impl PostListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            skip: self.skip,
            limit: self.limit,
        }
        .clamped()
    }
}

/// Generic `{"ok": true}` acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_normalize_tags() {
        let tags = vec![
            " rust ".to_string(),
            "Rust".to_string(),
            "".to_string(),
            "axum".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["rust".to_string(), "axum".to_string()]);
    }

    #[test]
    fn test_post_create_validation() {
        let mut create: PostCreate = serde_json::from_value(json!({
            "title": "Hello",
            "content": {"type": "doc", "content": []},
            "tags": ["news"]
        }))
        .unwrap();
        assert!(!create.is_published);
        assert!(create.validate().is_ok());

        create.tags.push("x".repeat(51));
        assert!(create.validate().is_err());

        create.tags.pop();
        create.title = String::new();
        assert!(create.validate().is_err());
    }

    #[test]
    fn test_list_query_defaults() {
        let query: PostListQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(query.published, Some(true));
        assert_eq!(query.pagination().limit, 100);

        let query: PostListQuery =
            serde_json::from_value(json!({"skip": -5, "limit": 5000, "published": false})).unwrap();
        let page = query.pagination();
        assert_eq!((page.skip, page.limit), (0, 1000));
        assert_eq!(query.published, Some(false));
    }

    #[test]
    fn test_with_content_flattens_summary() {
        let author = UserPublic {
            id: Uuid::new_v4(),
            email: "a@b.io".to_string(),
            full_name: None,
            image_url: None,
            is_active: true,
            is_superuser: true,
            email_verified: true,
        };
        let post = Post {
            id: Uuid::new_v4(),
            title: "T".to_string(),
            slug: "t".to_string(),
            content: json!({"type": "doc", "content": []}),
            excerpt: None,
            feature_image_url: None,
            is_published: true,
            author_id: author.id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            tags: vec!["rust".to_string()],
        };

        let value = serde_json::to_value(PostPublicWithContent::new(post, author)).unwrap();
        assert_eq!(value["slug"], "t");
        assert_eq!(value["tags"], json!(["rust"]));
        assert_eq!(value["content"]["type"], "doc");
        assert_eq!(value["author"]["email"], "a@b.io");
    }
}
