use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use super::DatabaseService;
use crate::models::post::{normalize_tags, Pagination, Post, PostCreate, PostUpdate};
use crate::models::user::User;
use crate::models::{ApiError, ApiResult};
use crate::utils::slug::{slugify, suffix_stem, with_suffix};

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.slug, p.content, p.excerpt, p.feature_image_url,
           p.is_published, p.author_id, p.created_at, p.updated_at,
           ARRAY(
               SELECT t.name FROM tags t
               JOIN post_tag pt ON pt.tag_id = t.id
               WHERE pt.post_id = p.id
               ORDER BY t.name
           )::text[] AS tags
    FROM posts p
"#;

/// Optional constraints shared by every post listing
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub tag: Option<String>,
    pub published: Option<bool>,
    pub author_id: Option<Uuid>,
}

impl PostFilter {
    pub fn published(published: Option<bool>) -> Self {
        Self {
            published,
            ..Default::default()
        }
    }

    pub fn by_author(author_id: Uuid, published: Option<bool>) -> Self {
        Self {
            author_id: Some(author_id),
            published,
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag.filter(|t| !t.trim().is_empty());
        self
    }

    fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE TRUE");
        if let Some(tag) = &self.tag {
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM post_tag pt JOIN tags t ON t.id = pt.tag_id \
                     WHERE pt.post_id = p.id AND t.name = ",
                )
                .push_bind(tag.clone())
                .push(")");
        }
        if let Some(published) = self.published {
            builder.push(" AND p.is_published = ").push_bind(published);
        }
        if let Some(author_id) = self.author_id {
            builder.push(" AND p.author_id = ").push_bind(author_id);
        }
    }
}

/// Replace the tag set of a post, creating missing tags
async fn replace_post_tags(
    conn: &mut PgConnection,
    post_id: Uuid,
    tags: &[String],
) -> ApiResult<()> {
    sqlx::query("DELETE FROM post_tag WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

    for name in normalize_tags(tags) {
        let tag_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO tags (id, name) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&name)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query("INSERT INTO post_tag (post_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// First free slug among `base`, `base-2`, `base-3`, ...
///
/// Long bases are shortened to fit the suffix, so the lookup matches on the
/// stem every candidate shares rather than on `base` itself.
async fn unique_slug(conn: &mut PgConnection, base: &str) -> ApiResult<String> {
    let taken: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT slug FROM posts WHERE slug LIKE $1")
            .bind(format!("{}%", suffix_stem(base)))
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();

    Ok(next_free_slug(base, &taken))
}

fn next_free_slug(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2u32..)
        .map(|n| with_suffix(base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| format!("{}-{}", base, Uuid::new_v4().simple()))
}

impl DatabaseService {
    /// Insert a post with its tags. The slug is derived from the title when
    /// not supplied.
    pub async fn create_post(&self, author_id: Uuid, input: &PostCreate) -> ApiResult<Post> {
        let mut tx = self.pool.begin().await?;

        let slug = match &input.slug {
            Some(slug) => slug.clone(),
            None => unique_slug(&mut tx, &slugify(&input.title)).await?,
        };

        let post_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO posts (id, title, slug, content, excerpt, feature_image_url,
                               is_published, author_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.title)
        .bind(&slug)
        .bind(&input.content)
        .bind(&input.excerpt)
        .bind(&input.feature_image_url)
        .bind(input.is_published)
        .bind(author_id)
        .fetch_one(&mut *tx)
        .await?;

        replace_post_tags(&mut tx, post_id, &input.tags).await?;
        tx.commit().await?;

        info!(post_id = %post_id, slug = %slug, "Post created");
        self.get_post(post_id)
            .await?
            .ok_or_else(|| ApiError::Internal("Post missing after insert".to_string()))
    }

    pub async fn get_post(&self, post_id: Uuid) -> ApiResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!("{} WHERE p.id = $1", POST_SELECT))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    /// Post together with its author row
    pub async fn get_post_with_author(&self, post_id: Uuid) -> ApiResult<Option<(Post, User)>> {
        let Some(post) = self.get_post(post_id).await? else {
            return Ok(None);
        };
        let author = self
            .get_user_by_id(post.author_id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("Author of post {} missing", post_id)))?;

        Ok(Some((post, author)))
    }

    /// Unpublished post owned by `author_id`
    pub async fn get_draft(&self, author_id: Uuid, post_id: Uuid) -> ApiResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "{} WHERE p.id = $1 AND p.author_id = $2 AND NOT p.is_published",
            POST_SELECT
        ))
        .bind(post_id)
        .bind(author_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    /// Newest-first page of posts matching `filter`, plus the total count
    pub async fn list_posts(
        &self,
        filter: &PostFilter,
        page: Pagination,
    ) -> ApiResult<(Vec<Post>, i64)> {
        let page = page.clamped();

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        filter.push_where(&mut count_query);
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut list_query = QueryBuilder::<Postgres>::new(POST_SELECT);
        filter.push_where(&mut list_query);
        list_query
            .push(" ORDER BY p.created_at DESC OFFSET ")
            .push_bind(page.skip)
            .push(" LIMIT ")
            .push_bind(page.limit);
        let posts = list_query
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;

        Ok((posts, count))
    }

    pub async fn list_posts_by_author(
        &self,
        author_id: Uuid,
        page: Pagination,
        published: Option<bool>,
    ) -> ApiResult<(Vec<Post>, i64)> {
        self.list_posts(&PostFilter::by_author(author_id, published), page)
            .await
    }

    /// Apply a partial update; `tags`, when present, replaces the set
    pub async fn update_post(&self, post_id: Uuid, input: &PostUpdate) -> ApiResult<Post> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE posts SET
                title = COALESCE($2, title),
                slug = COALESCE($3, slug),
                content = COALESCE($4, content),
                excerpt = COALESCE($5, excerpt),
                feature_image_url = COALESCE($6, feature_image_url),
                is_published = COALESCE($7, is_published),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .bind(&input.title)
        .bind(&input.slug)
        .bind(&input.content)
        .bind(&input.excerpt)
        .bind(&input.feature_image_url)
        .bind(input.is_published)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(ApiError::NotFound("Post not found".to_string()));
        }

        if let Some(tags) = &input.tags {
            replace_post_tags(&mut tx, post_id, tags).await?;
        }
        tx.commit().await?;

        self.get_post(post_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))
    }

    pub async fn delete_post(&self, post_id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_all_posts(&self) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM posts").execute(&self.pool).await?;
        info!(deleted = result.rows_affected(), "Deleted all posts");
        Ok(result.rows_affected())
    }

    pub async fn count_posts(&self) -> ApiResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::slug::MAX_SLUG_LEN;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_next_free_slug() {
        let taken: HashSet<String> = ["intro", "intro-2", "intro-3"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(next_free_slug("intro", &taken), "intro-4");
        assert_eq!(next_free_slug("outro", &taken), "outro");
    }

    #[test]
    fn test_next_free_slug_for_long_title() {
        let base = slugify(&"words ".repeat(80));
        assert_eq!(base.len(), MAX_SLUG_LEN);

        let second = with_suffix(&base, 2);
        assert!(!second.starts_with(&format!("{}-", base)));
        assert!(second.starts_with(&suffix_stem(&base)));

        let taken: HashSet<String> = [base.clone(), second].into_iter().collect();
        let next = next_free_slug(&base, &taken);
        assert_eq!(next, with_suffix(&base, 3));
        assert_eq!(next.len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_filter_sql() {
        let filter = PostFilter::by_author(Uuid::nil(), Some(false)).with_tag(Some("rust".into()));
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        filter.push_where(&mut builder);
        let sql = builder.sql();

        assert!(sql.contains("t.name = $1"));
        assert!(sql.contains("p.is_published = $2"));
        assert!(sql.contains("p.author_id = $3"));

        let empty = PostFilter::published(None).with_tag(Some("  ".into()));
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        empty.push_where(&mut builder);
        assert_eq!(builder.sql(), "SELECT COUNT(*) FROM posts p WHERE TRUE");
    }
}
