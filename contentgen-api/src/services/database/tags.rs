use uuid::Uuid;

use super::DatabaseService;
use crate::models::post::TagResponse;
use crate::models::ApiResult;

impl DatabaseService {
    /// Every tag with the number of posts carrying it, most used first
    pub async fn list_tags(&self) -> ApiResult<Vec<TagResponse>> {
        let tags = sqlx::query_as::<_, TagResponse>(
            r#"
            SELECT t.id, t.name, COUNT(pt.post_id) AS post_count
            FROM tags t
            LEFT JOIN post_tag pt ON pt.tag_id = t.id
            GROUP BY t.id, t.name
            ORDER BY post_count DESC, t.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tags)
    }

    /// Insert a tag; a duplicate name surfaces as a conflict
    pub async fn create_tag(&self, name: &str) -> ApiResult<TagResponse> {
        let tag = sqlx::query_as::<_, TagResponse>(
            "INSERT INTO tags (id, name) VALUES ($1, $2) RETURNING id, name, 0::bigint AS post_count",
        )
        .bind(Uuid::new_v4())
        .bind(name.trim())
        .fetch_one(&self.pool)
        .await?;

        Ok(tag)
    }
}
