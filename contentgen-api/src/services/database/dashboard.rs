use super::DatabaseService;
use crate::models::dashboard::{DashboardStats, TagCount, UserDashboardInfo};
use crate::models::user::User;
use crate::models::ApiResult;

/// Number of entries in `popular_tags`
const POPULAR_TAG_LIMIT: i64 = 5;

impl DatabaseService {
    /// Post counts for the site and for `user`, plus tag breakdowns
    pub async fn dashboard_stats(&self, user: &User) -> ApiResult<DashboardStats> {
        let (total_posts, user_posts, user_drafts): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE is_published),
                COUNT(*) FILTER (WHERE is_published AND author_id = $1),
                COUNT(*) FILTER (WHERE NOT is_published AND author_id = $1)
            FROM posts
            "#,
        )
        .bind(user.id)
        .fetch_one(&self.pool)
        .await?;

        let popular_tags = sqlx::query_as::<_, TagCount>(
            r#"
            SELECT t.name, COUNT(*) AS count
            FROM tags t
            JOIN post_tag pt ON pt.tag_id = t.id
            JOIN posts p ON p.id = pt.post_id
            WHERE p.is_published
            GROUP BY t.name
            ORDER BY count DESC, t.name
            LIMIT $1
            "#,
        )
        .bind(POPULAR_TAG_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let tag_distribution = sqlx::query_as::<_, TagCount>(
            r#"
            SELECT t.name, COUNT(*) AS count
            FROM tags t
            JOIN post_tag pt ON pt.tag_id = t.id
            JOIN posts p ON p.id = pt.post_id
            WHERE p.author_id = $1
            GROUP BY t.name
            ORDER BY count DESC, t.name
            "#,
        )
        .bind(user.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(DashboardStats {
            user: UserDashboardInfo {
                id: user.id,
                full_name: user.full_name.clone(),
                email: user.email.clone(),
                is_superuser: user.is_superuser,
            },
            total_posts,
            user_posts,
            user_drafts,
            popular_tags,
            tag_distribution,
        })
    }
}
