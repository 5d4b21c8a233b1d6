use uuid::Uuid;

use super::DatabaseService;
use crate::models::post::Pagination;
use crate::models::user::{User, UserCreate, UserUpdate};
use crate::models::ApiResult;

const USER_COLUMNS: &str = "id, email, hashed_password, full_name, image_url, is_active, \
                            is_superuser, email_verified, created_at, updated_at";

impl DatabaseService {
    pub async fn get_user_by_id(&self, user_id: Uuid) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// One page of users plus the total count
    pub async fn list_users(&self, page: Pagination) -> ApiResult<(Vec<User>, i64)> {
        let page = page.clamped();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_at OFFSET $1 LIMIT $2",
            USER_COLUMNS
        ))
        .bind(page.skip)
        .bind(page.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok((users, count))
    }

    /// Insert a user; the password must already be hashed
    pub async fn create_user(&self, input: &UserCreate, hashed_password: &str) -> ApiResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, hashed_password, full_name, image_url,
                               is_active, is_superuser, email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.email)
        .bind(hashed_password)
        .bind(&input.full_name)
        .bind(&input.image_url)
        .bind(input.is_active)
        .bind(input.is_superuser)
        .bind(input.email_verified)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    /// Apply the fields present in `input`; absent fields keep their value
    pub async fn update_user(
        &self,
        user_id: Uuid,
        input: &UserUpdate,
        hashed_password: Option<&str>,
    ) -> ApiResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                hashed_password = COALESCE($3, hashed_password),
                full_name = COALESCE($4, full_name),
                image_url = COALESCE($5, image_url),
                is_active = COALESCE($6, is_active),
                is_superuser = COALESCE($7, is_superuser),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(&input.email)
        .bind(hashed_password)
        .bind(&input.full_name)
        .bind(&input.image_url)
        .bind(input.is_active)
        .bind(input.is_superuser)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> ApiResult<()> {
        sqlx::query("UPDATE users SET hashed_password = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(hashed_password)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_email_verified(&self, user_id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete a user and, through the foreign key, their posts
    pub async fn delete_user(&self, user_id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
