use uuid::Uuid;

use super::DatabaseService;
use crate::models::image::{Image, NewImage};
use crate::models::ApiResult;

impl DatabaseService {
    pub async fn create_image(&self, image: &NewImage) -> ApiResult<Image> {
        let row = sqlx::query_as::<_, Image>(
            r#"
            INSERT INTO image (id, filename, prompt, model, url, provider, provider_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING id, filename, prompt, model, url, provider, provider_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&image.filename)
        .bind(&image.prompt)
        .bind(&image.model)
        .bind(&image.url)
        .bind(image.provider.as_str())
        .bind(&image.provider_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}
