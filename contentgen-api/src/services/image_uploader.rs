use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::models::image::{FluxModel, NewImage, UploadProvider, UploadResult};
use crate::models::{ApiError, ApiResult};
use crate::services::ai_generator::AiGenerator;
use crate::services::database::DatabaseService;

/// Lower-cased extension of `filename` if it is on the allow-list
pub fn allowed_extension(config: &StorageConfig, filename: &str) -> ApiResult<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| config.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .ok_or_else(|| ApiError::BadRequest("File type not allowed".to_string()))?;
    Ok(ext)
}

pub fn check_size(config: &StorageConfig, size: usize) -> ApiResult<()> {
    if size > config.max_file_size {
        return Err(ApiError::PayloadTooLarge(format!(
            "File exceeds the maximum size of {} bytes",
            config.max_file_size
        )));
    }
    Ok(())
}

/// Stores uploaded images on local disk and records them in the `image` table
#[derive(Clone)]
pub struct ImageUploader {
    db: DatabaseService,
    ai: AiGenerator,
    storage: StorageConfig,
    public_url: String,
}

impl ImageUploader {
    pub fn new(
        db: DatabaseService,
        ai: AiGenerator,
        storage: &StorageConfig,
        public_url: &str,
    ) -> Self {
        Self {
            db,
            ai,
            storage: storage.clone(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn file_path(&self, filename: &str) -> PathBuf {
        Path::new(&self.storage.upload_dir).join(filename)
    }

    /// Prompt recorded by Flux for a generation task, if it can be fetched
    async fn generation_prompt(&self, id: Uuid) -> Option<String> {
        match self.ai.fetch_image_metadata(&id.to_string()).await {
            Ok(Some(result)) => result
                .get("prompt")
                .and_then(Value::as_str)
                .map(str::to_string),
            Ok(None) => None,
            Err(e) => {
                debug!(image_id = %id, error = %e, "No generation metadata for image");
                None
            }
        }
    }

    pub async fn upload(
        &self,
        id: Uuid,
        filename: &str,
        body: &[u8],
        model: Option<FluxModel>,
    ) -> ApiResult<UploadResult> {
        let ext = allowed_extension(&self.storage, filename)?;
        check_size(&self.storage, body.len())?;

        tokio::fs::create_dir_all(&self.storage.upload_dir).await?;
        let unique_filename = format!("{}.{}", id, ext);
        let path = self.file_path(&unique_filename);
        info!(original = filename, path = %path.display(), "Saving uploaded image");
        tokio::fs::write(&path, body).await?;

        let url = format!("{}/uploads/{}", self.public_url, unique_filename);
        let record = NewImage {
            filename: unique_filename.clone(),
            prompt: self.generation_prompt(id).await,
            model: model.map(|m| m.as_str().to_string()),
            url: url.clone(),
            provider: UploadProvider::Local,
            provider_id: Some(unique_filename.clone()),
        };

        if let Err(e) = self.db.create_image(&record).await {
            error!(path = %path.display(), error = %e, "Error uploading file");
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                error!(error = %remove_err, "Failed to remove orphaned upload");
            }
            return Err(e);
        }

        Ok(UploadResult {
            url,
            provider_id: unique_filename.clone(),
            provider: UploadProvider::Local,
            upload_result_metadata: json!({"filename": unique_filename}),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_allowed_extension() {
        let config = StorageConfig::default();
        assert_eq!(allowed_extension(&config, "photo.PNG").unwrap(), "png");
        assert_eq!(allowed_extension(&config, "clip.final.mp4").unwrap(), "mp4");
        assert!(matches!(
            allowed_extension(&config, "script.sh"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(allowed_extension(&config, "no_extension").is_err());
    }

    #[test]
    fn test_check_size() {
        let config = StorageConfig {
            max_file_size: 10,
            ..Default::default()
        };
        assert!(check_size(&config, 10).is_ok());
        assert!(matches!(
            check_size(&config, 11),
            Err(ApiError::PayloadTooLarge(_))
        ));
    }
}
