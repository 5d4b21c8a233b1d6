use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::StorageConfig;
use crate::models::media::{MediaListQuery, MediaListResponse, MediaResponse};
use crate::services::storage::{MediaStore, ObjectInfo, StorageError, StorageResult};

/// Media operations over a `MediaStore`, producing API-facing responses
#[derive(Clone)]
pub struct MediaService {
    store: Arc<dyn MediaStore>,
    bucket: String,
    public_base_url: String,
    presign_expiry: Duration,
}

impl MediaService {
    pub fn new(store: Arc<dyn MediaStore>, config: &StorageConfig) -> Self {
        Self {
            store,
            bucket: config.bucket_name.clone(),
            public_base_url: config.minio_base_url.trim_end_matches('/').to_string(),
            presign_expiry: Duration::from_secs(config.signed_url_expiration),
        }
    }

    pub fn store(&self) -> &Arc<dyn MediaStore> {
        &self.store
    }

    /// Browser-facing URL of an object
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket, key)
    }

    fn to_response(&self, info: ObjectInfo) -> MediaResponse {
        MediaResponse {
            url: self.object_url(&info.key),
            key: info.key,
            content_type: info.content_type,
            size: info.size,
            metadata: info.metadata,
            last_modified: info.last_modified,
            presigned_url: None,
        }
    }

    /// Signed GET URL, falling back to the public path when signing fails
    pub async fn presigned_url(&self, key: &str) -> String {
        match self.store.presign_get(key, self.presign_expiry).await {
            Ok(url) => url,
            Err(e) => {
                error!("Error generating presigned URL for {}: {}", key, e);
                format!("{}/uploads/{}", self.public_base_url, key)
            }
        }
    }

    pub async fn ensure_bucket(&self) -> StorageResult<()> {
        self.store.ensure_bucket().await
    }

    /// Store an object and describe it as stored
    pub async fn upload_media(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> StorageResult<MediaResponse> {
        let size = body.len();
        self.store.ensure_bucket().await?;
        self.store
            .put_object(key, body, content_type, metadata)
            .await?;
        let info = self
            .store
            .head_object(key)
            .await?
            .ok_or_else(|| StorageError::Backend(format!("Object {} missing after upload", key)))?;
        info!(key, size, "Uploaded media");

        let mut response = self.to_response(info);
        if response.content_type.is_none() {
            response.content_type = content_type.map(str::to_string);
        }
        Ok(response)
    }

    /// List objects, reading each object's metadata to filter by media type
    pub async fn list_media(&self, query: &MediaListQuery) -> StorageResult<MediaListResponse> {
        let listing = self
            .store
            .list_objects(
                query.prefix.as_deref(),
                query.max_keys.clamp(1, 1000),
                query.continuation_token.as_deref(),
            )
            .await?;

        let mut contents = Vec::with_capacity(listing.objects.len());
        for object in listing.objects {
            let head = self.store.head_object(&object.key).await?;
            let info = match head {
                Some(head) => ObjectInfo {
                    last_modified: object.last_modified.or(head.last_modified),
                    ..head
                },
                None => continue,
            };
            if let Some(media_type) = query.media_type {
                if info.metadata.get("media_type").map(String::as_str) != Some(media_type.as_str()) {
                    continue;
                }
            }
            contents.push(self.to_response(info));
        }

        Ok(MediaListResponse {
            contents,
            key_count: listing.key_count,
            is_truncated: listing.is_truncated,
            next_continuation_token: listing.next_continuation_token,
        })
    }

    pub async fn get_media(&self, key: &str) -> StorageResult<MediaResponse> {
        let info = self
            .store
            .head_object(key)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let presigned = self.presigned_url(key).await;
        let mut response = self.to_response(info);
        response.presigned_url = Some(presigned);
        Ok(response)
    }

    pub async fn delete_media(&self, key: &str) -> StorageResult<()> {
        if self.store.head_object(key).await?.is_none() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        self.store.delete_object(key).await?;
        info!(key, "Deleted media");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::MediaType;
    use crate::services::storage::MemoryMediaStore;
    use pretty_assertions::assert_eq;

    fn service() -> MediaService {
        MediaService::new(Arc::new(MemoryMediaStore::new()), &StorageConfig::default())
    }

    fn meta(media_type: &str) -> HashMap<String, String> {
        HashMap::from([("media_type".to_string(), media_type.to_string())])
    }

    #[tokio::test]
    async fn test_upload_then_get() {
        let media = service();
        let uploaded = media
            .upload_media("abc.png", vec![0; 16], Some("image/png"), meta("image"))
            .await
            .unwrap();

        assert_eq!(uploaded.url, "http://localhost:9000/uploads/abc.png");
        assert_eq!(uploaded.size, 16);
        assert_eq!(uploaded.presigned_url, None);

        let fetched = media.get_media("abc.png").await.unwrap();
        assert_eq!(fetched.metadata.get("media_type").map(String::as_str), Some("image"));
        assert_eq!(
            fetched.presigned_url.as_deref(),
            Some("memory://abc.png?expires_in=3600")
        );
    }

    #[tokio::test]
    async fn test_list_filters_by_media_type() {
        let media = service();
        media.upload_media("a.png", vec![1], None, meta("image")).await.unwrap();
        media.upload_media("b.mp4", vec![1], None, meta("video")).await.unwrap();

        let query = MediaListQuery {
            prefix: None,
            max_keys: 1000,
            continuation_token: None,
            media_type: Some(MediaType::Video),
        };
        let listing = media.list_media(&query).await.unwrap();
        let keys: Vec<&str> = listing.contents.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["b.mp4"]);
        assert_eq!(listing.key_count, 2);
    }

    #[tokio::test]
    async fn test_missing_media() {
        let media = service();
        assert!(matches!(
            media.get_media("nope.png").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            media.delete_media("nope.png").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
