//! Object storage behind the `MediaStore` trait.
//!
//! `S3MediaStore` talks to MinIO (or any S3-compatible endpoint) with
//! path-style addressing. `MemoryMediaStore` keeps objects in a map and backs
//! the router tests.

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::StorageConfig;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object storage error: {0}")]
    Backend(String),
    #[error("Presigning failed: {0}")]
    Presign(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Object metadata as returned by HEAD or LIST
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectListing {
    pub objects: Vec<ObjectInfo>,
    pub key_count: usize,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn ensure_bucket(&self) -> StorageResult<()>;

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()>;

    /// `None` when the key does not exist
    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectInfo>>;

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        max_keys: i32,
        continuation_token: Option<&str>,
    ) -> StorageResult<ObjectListing>;

    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;
}

fn backend_error<E>(err: E) -> StorageError
where
    E: std::error::Error,
{
    StorageError::Backend(DisplayErrorContext(err).to_string())
}

fn to_chrono(value: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos()))
}

fn s3_client(config: &StorageConfig, endpoint: &str) -> Client {
    let credentials = Credentials::new(
        &config.access_key,
        &config.secret_key,
        None,
        None,
        "contentgen-api",
    );
    let s3_config = aws_sdk_s3::Config::builder()
        .region(Region::new(config.region.clone()))
        .endpoint_url(endpoint)
        .credentials_provider(credentials)
        .force_path_style(true)
        .behavior_version_latest()
        .build();
    Client::from_conf(s3_config)
}

/// S3-compatible store. Presigned URLs are signed against the public endpoint
/// so browsers can resolve them.
pub struct S3MediaStore {
    client: Client,
    public_client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3MediaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3MediaStore")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3MediaStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: s3_client(config, &config.minio_api_base_url),
            public_client: s3_client(config, &config.minio_base_url),
            bucket: config.bucket_name.clone(),
        }
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn ensure_bucket(&self) -> StorageResult<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(backend_error)?;
        info!("Created bucket: {}", self.bucket);
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type.map(str::to_string))
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: output.content_length().unwrap_or_default(),
                content_type: output.content_type().map(str::to_string),
                metadata: output.metadata().cloned().unwrap_or_default(),
                last_modified: to_chrono(output.last_modified()),
            })),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::head_object::HeadObjectError::is_not_found)
                {
                    return Ok(None);
                }
                Err(backend_error(err))
            }
        }
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        max_keys: i32,
        continuation_token: Option<&str>,
    ) -> StorageResult<ObjectListing> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(max_keys)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(continuation_token.map(str::to_string))
            .send()
            .await
            .map_err(backend_error)?;

        let objects: Vec<ObjectInfo> = output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectInfo {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or_default(),
                    content_type: None,
                    metadata: HashMap::new(),
                    last_modified: to_chrono(object.last_modified()),
                })
            })
            .collect();

        Ok(ObjectListing {
            key_count: output
                .key_count()
                .map(|c| c.max(0) as usize)
                .unwrap_or(objects.len()),
            objects,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_continuation_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning =
            PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::Presign(e.to_string()))?;
        let request = self
            .public_client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(DisplayErrorContext(e).to_string()))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
pub use memory::MemoryMediaStore;

#[cfg(test)]
mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Clone)]
    struct StoredObject {
        body: Vec<u8>,
        content_type: Option<String>,
        metadata: HashMap<String, String>,
        last_modified: DateTime<Utc>,
    }

    /// In-memory store. Continuation tokens are the last key of the previous page.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryMediaStore {
        objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    }

    impl MemoryMediaStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn object_body(&self, key: &str) -> Option<Vec<u8>> {
            self.objects.read().await.get(key).map(|o| o.body.clone())
        }
    }

    #[async_trait]
    impl MediaStore for MemoryMediaStore {
        async fn ensure_bucket(&self) -> StorageResult<()> {
            Ok(())
        }

        async fn put_object(
            &self,
            key: &str,
            body: Vec<u8>,
            content_type: Option<&str>,
            metadata: HashMap<String, String>,
        ) -> StorageResult<()> {
            self.objects.write().await.insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: content_type.map(str::to_string),
                    metadata,
                    last_modified: Utc::now(),
                },
            );
            Ok(())
        }

        async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
            Ok(self.objects.read().await.get(key).map(|o| ObjectInfo {
                key: key.to_string(),
                size: o.body.len() as i64,
                content_type: o.content_type.clone(),
                metadata: o.metadata.clone(),
                last_modified: Some(o.last_modified),
            }))
        }

        async fn list_objects(
            &self,
            prefix: Option<&str>,
            max_keys: i32,
            continuation_token: Option<&str>,
        ) -> StorageResult<ObjectListing> {
            let objects = self.objects.read().await;
            let max_keys = max_keys.max(0) as usize;
            let mut matching = objects
                .iter()
                .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
                .filter(|(key, _)| continuation_token.map_or(true, |t| key.as_str() > t));

            let page: Vec<ObjectInfo> = matching
                .by_ref()
                .take(max_keys)
                .map(|(key, o)| ObjectInfo {
                    key: key.clone(),
                    size: o.body.len() as i64,
                    content_type: None,
                    metadata: HashMap::new(),
                    last_modified: Some(o.last_modified),
                })
                .collect();
            let is_truncated = matching.next().is_some();

            Ok(ObjectListing {
                key_count: page.len(),
                next_continuation_token: if is_truncated {
                    page.last().map(|o| o.key.clone())
                } else {
                    None
                },
                is_truncated,
                objects: page,
            })
        }

        async fn delete_object(&self, key: &str) -> StorageResult<()> {
            self.objects.write().await.remove(key);
            Ok(())
        }

        async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
            Ok(format!(
                "memory://{}?expires_in={}",
                key,
                expires_in.as_secs()
            ))
        }
    }
}
