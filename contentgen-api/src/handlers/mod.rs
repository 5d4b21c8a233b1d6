//! HTTP handlers, one module per API area. Each module exposes a `router`
//! that `routes::create_router` nests under the API prefix.

use axum::{
    extract::{FromRequest, FromRequestParts, Multipart, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::models::ApiError;

pub mod ai;
pub mod dashboard;
pub mod images;
pub mod login;
pub mod media;
pub mod posts;
pub mod private;
pub mod root;
pub mod tags;
pub mod users;
pub mod utils;

/// `axum::extract::Path` with the JSON error body on rejection
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

/// `axum::extract::Query` with the JSON error body on rejection
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

/// `axum::Form` with the JSON error body on rejection
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct Form<T>(pub T);

/// JSON body that has passed `validator` checks
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| match ApiError::from(rejection) {
                ApiError::BadRequest(message) => ApiError::validation(message),
                other => other,
            })?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

/// The `file` field of a multipart body
#[derive(Debug)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[axum::async_trait]
impl<S> FromRequest<S> for FileUpload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state).await?;
        read_file_field(multipart).await
    }
}

async fn read_file_field(mut multipart: Multipart) -> Result<FileUpload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Missing filename".to_string()))?;
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(FileUpload {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(ApiError::validation("Missing multipart field: file"))
}
