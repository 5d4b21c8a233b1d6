use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::middleware::logging::current_request_id;
use crate::services::ai_generator::AiError;
use crate::services::auth_service::TokenError;
use crate::services::email::EmailError;
use crate::services::storage::StorageError;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    RequestTimeout(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("External API error: {0}")]
    ExternalApi(String),
}

/// Error response structure for JSON API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn to_error_response(&self, request_id: Option<String>) -> ErrorResponse {
        ErrorResponse {
            error: ErrorInfo {
                code: self.error_code().to_string(),
                message: self.public_message(),
                details: self.error_details(),
            },
            timestamp: chrono::Utc::now(),
            request_id,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RequestTimeout(_) => "REQUEST_TIMEOUT",
            ApiError::PayloadTooLarge(_) => "FILE_TOO_LARGE",
            ApiError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::ExternalApi(_) => "EXTERNAL_API_ERROR",
        }
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Validation { fields, .. } if !fields.is_empty() => {
                serde_json::to_value(fields).ok()
            }
            _ => None,
        }
    }

    /// Database internals stay in the logs
    fn public_message(&self) -> String {
        match self {
            ApiError::Database(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ExternalApi(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{}", self);
        } else {
            tracing::debug!(code = self.error_code(), "{}", self);
        }
        let error_response = self.to_error_response(current_request_id());

        (status, Json(error_response)).into_response()
    }
}

// Convert from common error types
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let message = match db_err.constraint() {
                        Some("users_email_key") => {
                            "The user with this email already exists in the system"
                        }
                        Some("posts_slug_key") => "A post with this slug already exists",
                        Some("uq_posts_published_title") => {
                            "A post with this title already exists"
                        }
                        Some("tags_name_key") => "Tag already exists",
                        _ => "Resource already exists",
                    };
                    ApiError::Conflict(message.to_string())
                } else {
                    ApiError::Database(db_err.to_string())
                }
            }
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(format!("IO error: {}", err))
    }
}

impl From<redis::RedisError> for ApiError {
    fn from(err: redis::RedisError) -> Self {
        ApiError::ServiceUnavailable(format!("Redis error: {}", err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| FieldError {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("invalid value ({})", e.code)),
                    code: e.code.to_string(),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::Validation {
            message: "Request validation failed".to_string(),
            fields,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(msg) => ApiError::Internal(msg),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ApiError::NotFound(format!("Media not found: {}", key)),
            StorageError::Io(e) => ApiError::Internal(format!("IO error: {}", e)),
            other => ApiError::ExternalApi(other.to_string()),
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(err: EmailError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<AiError> for ApiError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::TaskFailed => ApiError::Internal("Image generation failed".to_string()),
            AiError::TaskNotFound => ApiError::NotFound("Task not found".to_string()),
            AiError::RequestModerated => ApiError::BadRequest(
                "Request was moderated due to content policy".to_string(),
            ),
            AiError::ContentModerated => ApiError::BadRequest(
                "Generated content was moderated due to content policy".to_string(),
            ),
            AiError::Timeout => {
                ApiError::RequestTimeout("Timeout waiting for image generation".to_string())
            }
            AiError::UnexpectedStatus(detail) => {
                ApiError::Internal(format!("Image generation failed: {}", detail))
            }
            AiError::NotConfigured(what) => ApiError::ServiceUnavailable(what),
            AiError::Storage(e) => e.into(),
            other => ApiError::ExternalApi(other.to_string()),
        }
    }
}

/// Extractor rejections keep their status class but use the JSON error body
fn rejection_error(status: StatusCode, text: String) -> ApiError {
    match status {
        StatusCode::UNPROCESSABLE_ENTITY => ApiError::validation(text),
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(text),
        _ => ApiError::BadRequest(text),
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        rejection_error(err.status(), err.body_text())
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Collects field errors before failing a request
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: Vec<FieldError>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
            code: "VALIDATION_ERROR".to_string(),
        });
    }

    pub fn build(self, message: impl Into<String>) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation {
                message: message.into(),
                fields: self.errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_error_code_generation() {
        let error = ApiError::NotFound("User not found".to_string());
        assert_eq!(error.error_code(), "NOT_FOUND");
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(error.to_string(), "User not found");
    }

    #[test]
    fn test_validation_error_builder() {
        let mut builder = ValidationErrorBuilder::new();
        builder.add_error("content", "Unknown node type");
        builder.add_error("content[2].text", "Text nodes need text");

        match builder.build("Invalid document") {
            Err(ApiError::Validation { fields, .. }) => assert_eq!(fields.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(ValidationErrorBuilder::new().build("ok").is_ok());
    }

    #[test]
    fn test_database_message_hidden() {
        let error = ApiError::Database("relation \"users\" does not exist".to_string());
        let response = error.to_error_response(None);
        assert_eq!(response.error.message, "Internal server error");
        assert_eq!(response.error.code, "DATABASE_ERROR");
    }

    #[derive(Validate)]
    struct Signup {
        #[validate(email)]
        email: String,
        #[validate(length(min = 8, max = 40))]
        password: String,
    }

    #[test]
    fn test_from_validation_errors() {
        let input = Signup {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
        };
        let error: ApiError = input.validate().unwrap_err().into();

        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let details = error.to_error_response(None).error.details.unwrap();
        let fields: Vec<String> = details
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(fields, vec!["email".to_string(), "password".to_string()]);
    }

    #[test]
    fn test_rejection_status_classes() {
        let unprocessable = rejection_error(StatusCode::UNPROCESSABLE_ENTITY, "missing field".into());
        assert_eq!(unprocessable.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(unprocessable.error_code(), "VALIDATION_ERROR");

        let too_large = rejection_error(StatusCode::PAYLOAD_TOO_LARGE, "too big".into());
        assert_eq!(too_large.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let unsupported = rejection_error(StatusCode::UNSUPPORTED_MEDIA_TYPE, "no type".into());
        assert_eq!(unsupported.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(unsupported.to_string(), "no type");
    }

    #[test]
    fn test_ai_error_mapping() {
        let timeout: ApiError = AiError::Timeout.into();
        assert_eq!(timeout.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(timeout.to_string(), "Timeout waiting for image generation");

        let moderated: ApiError = AiError::ContentModerated.into();
        assert_eq!(moderated.status_code(), StatusCode::BAD_REQUEST);

        let missing: ApiError = AiError::TaskNotFound.into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }
}
