use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Task status reported by the Flux result endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageGenerationStatus {
    #[serde(rename = "Task not found")]
    TaskNotFound,
    Pending,
    #[serde(rename = "Request Moderated")]
    RequestModerated,
    #[serde(rename = "Content Moderated")]
    ContentModerated,
    Ready,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluxModel {
    #[default]
    #[serde(rename = "flux-pro-1.1")]
    FluxPro11,
    #[serde(rename = "flux-pro")]
    FluxPro,
    #[serde(rename = "flux-dev")]
    FluxDev,
    #[serde(rename = "flux-pro-1.1-ultra")]
    FluxPro11Ultra,
    #[serde(rename = "flux-pro-1.0-fill")]
    FluxPro10Fill,
    #[serde(rename = "flux-pro-1.0-canny")]
    FluxPro10Canny,
    #[serde(rename = "flux-pro-1.0-depth")]
    FluxPro10Depth,
}

impl FluxModel {
    /// Endpoint path segment, identical to the wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            FluxModel::FluxPro11 => "flux-pro-1.1",
            FluxModel::FluxPro => "flux-pro",
            FluxModel::FluxDev => "flux-dev",
            FluxModel::FluxPro11Ultra => "flux-pro-1.1-ultra",
            FluxModel::FluxPro10Fill => "flux-pro-1.0-fill",
            FluxModel::FluxPro10Canny => "flux-pro-1.0-canny",
            FluxModel::FluxPro10Depth => "flux-pro-1.0-depth",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        }
    }
}

fn default_dimension() -> u32 {
    512
}

fn default_safety_tolerance() -> u8 {
    2
}

/// Image generation request. The ultra-only fields are passed through when set.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImageCreate {
    #[validate(length(min = 1, max = 1000))]
    pub prompt: String,
    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 2048))]
    pub width: u32,
    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 2048))]
    pub height: u32,
    #[serde(default, skip_serializing)]
    pub model: FluxModel,
    #[serde(default)]
    pub prompt_upsampling: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default = "default_safety_tolerance")]
    #[validate(range(max = 6))]
    pub safety_tolerance: u8,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub image_prompt_strength: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    pub id: String,
    pub prompt: String,
    pub model: FluxModel,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadProvider {
    Local,
    S3,
    Gcs,
}

impl UploadProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadProvider::Local => "local",
            UploadProvider::S3 => "s3",
            UploadProvider::Gcs => "gcs",
        }
    }
}

/// Stored upload record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Image {
    pub id: Uuid,
    pub filename: String,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub url: String,
    pub provider: String,
    pub provider_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub filename: String,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub url: String,
    pub provider: UploadProvider,
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    pub url: String,
    pub provider_id: String,
    pub provider: UploadProvider,
    pub upload_result_metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        let status: ImageGenerationStatus = serde_json::from_value(json!("Task not found")).unwrap();
        assert_eq!(status, ImageGenerationStatus::TaskNotFound);
        let status: ImageGenerationStatus = serde_json::from_value(json!("Ready")).unwrap();
        assert_eq!(status, ImageGenerationStatus::Ready);
        let status: ImageGenerationStatus = serde_json::from_value(json!("Exploded")).unwrap();
        assert_eq!(status, ImageGenerationStatus::Unknown);
    }

    #[test]
    fn test_image_create_defaults_and_wire_body() {
        let create: ImageCreate =
            serde_json::from_value(json!({"prompt": "a lighthouse at dusk"})).unwrap();
        assert_eq!(create.width, 512);
        assert_eq!(create.model, FluxModel::FluxPro11);
        assert_eq!(create.output_format, OutputFormat::Jpeg);
        assert!(create.validate().is_ok());

        let body = serde_json::to_value(&create).unwrap();
        assert!(body.get("model").is_none());
        assert!(body.get("seed").is_none());
        assert_eq!(body["output_format"], "jpeg");
    }

    #[test]
    fn test_image_create_bounds() {
        let create: ImageCreate = serde_json::from_value(json!({
            "prompt": "x",
            "width": 4096,
            "model": "flux-dev"
        }))
        .unwrap();
        assert_eq!(create.model.as_str(), "flux-dev");
        assert!(create.validate().is_err());

        let bad_format = serde_json::from_value::<ImageCreate>(json!({
            "prompt": "x",
            "output_format": "gif"
        }));
        assert!(bad_format.is_err());
    }
}
