use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{AiConfig, AppConfig};
use crate::models::ai::{DraftContentRequest, ModerationResult, Tone};
use crate::models::image::{ImageCreate, ImageGenerationStatus, ImageResult};
use crate::models::media::MediaType;
use crate::services::media_service::MediaService;
use crate::services::storage::StorageError;
use crate::utils::partial_json::parse_partial;
use crate::utils::sse::{SseDecoder, DONE_MARKER};

const DRAFT_PROMPT: &str = include_str!("../../ai_prompts/content_draft.json");
const SANDBOX_PROMPT: &str = include_str!("../../ai_prompts/content_sandbox.json");
const POST_CONTENT_SCHEMA: &str = include_str!("../../ai_prompts/post_content_schema.json");

const MAX_COMPLETION_TOKENS: u32 = 2000;
const TEMPERATURE: f64 = 0.5;
const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// NDJSON lines of a streamed draft
pub type DraftStream = BoxStream<'static, Bytes>;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to start image generation: {0}")]
    MissingTaskId(String),

    #[error("Image generation failed")]
    TaskFailed,

    #[error("Task not found")]
    TaskNotFound,

    #[error("Request was moderated due to content policy")]
    RequestModerated,

    #[error("Generated content was moderated due to content policy")]
    ContentModerated,

    #[error("Unexpected generation status: {0}")]
    UnexpectedStatus(String),

    #[error("Timeout waiting for image generation")]
    Timeout,

    #[error("Failed to download image from {0}")]
    Download(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Model refused the request: {0}")]
    Refusal(String),

    #[error("Prompt template error: {0}")]
    Prompt(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Deserialize)]
struct PromptTemplate {
    content: String,
}

impl PromptTemplate {
    fn parse(name: &str, raw: &str) -> Result<Self, AiError> {
        serde_json::from_str(raw).map_err(|e| AiError::Prompt(format!("{}: {}", name, e)))
    }

    fn render(&self, tone: Tone) -> String {
        self.content.replace("{{TONE}}", tone.as_str())
    }
}

struct Prompts {
    draft: PromptTemplate,
    sandbox: PromptTemplate,
    schema: Value,
}

/// Client for the Flux image API and the OpenAI text endpoints
#[derive(Clone)]
pub struct AiGenerator {
    client: Client,
    config: AiConfig,
    poll_wait: Duration,
    media: MediaService,
    prompts: Arc<Prompts>,
}

impl AiGenerator {
    pub fn new(client: Client, config: &AppConfig, media: MediaService) -> Result<Self, AiError> {
        let schema = serde_json::from_str(POST_CONTENT_SCHEMA)
            .map_err(|e| AiError::Prompt(format!("post content schema: {}", e)))?;
        let prompts = Prompts {
            draft: PromptTemplate::parse("content_draft", DRAFT_PROMPT)?,
            sandbox: PromptTemplate::parse("content_sandbox", SANDBOX_PROMPT)?,
            schema,
        };

        Ok(Self {
            client,
            config: config.ai.clone(),
            poll_wait: config.poll_wait(),
            media,
            prompts: Arc::new(prompts),
        })
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_seconds.max(1))
    }

    fn flux_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.flux_api_base_url.trim_end_matches('/'), path)
    }

    fn openai_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.openai_api_base_url.trim_end_matches('/'), path)
    }

    fn flux_key(&self) -> Result<&str, AiError> {
        if self.config.flux_api_key.is_empty() {
            return Err(AiError::NotConfigured("FLUX_API_KEY".to_string()));
        }
        Ok(&self.config.flux_api_key)
    }

    fn openai_key(&self) -> Result<&str, AiError> {
        if self.config.openai_api_key.is_empty() {
            return Err(AiError::NotConfigured("OPENAI_API_KEY".to_string()));
        }
        Ok(&self.config.openai_api_key)
    }

    // ---- Flux image generation ----

    /// Start a Flux task, poll it to completion and store the result in S3
    pub async fn generate_image(&self, request: &ImageCreate) -> Result<ImageResult, AiError> {
        let task_id = self.start_image_generation(request).await?;
        info!(task_id = %task_id, model = request.model.as_str(), "Image generation started");

        match self.poll_generation_status(&task_id, request).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Error generating image");
                Err(e)
            }
        }
    }

    async fn start_image_generation(&self, request: &ImageCreate) -> Result<String, AiError> {
        let api_key = self.flux_key()?;
        let response = self
            .client
            .post(self.flux_url(request.model.as_str()))
            .header("X-Key", api_key)
            .timeout(self.request_timeout())
            .json(request)
            .send()
            .await?;

        let body = response.text().await?;
        let data: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        match data.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(AiError::MissingTaskId(body)),
        }
    }

    async fn check_generation_status(
        &self,
        task_id: &str,
    ) -> Result<(ImageGenerationStatus, Value), AiError> {
        let response = self
            .client
            .get(self.flux_url("get_result"))
            .query(&[("id", task_id)])
            .header("X-Key", self.flux_key()?)
            .timeout(self.request_timeout())
            .send()
            .await?;

        let data: Value = response.json().await?;
        let status = data
            .get("status")
            .cloned()
            .and_then(|s| serde_json::from_value(s).ok())
            .unwrap_or(ImageGenerationStatus::Unknown);
        Ok((status, data))
    }

    async fn poll_generation_status(
        &self,
        task_id: &str,
        request: &ImageCreate,
    ) -> Result<ImageResult, AiError> {
        for attempt in 1..=self.config.poll_max_attempts {
            let (status, data) = self.check_generation_status(task_id).await?;
            debug!(task_id, attempt, ?status, "Image generation status");

            match status {
                ImageGenerationStatus::Ready => {
                    let sample = data
                        .pointer("/result/sample")
                        .and_then(Value::as_str)
                        .ok_or_else(|| AiError::InvalidResponse(format!("no sample in {}", data)))?;
                    return self.handle_ready_status(task_id, request, sample).await;
                }
                ImageGenerationStatus::Pending => tokio::time::sleep(self.poll_wait).await,
                ImageGenerationStatus::Error => return Err(AiError::TaskFailed),
                ImageGenerationStatus::TaskNotFound => return Err(AiError::TaskNotFound),
                ImageGenerationStatus::RequestModerated => return Err(AiError::RequestModerated),
                ImageGenerationStatus::ContentModerated => return Err(AiError::ContentModerated),
                ImageGenerationStatus::Unknown => {
                    return Err(AiError::UnexpectedStatus(data.to_string()))
                }
            }
        }

        Err(AiError::Timeout)
    }

    async fn download_generated_image(&self, url: &str) -> Result<(Bytes, String), AiError> {
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout())
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(AiError::Download(url.to_string()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE)
            .to_string();
        let body = response.bytes().await?;
        Ok((body, content_type))
    }

    async fn handle_ready_status(
        &self,
        task_id: &str,
        request: &ImageCreate,
        sample_url: &str,
    ) -> Result<ImageResult, AiError> {
        let (body, content_type) = self.download_generated_image(sample_url).await?;

        let key = format!("{}.{}", task_id, request.output_format.extension());
        let metadata = HashMap::from([
            ("id".to_string(), task_id.to_string()),
            ("prompt".to_string(), request.prompt.clone()),
            ("model".to_string(), request.model.as_str().to_string()),
            ("media_type".to_string(), MediaType::Image.as_str().to_string()),
        ]);
        info!(key = %key, content_type = %content_type, "Uploading generated image");
        let uploaded = self
            .media
            .upload_media(&key, body.to_vec(), Some(&content_type), metadata)
            .await?;

        Ok(ImageResult {
            id: task_id.to_string(),
            prompt: request.prompt.clone(),
            model: request.model,
            url: uploaded.url,
            created_at: Utc::now(),
        })
    }

    /// Raw `result` object of a Flux task, if the task has one
    pub async fn fetch_image_metadata(&self, task_id: &str) -> Result<Option<Value>, AiError> {
        let (_, data) = self.check_generation_status(task_id).await?;
        Ok(data.get("result").filter(|r| !r.is_null()).cloned())
    }

    // ---- OpenAI text generation ----

    fn chat_body(&self, system: String, user: &str, stream: bool) -> Value {
        json!({
            "model": self.config.draft_model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "PostContent",
                    "strict": true,
                    "schema": self.prompts.schema,
                },
            },
            "max_completion_tokens": MAX_COMPLETION_TOKENS,
            "temperature": TEMPERATURE,
            "stream": stream,
        })
    }

    /// Stream a draft as NDJSON: one parsed document snapshot per delta,
    /// then `{"done": true}`, or `{"error": ...}` if the upstream fails.
    pub fn stream_draft_content(
        &self,
        request: DraftContentRequest,
        tone: Tone,
    ) -> Result<DraftStream, AiError> {
        self.openai_key()?;

        let (tx, rx) = mpsc::channel::<Bytes>(32);
        let generator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = generator.pump_draft(&request, tone, &tx).await {
                warn!(error = %e, "Draft stream failed");
                let _ = tx.send(ndjson_line(&json!({"error": e.to_string()}))).await;
            }
        });

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|line| (line, rx))
        })
        .boxed())
    }

    async fn pump_draft(
        &self,
        request: &DraftContentRequest,
        tone: Tone,
        tx: &mpsc::Sender<Bytes>,
    ) -> Result<(), AiError> {
        let body = self.chat_body(self.prompts.draft.render(tone), &request.prompt, true);
        let response = self
            .client
            .post(self.openai_url("chat/completions"))
            .bearer_auth(self.openai_key()?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let mut chunks = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut draft = DraftAccumulator::default();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            for payload in decoder.push(&chunk) {
                if let Some(snapshot) = draft.apply(&payload)? {
                    if tx.send(ndjson_line(&snapshot)).await.is_err() {
                        debug!("Draft client disconnected");
                        return Ok(());
                    }
                }
            }
        }
        if let Some(payload) = decoder.finish() {
            if let Some(snapshot) = draft.apply(&payload)? {
                let _ = tx.send(ndjson_line(&snapshot)).await;
            }
        }

        if !draft.refusal.is_empty() {
            return Err(AiError::Refusal(draft.refusal));
        }
        debug!(chars = draft.content.len(), "Draft stream complete");
        let _ = tx.send(ndjson_line(&json!({"done": true}))).await;
        Ok(())
    }

    /// Generate a short preview document in one request
    pub async fn generate_sandbox_content(
        &self,
        request: &DraftContentRequest,
        tone: Tone,
    ) -> Result<Value, AiError> {
        let body = self.chat_body(self.prompts.sandbox.render(tone), &request.prompt, false);
        let response = self
            .client
            .post(self.openai_url("chat/completions"))
            .bearer_auth(self.openai_key()?)
            .timeout(self.request_timeout())
            .json(&body)
            .send()
            .await?;
        let data = json_or_upstream_error(response).await?;

        let message = data
            .pointer("/choices/0/message")
            .ok_or_else(|| AiError::InvalidResponse("no choices".to_string()))?;
        if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
            return Err(AiError::Refusal(refusal.to_string()));
        }
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| AiError::InvalidResponse("empty message".to_string()))?;
        serde_json::from_str(content).map_err(|e| AiError::InvalidResponse(e.to_string()))
    }

    pub async fn moderate_content(&self, content: &str) -> Result<ModerationResult, AiError> {
        let response = self
            .client
            .post(self.openai_url("moderations"))
            .bearer_auth(self.openai_key()?)
            .timeout(self.request_timeout())
            .json(&json!({
                "model": self.config.moderation_model,
                "input": content,
            }))
            .send()
            .await?;
        let data = json_or_upstream_error(response).await?;

        let result = data
            .pointer("/results/0")
            .cloned()
            .ok_or_else(|| AiError::InvalidResponse("no moderation results".to_string()))?;
        serde_json::from_value(result).map_err(|e| AiError::InvalidResponse(e.to_string()))
    }
}

/// Accumulates streamed chat deltas and yields new document snapshots
#[derive(Debug, Default)]
struct DraftAccumulator {
    content: String,
    refusal: String,
    last: Option<Value>,
}

impl DraftAccumulator {
    fn apply(&mut self, payload: &str) -> Result<Option<Value>, AiError> {
        if payload == DONE_MARKER {
            return Ok(None);
        }
        let event: Value =
            serde_json::from_str(payload).map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        if let Some(err) = event.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(AiError::Upstream { status: 200, body: message });
        }

        let Some(delta) = event.pointer("/choices/0/delta") else {
            return Ok(None);
        };
        if let Some(refusal) = delta.get("refusal").and_then(Value::as_str) {
            self.refusal.push_str(refusal);
        }
        let Some(text) = delta.get("content").and_then(Value::as_str) else {
            return Ok(None);
        };
        self.content.push_str(text);

        let snapshot = match parse_partial(&self.content) {
            Some(value) if value.is_object() => value,
            _ => return Ok(None),
        };
        if self.last.as_ref() == Some(&snapshot) {
            return Ok(None);
        }
        self.last = Some(snapshot.clone());
        Ok(Some(snapshot))
    }
}

fn ndjson_line(value: &Value) -> Bytes {
    let mut line = value.to_string();
    line.push('\n');
    Bytes::from(line)
}

async fn json_or_upstream_error(response: reqwest::Response) -> Result<Value, AiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AiError::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}
