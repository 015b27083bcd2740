//! OpenAI-compatible HTTP client for image generation and chat rewrites.
//!
//! One [`OpenAiClient`] implements both [`ImageGenerator`] and
//! [`ChatClient`]. Requests carry a bearer token; image downloads go to
//! whatever URL the API returned and are sent without credentials.
//!
//! # Error Classification
//!
//! - HTTP 429, `insufficient_quota`, `billing_hard_limit_reached` → quota (not retried)
//! - `content_policy_violation` or a safety-system message → content policy (not retried)
//! - HTTP 5xx, 408, 409 and dropped connections → transient (retried by the caller)
//! - HTTP 401/403 → connectivity
//! - Any other 4xx → rejection

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{OpenAiConfig, OpenAiSettings};
use crate::error::{CatalogError, Result};
use crate::images::{GeneratedImage, ImageGenerator};
use crate::links::ChatClient;

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    image_model: String,
    image_quality: String,
    chat_model: String,
}

impl OpenAiClient {
    pub fn new(settings: &OpenAiSettings, models: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CatalogError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            image_model: models.image_model.clone(),
            image_quality: models.image_quality.clone(),
            chat_model: models.chat_model.clone(),
        })
    }

    /// Cheap authenticated call used to fail fast on bad credentials.
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| CatalogError::from_transport(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("OpenAI POST {}", url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CatalogError::from_transport(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CatalogError::from_transport(&e))?;
        if !status.is_success() {
            return Err(classify_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| {
            CatalogError::RemoteRejection(format!("unexpected response from {}: {}", path, e))
        })
    }
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiError,
}

#[derive(Deserialize, Default)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Map a non-success response to an error variant.
pub fn classify_error(status: StatusCode, body: &str) -> CatalogError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .message
        .clone()
        .unwrap_or_else(|| body.trim().to_string());
    let detail = format!("{}: {}", status, message);
    let codes = [parsed.error.code.as_deref(), parsed.error.kind.as_deref()];
    let has_code = |wanted: &str| codes.iter().any(|c| *c == Some(wanted));
    let lowered = message.to_lowercase();

    if has_code("content_policy_violation")
        || lowered.contains("content policy")
        || lowered.contains("safety system")
    {
        return CatalogError::ContentPolicy(detail);
    }
    if status == StatusCode::TOO_MANY_REQUESTS
        || has_code("insufficient_quota")
        || has_code("billing_hard_limit_reached")
        || lowered.contains("billing")
        || lowered.contains("quota")
    {
        return CatalogError::RateLimitOrQuota(detail);
    }
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::CONFLICT
    {
        return CatalogError::Transient(detail);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return CatalogError::Connectivity(detail);
    }
    CatalogError::RemoteRejection(detail)
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    n: u32,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str, size: &str) -> Result<GeneratedImage> {
        let request = ImageRequest {
            model: &self.image_model,
            prompt,
            size,
            quality: &self.image_quality,
            n: 1,
            response_format: "url",
        };
        let body = serde_json::to_value(&request)?;
        let response: ImageResponse = self.post_json("/images/generations", &body).await?;
        let image = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::RemoteRejection("image response had no data".to_string()))?;
        let url = image
            .url
            .ok_or_else(|| CatalogError::RemoteRejection("image response had no url".to_string()))?;
        info!("API generated image URL: {}", url);
        if let Some(revised) = &image.revised_prompt {
            debug!("Revised prompt: {}", revised);
        }
        Ok(GeneratedImage {
            url,
            revised_prompt: image.revised_prompt,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::from_transport(&e))?;
        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::Transient(format!("download {}: {}", url, status)));
        }
        if !status.is_success() {
            return Err(CatalogError::RemoteRejection(format!(
                "download {}: {}",
                url, status
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CatalogError::from_transport(&e))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct ModifiedText {
    modified_text: String,
}

/// JSON schema forcing a `{"modified_text": "..."}` reply.
fn modified_text_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "modified_text_response",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {"modified_text": {"type": "string"}},
                "required": ["modified_text"],
                "additionalProperties": false
            }
        }
    })
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn rewrite(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.chat_model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "response_format": modified_text_format(),
        });
        let response: ChatResponse = self.post_json("/chat/completions", &body).await?;
        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| CatalogError::RemoteRejection("chat response had no choices".to_string()))?;
        if let Some(refusal) = message.refusal {
            return Err(CatalogError::ContentPolicy(refusal));
        }
        let content = message
            .content
            .ok_or_else(|| CatalogError::RemoteRejection("chat response had no content".to_string()))?;
        let parsed: ModifiedText = serde_json::from_str(&content).map_err(|e| {
            CatalogError::RemoteRejection(format!("chat reply was not the expected JSON: {}", e))
        })?;
        Ok(parsed.modified_text)
    }
}
