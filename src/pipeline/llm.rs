//! Report Requester: build the multimodal chat request and call the model.
//!
//! A request is two messages: the persona as a system message, then a user
//! message holding the prompt text and the image as a data URI. Exactly one
//! call is made per report. There is no retry: a failed call surfaces as a
//! [`ReportError`] and the caller decides what to show.
//!
//! ## Backends
//!
//! [`CompletionBackend`] is the seam between request construction and
//! transport:
//!
//! * [`OpenAiBackend`] posts the OpenAI chat-completion JSON directly with
//!   reqwest. It sees the real `finish_reason`, so truncation detection is
//!   exact.
//! * [`ProviderBackend`] wraps any `edgequake_llm` provider (Anthropic,
//!   Gemini, Ollama, Azure, …). Those responses carry token counts but no
//!   finish reason, so truncation is inferred from the output token count.

use crate::config::{AppConfig, ReportConfig};
use crate::error::ReportError;
use crate::output::ReportOutput;
use crate::pipeline::encode::ImagePayload;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Finish reason the OpenAI API reports when `max_tokens` was reached.
pub const FINISH_REASON_LENGTH: &str = "length";

// ── Request ──────────────────────────────────────────────────────────────

/// One fully specified report request.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub model: String,
    pub system_prompt: String,
    pub prompt: String,
    pub image: ImagePayload,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
}

impl ReportRequest {
    /// Take model, prompts and limits from `config`.
    pub fn new(config: &ReportConfig, image: ImagePayload) -> Self {
        Self {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            prompt: config.prompt.clone(),
            image,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// The OpenAI chat-completion request body for this request.
    pub fn to_wire(&self) -> ChatRequestBody {
        ChatRequestBody {
            model: self.model.clone(),
            messages: vec![
                WireMessage {
                    role: "system",
                    content: WireContent::Text(self.system_prompt.clone()),
                },
                WireMessage {
                    role: "user",
                    content: WireContent::Parts(vec![
                        ContentPart::Text {
                            text: self.prompt.clone(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: self.image.data_uri(),
                            },
                        },
                    ]),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// [`Self::to_wire`] as a JSON value (for `--dry-run` and inspection).
    pub fn to_chat_payload(&self) -> Result<serde_json::Value, ReportError> {
        serde_json::to_value(self.to_wire())
            .map_err(|e| ReportError::Internal(format!("serialise request: {e}")))
    }
}

/// Body of `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatRequestBody {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: WireContent,
}

/// A message body is either a bare string or a list of typed parts.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

// ── Response ─────────────────────────────────────────────────────────────

/// Text and accounting returned by a backend.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl ChatResponse {
    /// Keep the first choice; everything else is discarded.
    fn into_completion(self, model: &str) -> Result<Completion, ReportError> {
        let malformed = |detail: &str| ReportError::MalformedResponse {
            model: model.to_string(),
            detail: detail.to_string(),
        };

        let (input_tokens, output_tokens) = self
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| malformed("response contained no choices"))?;
        let text = choice
            .message
            .content
            .ok_or_else(|| malformed("first choice has no text content"))?;

        Ok(Completion {
            text,
            input_tokens,
            output_tokens,
            finish_reason: choice.finish_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Pull `error.message` out of an OpenAI error body, else the raw text.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.len() > 200 => format!("{}…", body.chars().take(200).collect::<String>()),
        Err(_) => body.to_string(),
    }
}

// ── Backends ─────────────────────────────────────────────────────────────

/// Something that can turn a [`ReportRequest`] into a [`Completion`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label used in logs and [`ReportOutput::backend`].
    fn name(&self) -> &str;

    /// Send the request once and return the first completion.
    async fn complete(&self, request: &ReportRequest) -> Result<Completion, ReportError>;
}

/// Direct client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiBackend {
    /// Build a client from startup configuration.
    pub fn new(app: &AppConfig) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ReportError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: app.api_key.clone(),
            endpoint: format!("{}/chat/completions", app.base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &ReportRequest) -> Result<Completion, ReportError> {
        let body = request.to_wire();
        debug!("POST {} (model {})", self.endpoint, request.model);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReportError::RequestFailed {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let detail = api_error_message(&response.text().await.unwrap_or_default());

            return Err(match status.as_u16() {
                401 | 403 => ReportError::AuthError {
                    provider: self.name().to_string(),
                    detail,
                },
                429 => ReportError::RateLimited {
                    provider: self.name().to_string(),
                    retry_after_secs,
                },
                _ => ReportError::RequestFailed {
                    message: format!("HTTP {status}: {detail}"),
                },
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ReportError::MalformedResponse {
                    model: request.model.clone(),
                    detail: e.to_string(),
                })?;
        parsed.into_completion(&request.model)
    }
}

/// Adapter over any `edgequake_llm` provider.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Construct a named provider; the factory reads that provider's API key.
    pub fn from_factory(provider_name: &str, model: &str) -> Result<Self, ReportError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            ReportError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, provider_name))
    }
}

#[async_trait]
impl CompletionBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: &ReportRequest) -> Result<Completion, ReportError> {
        let messages = vec![
            ChatMessage::system(request.system_prompt.as_str()),
            ChatMessage::user_with_images(
                request.prompt.as_str(),
                vec![request.image.to_image_data()],
            ),
        ];
        let options = CompletionOptions {
            temperature: request.temperature,
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ReportError::RequestFailed {
                message: format!("{e}"),
            })?;

        Ok(Completion {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
            finish_reason: None,
        })
    }
}

// ── Requester ────────────────────────────────────────────────────────────

/// Send `request` through `backend` exactly once.
///
/// # Errors
/// Any backend error, or [`ReportError::RequestTimeout`] after
/// `timeout_secs`.
pub async fn request_report(
    backend: &dyn CompletionBackend,
    request: &ReportRequest,
    timeout_secs: u64,
) -> Result<ReportOutput, ReportError> {
    if request.model.trim().is_empty() {
        return Err(ReportError::InvalidConfig(
            "Model identifier must not be empty".into(),
        ));
    }

    let start = Instant::now();
    info!(
        "Requesting report from {} (model {}, {} image bytes)",
        backend.name(),
        request.model,
        request.image.len()
    );

    let completion = timeout(Duration::from_secs(timeout_secs), backend.complete(request))
        .await
        .map_err(|_| ReportError::RequestTimeout { secs: timeout_secs })??;

    let duration_ms = start.elapsed().as_millis() as u64;
    let truncated = is_truncated(&completion, request.max_tokens);
    if truncated {
        warn!(
            "Report hit the {}-token ceiling and was cut off; raise max_tokens for a complete report",
            request.max_tokens
        );
    }
    debug!(
        "{} input tokens, {} output tokens, {}ms",
        completion.input_tokens, completion.output_tokens, duration_ms
    );

    Ok(ReportOutput {
        markdown: completion.text,
        model: request.model.clone(),
        backend: backend.name().to_string(),
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
        duration_ms,
        finish_reason: completion.finish_reason,
        truncated,
    })
}

/// A reported finish reason is authoritative; otherwise compare token counts.
fn is_truncated(completion: &Completion, max_tokens: usize) -> bool {
    match completion.finish_reason.as_deref() {
        Some(reason) => reason == FINISH_REASON_LENGTH,
        None => completion.output_tokens >= max_tokens as u64,
    }
}
