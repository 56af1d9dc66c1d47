//! Configuration types for report generation.
//!
//! Two structs, two lifetimes:
//!
//! * [`AppConfig`]: read once from the environment at startup (credential,
//!   default model, endpoint). Immutable afterwards and passed by reference
//!   to whatever constructs the backend; nothing reads the environment
//!   behind its back later on.
//! * [`ReportConfig`]: the per-report knobs (model, prompts, token ceiling,
//!   timeouts), built via [`ReportConfigBuilder`] so callers set only what
//!   they care about.

use crate::error::ReportError;
use crate::pipeline::llm::CompletionBackend;
use crate::prompts::{DEFAULT_SYSTEM_PROMPT, DEFAULT_TITLE, DEFAULT_USER_PROMPT};
use std::fmt;
use std::sync::Arc;

/// Environment variable holding the OpenAI credential.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
/// Environment variable naming the default model.
pub const DEFAULT_MODEL_VAR: &str = "DEFAULT_MODEL";
/// Environment variable overriding the OpenAI-compatible endpoint.
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";

/// Model used when neither the caller nor `DEFAULT_MODEL` names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";
/// Public OpenAI API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ── Startup configuration ────────────────────────────────────────────────

/// Process-wide settings loaded once from the environment.
#[derive(Clone)]
pub struct AppConfig {
    /// Bearer credential for the completion endpoint.
    pub api_key: String,
    /// Model preselected when the user does not choose one.
    pub default_model: String,
    /// API root, without the trailing `/chat/completions`.
    pub base_url: String,
}

impl AppConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    /// [`ReportError::MissingCredential`] when `OPENAI_API_KEY` is unset or
    /// blank.
    pub fn from_env() -> Result<Self, ReportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_blank(API_KEY_VAR).ok_or_else(|| ReportError::MissingCredential {
            var: API_KEY_VAR.to_string(),
        })?;

        Ok(Self {
            api_key: api_key.trim().to_string(),
            default_model: non_blank(DEFAULT_MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: non_blank(BASE_URL_VAR)
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("default_model", &self.default_model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ── Per-report configuration ─────────────────────────────────────────────

/// Configuration for one image-to-report run.
///
/// # Example
/// ```rust
/// use edgequake_img2report::ReportConfig;
///
/// let config = ReportConfig::builder()
///     .model("gpt-4o-mini")
///     .max_tokens(2000)
///     .title("GSR Session 12")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ReportConfig {
    /// Model identifier sent with the request. Default: `gpt-4o`, or the
    /// startup `DEFAULT_MODEL` when built with [`ReportConfig::from_app`].
    pub model: String,

    /// Startup configuration for the direct OpenAI backend.
    pub app: Option<AppConfig>,

    /// Provider name for non-OpenAI backends ("anthropic", "gemini", "ollama", …).
    /// `None` or `"openai"` selects the direct OpenAI backend.
    pub provider_name: Option<String>,

    /// Pre-constructed backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn CompletionBackend>>,

    /// System message. Default: the GSR practitioner persona.
    pub system_prompt: String,

    /// User instruction sent with the image.
    pub prompt: String,

    /// Title heading of the generated document. Default: "Generated Report".
    pub title: String,

    /// Maximum tokens the model may generate. Default: 1200.
    ///
    /// Replies longer than this are cut mid-sentence by the service. The cut
    /// is detected and reported through `ReportOutput::truncated`.
    pub max_tokens: usize,

    /// Sampling temperature. `None` keeps the service default.
    pub temperature: Option<f32>,

    /// Completion call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL image inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            app: None,
            provider_name: None,
            backend: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt: DEFAULT_USER_PROMPT.to_string(),
            title: DEFAULT_TITLE.to_string(),
            max_tokens: 1200,
            temperature: None,
            api_timeout_secs: 120,
            download_timeout_secs: 60,
        }
    }
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("model", &self.model)
            .field("app", &self.app)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("prompt_len", &self.prompt.len())
            .field("title", &self.title)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ReportConfig {
    /// Create a new builder for `ReportConfig`.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder {
            config: Self::default(),
        }
    }

    /// Builder seeded from startup configuration: the model defaults to
    /// `app.default_model` and the OpenAI backend uses `app`'s credential.
    pub fn from_app(app: &AppConfig) -> ReportConfigBuilder {
        Self::builder().model(app.default_model.as_str()).app(app.clone())
    }

    /// True when requests should go straight to the OpenAI endpoint.
    pub fn uses_openai(&self) -> bool {
        self.provider_name
            .as_deref()
            .map_or(true, |p| p.eq_ignore_ascii_case("openai"))
    }
}

/// Builder for [`ReportConfig`].
#[derive(Debug)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn app(mut self, app: AppConfig) -> Self {
        self.config.app = Some(app);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReportConfig, ReportError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ReportError::InvalidConfig("Model identifier must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(ReportError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ReportError::InvalidConfig("API timeout must be ≥ 1 second".into()));
        }
        Ok(self.config)
    }
}
