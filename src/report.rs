//! End-to-end report entry points.
//!
//! Order of work is fixed: the backend (and with it the credential) is
//! resolved first, then the image is read, then the single completion call
//! is made. A document is only built from a reply that actually arrived.
//!
//! Nothing here reads the environment. The OpenAI credential arrives through
//! the [`AppConfig`](crate::config::AppConfig) held by [`ReportConfig`].

use crate::config::{ReportConfig, API_KEY_VAR};
use crate::error::ReportError;
use crate::output::{ReportArtifacts, ReportOutput};
use crate::pipeline::encode::ImagePayload;
use crate::pipeline::input;
use crate::pipeline::llm::{
    request_report, CompletionBackend, OpenAiBackend, ProviderBackend, ReportRequest,
};
use std::sync::Arc;
use tracing::info;

pub use crate::pipeline::docx::build_document;

/// Resolve the completion backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend`) is used as-is. Tests and
///    callers with custom middleware go through here.
/// 2. **Named provider** (`config.provider_name` other than `openai`) is
///    built by [`edgequake_llm::ProviderFactory`], which reads that
///    provider's own API key.
/// 3. **OpenAI** otherwise, using `config.app`. Without it this fails with
///    [`ReportError::MissingCredential`].
pub fn resolve_backend(config: &ReportConfig) -> Result<Arc<dyn CompletionBackend>, ReportError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if !config.uses_openai() {
        if let Some(ref name) = config.provider_name {
            return Ok(Arc::new(ProviderBackend::from_factory(name, &config.model)?));
        }
    }

    let app = config
        .app
        .as_ref()
        .ok_or_else(|| ReportError::MissingCredential {
            var: API_KEY_VAR.to_string(),
        })?;
    Ok(Arc::new(OpenAiBackend::new(app)?))
}

/// Generate a report for an image path or URL.
///
/// # Errors
/// Configuration errors come first, before the image is touched; then
/// input errors; then the request errors of [`request_report`].
pub async fn generate_report(
    image_input: impl AsRef<str>,
    config: &ReportConfig,
) -> Result<ReportOutput, ReportError> {
    let backend = resolve_backend(config)?;
    let image = input::resolve_image(image_input.as_ref(), config.download_timeout_secs).await?;
    generate_report_with(backend.as_ref(), image, config).await
}

/// Generate a report for an image already in memory.
pub async fn generate_report_with(
    backend: &dyn CompletionBackend,
    image: ImagePayload,
    config: &ReportConfig,
) -> Result<ReportOutput, ReportError> {
    let request = ReportRequest::new(config, image);
    request_report(backend, &request, config.api_timeout_secs).await
}

/// Generate a report and convert it into a `.docx` document.
///
/// When the request fails no document is written.
pub async fn generate_and_build(
    image_input: impl AsRef<str>,
    config: &ReportConfig,
) -> Result<ReportArtifacts, ReportError> {
    let report = generate_report(image_input, config).await?;
    let document = build_document(&report.markdown, &config.title)?;
    info!(
        "Report ready: {} ({} output tokens)",
        document.path.display(),
        report.output_tokens
    );
    Ok(ReportArtifacts { report, document })
}

/// Synchronous wrapper around [`generate_report`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_report_sync(
    image_input: impl AsRef<str>,
    config: &ReportConfig,
) -> Result<ReportOutput, ReportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_report(image_input, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::pipeline::llm::Completion;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned backend that records how often it was called.
    struct MockBackend {
        reply: Result<Completion, String>,
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(Completion {
                    text: text.to_string(),
                    input_tokens: 900,
                    output_tokens: 42,
                    finish_reason: Some("stop".into()),
                }),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err("connection reset".into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, _request: &ReportRequest) -> Result<Completion, ReportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(c) => Ok(c.clone()),
                Err(message) => Err(ReportError::RequestFailed {
                    message: message.clone(),
                }),
            }
        }
    }

    fn png_file(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("scan.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();
        path.to_string_lossy().to_string()
    }

    fn config_with(backend: Arc<dyn CompletionBackend>) -> ReportConfig {
        ReportConfig::builder().backend(backend).build().unwrap()
    }

    #[tokio::test]
    async fn prebuilt_backend_is_used() {
        let mock = Arc::new(MockBackend::replying("# GSR\n\nCalm."));
        let config = config_with(mock.clone());
        let resolved = resolve_backend(&config).unwrap();
        assert_eq!(resolved.name(), "mock");
    }

    #[test]
    fn openai_without_app_config_is_missing_credential() {
        let err = resolve_backend(&ReportConfig::default()).err().unwrap();
        assert!(matches!(err, ReportError::MissingCredential { ref var } if var == API_KEY_VAR));
        assert!(err.is_fatal_config());
    }

    #[test]
    fn openai_backend_built_from_app_config() {
        let app =
            AppConfig::from_lookup(|key| (key == API_KEY_VAR).then(|| "sk-test".into())).unwrap();
        let config = ReportConfig::from_app(&app).build().unwrap();
        assert_eq!(resolve_backend(&config).unwrap().name(), "openai");
    }

    #[tokio::test]
    async fn default_model_reaches_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = AppConfig::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "DEFAULT_MODEL" => Some("gpt-4o-mini".into()),
            _ => None,
        })
        .unwrap();
        let mock = Arc::new(MockBackend::replying("ok"));
        let config = ReportConfig::from_app(&app).backend(mock).build().unwrap();

        let out = generate_report(png_file(&dir), &config).await.unwrap();
        assert_eq!(out.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn report_from_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::replying("# GSR\n\nCalm."));
        let config = config_with(mock.clone());

        let out = generate_report(png_file(&dir), &config).await.unwrap();
        assert_eq!(out.markdown, "# GSR\n\nCalm.");
        assert_eq!(out.backend, "mock");
        assert_eq!(out.output_tokens, 42);
        assert!(!out.truncated);
        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn end_to_end_builds_document() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::replying(
            "## Baseline\n\nStable.\n\n- low arousal\n- steady\n",
        ));
        let config = config_with(mock);

        let artifacts = generate_and_build(png_file(&dir), &config).await.unwrap();
        assert!(artifacts.document.path.exists());
        assert_eq!(artifacts.document.summary.headings, 2);
        assert_eq!(artifacts.document.summary.paragraphs, 1);
        assert_eq!(artifacts.document.summary.bullet_items, 2);
        std::fs::remove_file(&artifacts.document.path).ok();
    }

    #[tokio::test]
    async fn failed_request_builds_no_document() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::failing());
        let config = config_with(mock.clone());

        let err = generate_and_build(png_file(&dir), &config).await.unwrap_err();
        assert!(matches!(err, ReportError::RequestFailed { .. }));
        assert_eq!(err.to_string(), "Error generating report: connection reset");
        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bad_image_never_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not an image").unwrap();
        let mock = Arc::new(MockBackend::replying("unused"));
        let config = config_with(mock.clone());

        let err = generate_report(path.to_string_lossy(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::UnsupportedImage { .. }));
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn in_memory_payload() {
        let mock = MockBackend::replying("ok");
        let config = ReportConfig::default();
        let image = ImagePayload::from_bytes(b"\x89PNG\r\n\x1a\nrest".to_vec(), None).unwrap();
        let out = generate_report_with(&mock, image, &config).await.unwrap();
        assert_eq!(out.markdown, "ok");
        assert_eq!(out.model, "gpt-4o");
    }
}
