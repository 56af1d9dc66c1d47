//! # edgequake-img2report
//!
//! Turn a Galvanic Skin Response (GSR) chart image into a structured Word
//! report using Vision Language Models (VLMs).
//!
//! The image goes to a multimodal chat model together with a fixed
//! practitioner persona and report instructions. The Markdown it writes back
//! is flattened to headings, paragraphs and list entries and laid out as a
//! `.docx` document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image (png/jpg)
//!  │
//!  ├─ 1. Input    read local file or download from URL
//!  ├─ 2. Encode   sniff MIME type, base64 → data URI
//!  ├─ 3. VLM      one chat completion (system persona + prompt + image)
//!  ├─ 4. Polish   strip outer fences, normalise line endings
//!  ├─ 5. Parse    Markdown → headings 1–3, paragraphs, list entries
//!  └─ 6. Build    .docx with a title heading, kept in the temp dir
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_img2report::{generate_and_build, AppConfig, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OPENAI_API_KEY, plus DEFAULT_MODEL and OPENAI_BASE_URL if set.
//!     let app = AppConfig::from_env()?;
//!     let config = ReportConfig::from_app(&app).title("GSR Session 12").build()?;
//!     let artifacts = generate_and_build("gsr_chart.png", &config).await?;
//!     println!("{}", artifacts.report.markdown);
//!     eprintln!("document: {}", artifacts.document.path.display());
//!     Ok(())
//! }
//! ```
//!
//! Converting an existing report needs no model at all:
//!
//! ```rust,no_run
//! let doc = edgequake_img2report::build_document("# Findings\n\n- calm", "Generated Report")?;
//! # Ok::<(), edgequake_img2report::ReportError>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `img2report` binary (clap + anyhow + tracing-subscriber + indicatif + dotenv) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-img2report = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod report;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AppConfig, ReportConfig, ReportConfigBuilder};
pub use error::ReportError;
pub use output::{DocumentOutput, DocumentSummary, ReportArtifacts, ReportOutput};
pub use pipeline::encode::ImagePayload;
pub use pipeline::llm::{CompletionBackend, OpenAiBackend, ProviderBackend, ReportRequest};
pub use pipeline::markdown::SkippedElements;
pub use report::{
    build_document, generate_and_build, generate_report, generate_report_sync,
    generate_report_with, resolve_backend,
};
