//! Result types returned by the report pipeline.

use crate::pipeline::markdown::SkippedElements;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The model's reply to one report request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutput {
    /// Markdown text of the first completion choice, unmodified.
    pub markdown: String,
    /// Model identifier the request was sent with.
    pub model: String,
    /// Backend that served the request ("openai", "anthropic", …).
    pub backend: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Wall-clock time of the completion call.
    pub duration_ms: u64,
    /// Finish reason reported by the service, when it reports one.
    pub finish_reason: Option<String>,
    /// The reply hit the `max_tokens` ceiling and was cut off.
    pub truncated: bool,
}

/// What ended up in a generated document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Heading count, including the title heading.
    pub headings: usize,
    pub paragraphs: usize,
    pub bullet_items: usize,
    pub numbered_items: usize,
    /// Markdown elements that have no document counterpart.
    pub skipped: SkippedElements,
}

/// A document written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutput {
    /// Location of the `.docx` file. The file outlives this struct.
    pub path: PathBuf,
    pub summary: DocumentSummary,
}

/// Everything produced by one end-to-end run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArtifacts {
    pub report: ReportOutput,
    pub document: DocumentOutput,
}
