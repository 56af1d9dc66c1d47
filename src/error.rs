//! Error types for the edgequake-img2report library.
//!
//! A single [`ReportError`] covers every failure the library can surface.
//! The variants fall into four groups that mirror the life of one report:
//!
//! * **Configuration**: missing credential, unknown provider, bad builder
//!   input. These are raised at startup, before any image is read, and the
//!   binary treats them as fatal (see [`ReportError::is_fatal_config`]).
//! * **Input**: the image could not be found, read, downloaded or is not a
//!   PNG/JPEG.
//! * **Request**: the remote completion call failed. Nothing is retried;
//!   the message is shown to the user as-is.
//! * **Output**: the `.docx` could not be written.
//!
//! Markdown conversion has no error variant: unknown elements are skipped
//! and counted, never rejected.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-img2report library.
#[derive(Debug, Error)]
pub enum ReportError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// A required credential is not set in the environment or `.env` file.
    #[error("No API key found. Please set {var} in your environment or .env file.")]
    MissingCredential { var: String },

    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Image file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input is not a PNG or JPEG image.
    #[error("Unsupported image '{input}': {reason}\nAccepted formats: png, jpg, jpeg.")]
    UnsupportedImage { input: String, reason: String },

    /// The image contains no bytes.
    #[error("Image is empty; nothing to send to the model")]
    EmptyImage,

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Request errors ────────────────────────────────────────────────────
    /// The completion endpoint returned an error or could not be reached.
    #[error("Error generating report: {message}")]
    RequestFailed { message: String },

    /// The endpoint rejected the credential (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The endpoint returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// The completion call did not finish in time.
    #[error("Report request timed out after {secs}s\nIncrease --api-timeout.")]
    RequestTimeout { secs: u64 },

    /// The response had no choices, or the first choice carried no text.
    #[error("Malformed response from model '{model}': {detail}")]
    MalformedResponse { model: String, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write document '{path}': {source}")]
    DocumentWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReportError {
    /// True for errors that must stop the program before any interaction.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            ReportError::MissingCredential { .. }
                | ReportError::ProviderNotConfigured { .. }
                | ReportError::InvalidConfig(_)
        )
    }
}
