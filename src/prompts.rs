//! Prompts and fixed strings for GSR report generation.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing the persona or the default
//!    instructions requires editing exactly one place.
//!
//! 2. **Testability**: unit tests can inspect prompts directly without
//!    spinning up a real VLM.
//!
//! Callers can override both prompts via [`crate::config::ReportConfig`];
//! the constants here are used only when no override is provided.

/// System message establishing the assistant's persona and domain.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a naturopathic practitioner specializing in biometric data interpretation. Your task is to generate clear, detailed, comprehensive and structured reports based on Galvanic Skin Response (GSR) readings.";

/// User instruction sent alongside the image when no prompt is supplied.
pub const DEFAULT_USER_PROMPT: &str = "Extract the data from this image and generate a Galvanic Skin Response (GSR) Health Report with the following. Identify baseline levels and changes in conductance. Point out peaks or significant fluctuations. Correlate variations with possible stress, arousal, or relaxation responses. Comment on symmetry, stability, and response intensity.";

/// Title heading placed at the top of every generated document.
pub const DEFAULT_TITLE: &str = "Generated Report";

/// File name the finished document is offered under.
pub const DOWNLOAD_FILE_NAME: &str = "Image_Report.docx";
