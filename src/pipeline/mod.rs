//! Pipeline stages for image-to-report generation.
//!
//! Each submodule implements one transformation step and can be tested on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ postprocess ──▶ markdown ──▶ docx
//! (path/URL) (data URI) (VLM)   (cleanup)      (blocks)     (Word file)
//! ```
//!
//! 1. [`input`]: read a local image or download one from a URL
//! 2. [`encode`]: sniff the MIME type and base64-wrap the bytes
//! 3. [`llm`]: one multimodal chat-completion call; the only stage with
//!    network I/O
//! 4. [`postprocess`]: undo model artefacts such as an outer Markdown fence
//! 5. [`markdown`]: flatten the reply into headings, paragraphs and list
//!    entries
//! 6. [`docx`]: lay the blocks out as a `.docx` document

pub mod docx;
pub mod encode;
pub mod input;
pub mod llm;
pub mod markdown;
pub mod postprocess;
