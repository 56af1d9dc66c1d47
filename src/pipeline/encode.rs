//! Image encoding: raw upload bytes → base64 payload and data URI.
//!
//! VLM APIs accept images as base64 data-URIs embedded in the JSON request
//! body. The MIME type in that URI must describe the bytes actually sent, so
//! it is sniffed from the content first and only then guessed from the file
//! extension. A JPEG announced as `image/png` is decoded by most services
//! anyway, but some reject it outright.

use crate::error::ReportError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::fmt;
use tracing::debug;

/// MIME type used when neither content nor file name identify the image.
pub const FALLBACK_MIME: &str = "image/png";

/// An uploaded image ready to be attached to a completion request.
#[derive(Clone)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    mime_type: String,
}

impl ImagePayload {
    /// Wrap bytes with an explicit MIME type.
    ///
    /// # Errors
    /// [`ReportError::EmptyImage`] when `bytes` is empty.
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Result<Self, ReportError> {
        if bytes.is_empty() {
            return Err(ReportError::EmptyImage);
        }
        Ok(Self {
            bytes,
            mime_type: mime_type.into(),
        })
    }

    /// Wrap bytes, detecting the MIME type from content and `file_name`.
    pub fn from_bytes(bytes: Vec<u8>, file_name: Option<&str>) -> Result<Self, ReportError> {
        let mime = detect_mime(&bytes, file_name);
        Self::new(bytes, mime)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Standard (padded) base64 of the raw bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        let b64 = self.to_base64();
        debug!("Encoded image → {} bytes base64 ({})", b64.len(), self.mime_type);
        format!("data:{};base64,{}", self.mime_type, b64)
    }

    /// Convert into the attachment type used by `edgequake-llm` providers.
    ///
    /// `detail: "high"` lets GPT-4-class models tile the image at full
    /// resolution; chart axes and small annotations are lost otherwise.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.to_base64(), self.mime_type.as_str()).with_detail("high")
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Determine the MIME type of an image.
///
/// Order: magic bytes, then the file extension, then [`FALLBACK_MIME`].
pub fn detect_mime(bytes: &[u8], file_name: Option<&str>) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }

    file_name
        .and_then(|name| mime_guess::from_path(name).first())
        .map(|m| m.essence_str().to_string())
        .filter(|m| m.starts_with("image/"))
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}
