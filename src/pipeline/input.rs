//! Input resolution: turn a user-supplied path or URL into an [`ImagePayload`].
//!
//! Only PNG and JPEG uploads are accepted. Local files are filtered by
//! extension first (cheap, gives a clear message for `report.pdf`), then
//! every input is checked with the `image` crate so a truncated or renamed
//! file fails here rather than as an opaque 400 from the model API.

use crate::error::ReportError;
use crate::pipeline::encode::ImagePayload;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extensions accepted for local uploads (compared case-insensitively).
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an image payload.
///
/// URLs are downloaded into memory; local paths are read from disk.
pub async fn resolve_image(input: &str, timeout_secs: u64) -> Result<ImagePayload, ReportError> {
    let (bytes, name) = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };

    if bytes.is_empty() {
        return Err(ReportError::EmptyImage);
    }
    let (width, height) = read_dimensions(input, &bytes)?;

    let payload = ImagePayload::from_bytes(bytes, Some(&name))?;
    info!(
        "Loaded image '{}': {}x{} px, {} bytes, {}",
        name,
        width,
        height,
        payload.len(),
        payload.mime_type()
    );
    Ok(payload)
}

/// True when `path` carries one of [`ACCEPTED_EXTENSIONS`].
pub fn has_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ACCEPTED_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Read a local image, validating extension, existence and permissions.
async fn read_local(path_str: &str) -> Result<(Vec<u8>, String), ReportError> {
    let path = PathBuf::from(path_str);

    if !has_accepted_extension(&path) {
        return Err(ReportError::UnsupportedImage {
            input: path_str.to_string(),
            reason: "file extension is not png, jpg or jpeg".into(),
        });
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ReportError::PermissionDenied { path });
        }
        Err(_) => return Err(ReportError::ImageNotFound { path }),
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());

    debug!("Read local image: {}", path.display());
    Ok((bytes, name))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<(Vec<u8>, String), ReportError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ReportError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ReportError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ReportError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ReportError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ReportError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    Ok((bytes.to_vec(), filename_from_url(url)))
}

/// Last path segment of the URL, or a generic name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded-image".to_string()
}

/// Read the image header; rejects anything the `image` crate cannot identify.
fn read_dimensions(input: &str, bytes: &[u8]) -> Result<(u32, u32), ReportError> {
    let unsupported = |reason: String| ReportError::UnsupportedImage {
        input: input.to_string(),
        reason,
    };

    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| unsupported(e.to_string()))?
        .into_dimensions()
        .map_err(|e| unsupported(e.to_string()))
}
