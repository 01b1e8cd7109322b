//! Input boundary: base64 payloads, local paths and URLs.
//!
//! ## Why base64?
//!
//! Tools receive their parameters as a JSON object, and JSON has no byte
//! type. The PDF therefore crosses the tool boundary as a base64 string and
//! is decoded and validated here, once, before PDFium ever sees it. A
//! payload that fails here never reaches the extractor, so callers get a
//! [`FileValidationError`] instead of an opaque PDFium failure.

use crate::config::FileLimits;
use crate::error::FileValidationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The 5-byte header every PDF starts with.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

const EOF_MARKER: &[u8] = b"%%EOF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Base64-encode raw bytes for a tool's `file_data` parameter.
pub fn encode_file_data(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 payload and check size limits.
///
/// Whitespace inside the payload is ignored, as is a leading
/// `data:<mime>;base64,` prefix.
pub fn decode_file_data(data: &str, limits: &FileLimits) -> Result<Vec<u8>, FileValidationError> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = STANDARD.decode(compact.as_bytes()).map_err(|e| {
        warn!("Failed to decode file data: {}", e);
        FileValidationError::Decode {
            reason: e.to_string(),
        }
    })?;

    validate_size(&bytes, limits)?;
    Ok(bytes)
}

/// Reject empty payloads and payloads above `limits.max_file_size`.
pub fn validate_size(bytes: &[u8], limits: &FileLimits) -> Result<(), FileValidationError> {
    if bytes.len() > limits.max_file_size {
        return Err(FileValidationError::TooLarge {
            size: bytes.len(),
            max: limits.max_file_size,
        });
    }
    if bytes.is_empty() {
        return Err(FileValidationError::Empty);
    }
    debug!("File size validated: {} bytes", bytes.len());
    Ok(())
}

/// Require the `%PDF-` header. A missing `%%EOF` trailer only warns: many
/// real-world PDFs are truncated after the last object and still open.
pub fn validate_pdf_signature(bytes: &[u8]) -> Result<(), FileValidationError> {
    if !bytes.starts_with(PDF_SIGNATURE) {
        return Err(FileValidationError::MissingPdfSignature {
            magic: bytes.iter().take(PDF_SIGNATURE.len()).copied().collect(),
        });
    }
    if !contains(bytes, EOF_MARKER) {
        warn!("PDF file may be corrupted: missing EOF marker");
    }
    debug!("PDF signature validated");
    Ok(())
}

/// Decode and fully validate a base64 PDF payload.
pub fn validate_pdf_payload(data: &str, limits: &FileLimits) -> Result<Vec<u8>, FileValidationError> {
    let bytes = decode_file_data(data, limits)?;
    validate_pdf_signature(&bytes)?;
    info!("File validated successfully: {} bytes", bytes.len());
    Ok(bytes)
}

/// Best-effort MIME sniffing from magic bytes.
pub fn detect_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(PDF_SIGNATURE) {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Read raw PDF bytes from a local path or an `http(s)://` URL.
pub async fn load_input(input: &str, timeout: Duration) -> Result<Vec<u8>, FileValidationError> {
    if is_url(input) {
        download_url(input, timeout).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, FileValidationError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| FileValidationError::Read {
        input: path.display().to_string(),
        reason: e.to_string(),
    })?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

async fn download_url(url: &str, timeout: Duration) -> Result<Vec<u8>, FileValidationError> {
    info!("Downloading PDF from: {}", url);
    let read_err = |reason: String| FileValidationError::Read {
        input: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| read_err(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            read_err(format!("download timed out after {timeout:?}"))
        } else {
            read_err(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(read_err(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| read_err(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
