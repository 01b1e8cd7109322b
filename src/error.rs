//! Error types for the lecture2md library.
//!
//! Each failure family gets its own enum so callers can match on exactly the
//! layer that failed:
//!
//! * [`FileValidationError`]: the payload never made it past decoding
//!   (bad base64, empty, oversized, not a PDF). Never retried.
//! * [`PdfProcessingError`]: PDFium could not open or read the document.
//!   Individual page failures are absorbed by the extractor; only whole-document
//!   failures surface here.
//! * [`ConfigError`]: chunking thresholds that contradict each other.
//! * [`ApiError`]: the text-generation call failed. The variant decides how
//!   [`crate::llm::AiClient::generate_with_retry`] reacts.
//! * [`ToolError`]: what a tool invocation returns; wraps the three above plus
//!   caller-input problems.
//! * [`PipelineError`]: a [`ToolError`] together with the step trace built up
//!   to the point of failure.

use crate::output::PipelineStep;
use thiserror::Error;

/// Rejected input payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FileValidationError {
    /// The string was not valid base64.
    #[error("Failed to decode file data: {reason}")]
    Decode { reason: String },

    /// Decoded payload has zero bytes.
    #[error("File is empty")]
    Empty,

    /// Decoded payload exceeds the configured limit.
    #[error("File size ({size} bytes) exceeds maximum allowed size ({max} bytes)")]
    TooLarge { size: usize, max: usize },

    /// Decoded payload does not start with `%PDF-`.
    #[error("Invalid PDF file: missing PDF signature (first bytes: {magic:?})")]
    MissingPdfSignature { magic: Vec<u8> },

    /// A local path or URL could not be read.
    #[error("Failed to read input '{input}': {reason}")]
    Read { input: String, reason: String },
}

/// Whole-document extraction failure at the PDF boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PdfProcessingError {
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    Binding(String),

    /// PDF header/trailer/xref is corrupt or the document is encrypted.
    #[error("Failed to open PDF: {0}")]
    Open(String),

    /// Document opened but its metadata could not be read.
    #[error("Failed to extract PDF metadata: {0}")]
    Metadata(String),

    /// The blocking extraction task panicked or was cancelled.
    #[error("PDF extraction task failed: {0}")]
    Task(String),
}

/// Inconsistent [`crate::config::ChunkingConfig`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target_tokens must be at least 1")]
    ZeroTarget,

    #[error("target_tokens ({target}) must not exceed max_tokens ({max})")]
    TargetAboveMax { target: usize, max: usize },

    #[error("overlap_tokens ({overlap}) must be smaller than target_tokens ({target})")]
    OverlapNotBelowTarget { overlap: usize, target: usize },
}

/// Failure of a text-generation call.
///
/// Mirrors a three-level hierarchy: every variant is an API error, and two of
/// them carry extra meaning for the retry loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Quota or request-rate exhaustion (HTTP 429 and friends). Retried with
    /// exponential backoff.
    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    /// Missing or rejected credentials (HTTP 401/403). Not retried.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Any other generation failure. Retried after a flat delay.
    #[error("Generation failed: {message}")]
    Failed { message: String },
}

impl ApiError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Error returned by a tool invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error(transparent)]
    FileValidation(#[from] FileValidationError),

    #[error(transparent)]
    PdfProcessing(#[from] PdfProcessingError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// One or more required parameters were absent.
    #[error("Missing required parameters: {}", .names.join(", "))]
    MissingParameters { names: Vec<String> },

    /// A parameter was present but had the wrong shape.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// No tool is registered under this name.
    #[error("Tool '{name}' not found")]
    ToolNotFound { name: String },

    /// A tool produced a payload the caller could not interpret.
    #[error("Unexpected result from tool '{tool}': {reason}")]
    UnexpectedResult { tool: String, reason: String },
}

impl ToolError {
    /// `true` for errors caused by caller input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::FileValidation(_)
                | Self::MissingParameters { .. }
                | Self::InvalidParameter { .. }
                | Self::ToolNotFound { .. }
        )
    }
}

/// A pipeline run aborted. `steps` holds the trace up to and including the
/// failed step, which is marked [`crate::output::StepStatus::Failed`].
#[derive(Debug, Error)]
#[error("Pipeline failed at step '{failed_step}': {source}")]
pub struct PipelineError {
    pub failed_step: String,
    pub steps: Vec<PipelineStep>,
    #[source]
    pub source: ToolError,
}

/// Failure while writing pipeline output to disk.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
