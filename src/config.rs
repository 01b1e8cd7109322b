//! Configuration types for chunking, generation and the pipeline.
//!
//! Every knob lives in a plain struct with documented defaults. The
//! generation client has enough fields to warrant a builder
//! ([`ClientConfig::builder`]); the others are small enough to construct
//! with struct-update syntax over `Default`.

use crate::error::{ApiError, ConfigError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Default Gemini REST endpoint (without the `/models/...` suffix).
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Chunking ─────────────────────────────────────────────────────────────

/// Token thresholds for [`crate::chunking::Chunker`].
///
/// The defaults assume a model with a ~30k-token context window: a 6 000-token
/// chunk leaves room for the prompt template and the generated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Pages above this many tokens are split on paragraph boundaries. Default: 8000.
    pub max_tokens: usize,
    /// Trailing tokens of one chunk carried into the next. Default: 200.
    pub overlap_tokens: usize,
    /// A batch is flushed before it would grow past this size. Default: 6000.
    pub target_tokens: usize,
    /// Smallest chunk worth sending on its own. Default: 1000.
    ///
    /// Informational: reported in logs when a chunk falls under it, but the
    /// chunker never merges or drops chunks because of it.
    pub min_chunk_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            overlap_tokens: 200,
            target_tokens: 6000,
            min_chunk_tokens: 1000,
        }
    }
}

impl ChunkingConfig {
    /// Check the thresholds are mutually consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_tokens == 0 {
            return Err(ConfigError::ZeroTarget);
        }
        if self.target_tokens > self.max_tokens {
            return Err(ConfigError::TargetAboveMax {
                target: self.target_tokens,
                max: self.max_tokens,
            });
        }
        if self.overlap_tokens >= self.target_tokens {
            return Err(ConfigError::OverlapNotBelowTarget {
                overlap: self.overlap_tokens,
                target: self.target_tokens,
            });
        }
        Ok(())
    }
}

// ── Generation client ────────────────────────────────────────────────────

/// Configuration for [`crate::llm::AiClient`].
///
/// Built via [`ClientConfig::builder()`] or [`ClientConfig::default()`].
///
/// # Example
/// ```rust
/// use lecture2md::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .api_key("test-key")
///     .model("gemini-1.5-flash")
///     .max_requests_per_minute(15)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_requests_per_minute, 15);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// API key. `None` means the Gemini backend refuses to start.
    pub api_key: Option<String>,

    /// Model identifier sent with every request. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Base URL of the REST API. Default: [`DEFAULT_API_BASE`].
    pub api_base: String,

    /// Temperature used when a call does not override it. Default: 0.7.
    pub temperature: f32,

    /// Output-token cap used when a call does not override it. Default: 8192.
    pub max_output_tokens: u32,

    /// Admission limit over any trailing 60-second window. Default: 60.
    pub max_requests_per_minute: usize,

    /// Attempts made by `generate_with_retry`. Default: 3.
    pub max_retries: u32,

    /// Base delay after a rate-limit failure, doubled per attempt. Default: 1 s.
    ///
    /// Attempt `n` (0-based) waits `rate_limit_backoff * 2^n`: 1 s → 2 s → 4 s.
    pub rate_limit_backoff: Duration,

    /// Flat delay after any other retryable failure. Default: 1 s.
    pub retry_delay: Duration,

    /// Transport timeout for one generation request. Default: 120 s.
    ///
    /// Must be finite: the pipeline has no timeout of its own, so a hung
    /// request with no transport deadline would stall the whole run.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: 0.7,
            max_output_tokens: 8192,
            max_requests_per_minute: 60,
            max_retries: 3,
            rate_limit_backoff: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_requests_per_minute", &self.max_requests_per_minute)
            .field("max_retries", &self.max_retries)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// The API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn max_requests_per_minute(mut self, n: usize) -> Self {
        self.config.max_requests_per_minute = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn rate_limit_backoff(mut self, d: Duration) -> Self {
        self.config.rate_limit_backoff = d;
        self
    }

    pub fn retry_delay(mut self, d: Duration) -> Self {
        self.config.retry_delay = d;
        self
    }

    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.config.request_timeout = d;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, ApiError> {
        let c = &self.config;
        if c.max_requests_per_minute == 0 {
            return Err(ApiError::failed(
                "Invalid configuration: max_requests_per_minute must be ≥ 1",
            ));
        }
        if c.max_retries == 0 {
            return Err(ApiError::failed(
                "Invalid configuration: max_retries must be ≥ 1",
            ));
        }
        if c.request_timeout.is_zero() {
            return Err(ApiError::failed(
                "Invalid configuration: request_timeout must be > 0",
            ));
        }
        Ok(self.config)
    }
}

// ── File validation ──────────────────────────────────────────────────────

/// Limits applied at the base64 decoding boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLimits {
    /// Maximum decoded size in bytes. Default: 10 MiB.
    pub max_file_size: usize,
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Settings for [`crate::process::DocumentPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of documents whose step results are cached; the
    /// least-recently-used document is evicted past this. A document's own
    /// entries never evict each other. Default: 256.
    pub cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { cache_capacity: 256 }
    }
}
