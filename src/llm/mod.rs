//! Rate-limited, retrying text-generation client.
//!
//! [`AiClient`] owns three things: a [`ClientConfig`], a [`RateLimiter`] and a
//! [`GenerationBackend`] that performs exactly one network call. Everything
//! that is not "send this prompt once" (admission control, response
//! validation, error classification, retries) lives here so every backend
//! behaves the same way.
//!
//! ## Per-call state machine
//!
//! ```text
//! idle → rate-limited wait → in flight ─┬─ success
//!                  ▲                    ├─ RateLimited / Failed ─┐
//!                  └──── backoff sleep ◄┘                        │
//!                                       └─ Auth (fatal) ◄── or attempts exhausted
//! ```
//!
//! ## Retry Strategy
//!
//! Rate-limit failures back off exponentially (`rate_limit_backoff * 2^attempt`,
//! 1 s → 2 s → 4 s with defaults); other failures wait a flat `retry_delay`.
//! Nothing sleeps after the final attempt. Authentication failures fail fast:
//! a wrong key does not start working after a backoff.

pub mod gemini;
pub mod provider;
mod rate_limit;

pub use gemini::GeminiBackend;
pub use provider::ProviderBackend;
pub use rate_limit::RateLimiter;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::output::GenerationResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

// ── Backend seam ─────────────────────────────────────────────────────────

/// One generation request as handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// One candidate answer in a backend response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    /// Text parts in order; non-text parts are dropped by the backend.
    pub parts: Vec<String>,
    pub finish_reason: Option<String>,
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Backend-reported total; derived from the other two when absent.
    pub total_tokens: Option<u64>,
}

/// Unvalidated backend response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub candidates: Vec<Candidate>,
    pub usage: Option<Usage>,
}

/// Failure reported by a backend, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub message: String,
    /// HTTP status, when the failure came from an HTTP response.
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

/// A single external text-generation call.
///
/// Implementations must not retry or rate-limit: [`AiClient`] does both.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, BackendError>;
}

// ── Error classification ─────────────────────────────────────────────────

const RATE_LIMIT_MARKERS: &[&str] = &[
    "quota",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "resource_exhausted",
    "resource exhausted",
    "too many requests",
    "429",
];

const AUTH_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "unauthenticated",
    "unauthorized",
    "permission_denied",
    "permission denied",
    "authenticat",
    "401",
];

/// Map a backend failure onto the [`ApiError`] family.
///
/// HTTP status wins when present; otherwise the message is matched against
/// marker phrases. Bare `"rate"` is not a marker: it also matches
/// "generate".
pub(crate) fn classify(err: BackendError) -> ApiError {
    match err.status {
        Some(429) => return ApiError::RateLimited { message: err.message },
        Some(401) | Some(403) => return ApiError::Auth { message: err.message },
        _ => {}
    }

    let lower = err.message.to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        ApiError::RateLimited { message: err.message }
    } else if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        ApiError::Auth { message: err.message }
    } else {
        ApiError::Failed { message: err.message }
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// Per-call overrides of the client defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        }
    }
}

/// Rate-limited, retrying generation client. Cheap to share behind an `Arc`.
pub struct AiClient {
    config: ClientConfig,
    backend: Arc<dyn GenerationBackend>,
    limiter: RateLimiter,
}

impl std::fmt::Debug for AiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiClient")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl AiClient {
    /// Wrap an arbitrary backend.
    pub fn new(config: ClientConfig, backend: Arc<dyn GenerationBackend>) -> Self {
        info!(
            "Initialized AI client: backend={}, model={}, rate limit={}/min",
            backend.name(),
            config.model,
            config.max_requests_per_minute
        );
        let limiter = RateLimiter::new(config.max_requests_per_minute);
        Self {
            config,
            backend,
            limiter,
        }
    }

    /// Client over the Gemini REST API.
    ///
    /// Fails with [`ApiError::Auth`] when no API key is configured.
    pub fn gemini(config: ClientConfig) -> Result<Self, ApiError> {
        let backend = GeminiBackend::new(&config)?;
        Ok(Self::new(config, Arc::new(backend)))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// One admission-controlled generation call, no retries.
    pub async fn generate(
        &self,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<GenerationResult, ApiError> {
        self.limiter.acquire().await;

        let request = GenerationRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_output_tokens: options.max_tokens.unwrap_or(self.config.max_output_tokens),
        };

        debug!(
            "Generating content: prompt_length={}, temperature={}, max_tokens={}",
            prompt.len(),
            request.temperature,
            request.max_output_tokens
        );

        let start = Instant::now();
        let raw = self.backend.generate(&request).await.map_err(classify)?;
        let result = into_result(raw, request.model)?;

        debug!(
            "Generation complete: {} prompt tokens, {} completion tokens, {:?}",
            result.prompt_tokens,
            result.completion_tokens,
            start.elapsed()
        );
        Ok(result)
    }

    /// [`generate`](Self::generate) with up to `max_retries` attempts.
    ///
    /// Returns the last error once attempts are exhausted. [`ApiError::Auth`]
    /// is returned immediately.
    pub async fn generate_with_retry(
        &self,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<GenerationResult, ApiError> {
        let attempts = self.config.max_retries.max(1);
        let mut last_err: Option<ApiError> = None;

        for attempt in 0..attempts {
            match self.generate(prompt, options).await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Generation succeeded on attempt {}/{}", attempt + 1, attempts);
                    }
                    return Ok(result);
                }
                Err(e) if e.is_auth() => {
                    error!("Authentication error, not retrying: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    if attempt + 1 < attempts {
                        let delay = if e.is_rate_limit() {
                            self.config
                                .rate_limit_backoff
                                .saturating_mul(2u32.saturating_pow(attempt))
                        } else {
                            self.config.retry_delay
                        };
                        warn!(
                            "Attempt {}/{} failed: {}, retrying in {:?}",
                            attempt + 1,
                            attempts,
                            e,
                            delay
                        );
                        sleep(delay).await;
                    } else {
                        warn!("Attempt {}/{} failed: {}", attempt + 1, attempts, e);
                    }
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or_else(|| ApiError::failed("no generation attempts were made"));
        error!("All {} attempts failed: {}", attempts, err);
        Err(err)
    }

    /// Send a minimal prompt; `true` if the model answered.
    pub async fn test_connection(&self) -> bool {
        match self
            .generate("Say 'OK'", GenerateOptions::new(0.0, 30))
            .await
        {
            Ok(_) => {
                info!("Connection test passed");
                true
            }
            Err(e) => {
                error!("Connection test failed: {}", e);
                false
            }
        }
    }
}

/// Validate a raw response and flatten it into a [`GenerationResult`].
fn into_result(raw: RawResponse, model: String) -> Result<GenerationResult, ApiError> {
    let candidate = raw
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::failed("No candidates in response"))?;

    if candidate.parts.is_empty() {
        return Err(ApiError::failed("No content parts in response"));
    }

    let content = candidate.parts.concat();
    if content.trim().is_empty() {
        return Err(ApiError::failed("Empty response text"));
    }

    let usage = raw.usage.unwrap_or_default();
    Ok(GenerationResult {
        content,
        model,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage
            .total_tokens
            .unwrap_or(usage.prompt_tokens + usage.completion_tokens),
        finish_reason: candidate
            .finish_reason
            .unwrap_or_else(|| "UNKNOWN".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed script of outcomes, then repeats the last one.
    struct Scripted {
        script: Mutex<VecDeque<Result<RawResponse, BackendError>>>,
        calls: AtomicUsize,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<RawResponse, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn text(s: &str) -> Result<RawResponse, BackendError> {
        Ok(RawResponse {
            candidates: vec![Candidate {
                parts: vec![s.to_string()],
                finish_reason: Some("STOP".into()),
            }],
            usage: Some(Usage {
                prompt_tokens: 5,
                completion_tokens: 2,
                total_tokens: None,
            }),
        })
    }

    fn client(backend: Arc<Scripted>) -> AiClient {
        let config = ClientConfig::builder()
            .api_key("test")
            .max_requests_per_minute(1000)
            .build()
            .unwrap();
        AiClient::new(config, backend)
    }

    #[test]
    fn classification_prefers_status() {
        let e = classify(BackendError::with_status(429, "slow down"));
        assert!(e.is_rate_limit());
        let e = classify(BackendError::with_status(403, "nope"));
        assert!(e.is_auth());
        let e = classify(BackendError::with_status(500, "internal"));
        assert_eq!(e, ApiError::failed("internal"));
    }

    #[test]
    fn classification_falls_back_to_markers() {
        assert!(classify(BackendError::new("Quota exceeded for project")).is_rate_limit());
        assert!(classify(BackendError::new("RESOURCE_EXHAUSTED")).is_rate_limit());
        assert!(classify(BackendError::new("API key not valid")).is_auth());
        assert!(classify(BackendError::new("UNAUTHENTICATED")).is_auth());
    }

    #[test]
    fn generate_is_not_a_rate_limit_marker() {
        let e = classify(BackendError::new("failed to generate content"));
        assert!(!e.is_rate_limit());
        assert!(!e.is_auth());
    }

    #[tokio::test]
    async fn generate_fills_result_and_defaults() {
        let backend = Scripted::new(vec![text("hello")]);
        let c = client(Arc::clone(&backend));
        let r = c.generate("prompt", GenerateOptions::default()).await.unwrap();
        assert_eq!(r.content, "hello");
        assert_eq!(r.model, "gemini-1.5-pro");
        assert_eq!(r.total_tokens, 7);
        assert_eq!(r.finish_reason, "STOP");

        let req = backend.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_output_tokens, 8192);
    }

    #[tokio::test]
    async fn generate_applies_overrides() {
        let backend = Scripted::new(vec![text("ok")]);
        let c = client(Arc::clone(&backend));
        c.generate("p", GenerateOptions::new(0.3, 8000)).await.unwrap();
        let req = backend.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(req.temperature, 0.3);
        assert_eq!(req.max_output_tokens, 8000);
    }

    #[tokio::test]
    async fn generate_rejects_empty_responses() {
        let none = Scripted::new(vec![Ok(RawResponse::default())]);
        let err = client(none).generate("p", GenerateOptions::default()).await.unwrap_err();
        assert_eq!(err, ApiError::failed("No candidates in response"));

        let no_parts = Scripted::new(vec![Ok(RawResponse {
            candidates: vec![Candidate::default()],
            usage: None,
        })]);
        let err = client(no_parts).generate("p", GenerateOptions::default()).await.unwrap_err();
        assert_eq!(err, ApiError::failed("No content parts in response"));

        let blank = Scripted::new(vec![text("  \n")]);
        let err = client(blank).generate("p", GenerateOptions::default()).await.unwrap_err();
        assert_eq!(err, ApiError::failed("Empty response text"));
    }

    #[tokio::test]
    async fn missing_usage_reports_zero_and_unknown_finish() {
        let backend = Scripted::new(vec![Ok(RawResponse {
            candidates: vec![Candidate {
                parts: vec!["a".into(), "b".into()],
                finish_reason: None,
            }],
            usage: None,
        })]);
        let r = client(backend).generate("p", GenerateOptions::default()).await.unwrap();
        assert_eq!(r.content, "ab");
        assert_eq!(r.total_tokens, 0);
        assert_eq!(r.finish_reason, "UNKNOWN");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhausts_attempts_on_rate_limit() {
        let backend = Scripted::new(vec![Err(BackendError::with_status(429, "quota"))]);
        let c = client(Arc::clone(&backend));
        let start = tokio::time::Instant::now();

        let err = c.generate_with_retry("p", GenerateOptions::default()).await.unwrap_err();

        assert!(err.is_rate_limit());
        assert_eq!(backend.calls(), 3);
        // 1 s + 2 s of backoff, none after the last attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_uses_flat_delay_for_generic_errors() {
        let backend = Scripted::new(vec![
            Err(BackendError::with_status(500, "boom")),
            Err(BackendError::with_status(503, "unavailable")),
            text("finally"),
        ]);
        let c = client(Arc::clone(&backend));
        let start = tokio::time::Instant::now();

        let r = c.generate_with_retry("p", GenerateOptions::default()).await.unwrap();

        assert_eq!(r.content, "finally");
        assert_eq!(backend.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_errors_are_not_retried() {
        let backend = Scripted::new(vec![Err(BackendError::with_status(401, "API key invalid"))]);
        let c = client(Arc::clone(&backend));
        let err = c.generate_with_retry("p", GenerateOptions::default()).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn connection_test_reports_bool() {
        let ok = client(Scripted::new(vec![text("OK")]));
        assert!(ok.test_connection().await);
        let bad = client(Scripted::new(vec![Err(BackendError::new("down"))]));
        assert!(!bad.test_connection().await);
    }

    #[test]
    fn gemini_requires_api_key() {
        let err = AiClient::gemini(ClientConfig::default()).unwrap_err();
        assert!(err.is_auth());
    }
}
