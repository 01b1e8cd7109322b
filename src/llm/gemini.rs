//! Gemini `generateContent` over REST.

use super::{BackendError, Candidate, GenerationBackend, GenerationRequest, RawResponse, Usage};
use crate::config::ClientConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Backend calling `{api_base}/models/{model}:generateContent`.
///
/// The key travels in the `x-goog-api-key` header so it never appears in a
/// URL that reqwest might echo into an error message.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    /// Fails with [`ApiError::Auth`] if `config` has no API key.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| ApiError::Auth {
                message: "GEMINI_API_KEY is not configured".to_string(),
            })?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::failed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.clone(),
            timeout: config.request_timeout,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    fn build_request_body(request: &GenerationRequest) -> serde_json::Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_output_tokens,
            },
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            return BackendError::new(format!("Request timed out after {:?}", self.timeout));
        }
        BackendError {
            message: format!("Request failed: {e}"),
            status: e.status().map(|s| s.as_u16()),
        }
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, BackendError> {
        let body = Self::build_request_body(request);
        debug!("Gemini request to model={}", request.model);

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(BackendError::with_status(
                status.as_u16(),
                error_message(status.as_u16(), &text),
            ));
        }

        parse_response(&text)
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    usage_metadata: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

fn parse_response(text: &str) -> Result<RawResponse, BackendError> {
    let wire: WireResponse = serde_json::from_str(text)
        .map_err(|e| BackendError::new(format!("Invalid response JSON: {e}")))?;

    let candidates = wire
        .candidates
        .into_iter()
        .map(|c| Candidate {
            parts: c
                .content
                .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
                .unwrap_or_default(),
            finish_reason: c.finish_reason,
        })
        .collect();

    let usage = wire.usage_metadata.map(|u| Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    });

    Ok(RawResponse { candidates, usage })
}

/// `"STATUS: message"` from a Gemini error body, or the raw body.
fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<WireErrorBody>(body) {
        Ok(WireErrorBody { error }) if !error.status.is_empty() => {
            format!("{}: {}", error.status, error.message)
        }
        Ok(WireErrorBody { error }) => error.message,
        Err(_) if body.trim().is_empty() => format!("HTTP {status}"),
        Err(_) => format!("HTTP {status}: {}", body.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_structure() {
        let req = GenerationRequest {
            model: "gemini-1.5-pro".into(),
            prompt: "Hello".into(),
            temperature: 0.3,
            max_output_tokens: 8000,
        };
        let body = GeminiBackend::build_request_body(&req);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.3).abs() < 1e-6);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8000);
    }

    #[test]
    fn endpoint_joins_base_and_model() {
        let config = ClientConfig::builder()
            .api_key("k")
            .api_base("http://localhost:8080/v1beta/")
            .build()
            .unwrap();
        let backend = GeminiBackend::new(&config).unwrap();
        assert_eq!(
            backend.endpoint("gemini-1.5-flash"),
            "http://localhost:8080/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert!(!format!("{backend:?}").contains("\"k\""));
    }

    #[test]
    fn parses_candidates_and_usage() {
        let raw = parse_response(
            r##"{
                "candidates": [{
                    "content": {"parts": [{"text": "# Title"}, {"inlineData": {}}, {"text": "\nBody"}], "role": "model"},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16}
            }"##,
        )
        .unwrap();
        assert_eq!(raw.candidates.len(), 1);
        assert_eq!(raw.candidates[0].parts, vec!["# Title", "\nBody"]);
        assert_eq!(raw.candidates[0].finish_reason.as_deref(), Some("STOP"));
        let usage = raw.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 4);
        assert_eq!(usage.total_tokens, Some(16));
    }

    #[test]
    fn blocked_prompt_has_no_candidates() {
        let raw = parse_response(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(raw.candidates.is_empty());
        assert!(raw.usage.is_none());
    }

    #[test]
    fn invalid_json_is_a_backend_error() {
        let err = parse_response("<html>").unwrap_err();
        assert!(err.message.starts_with("Invalid response JSON"));
        assert_eq!(err.status, None);
    }

    #[test]
    fn error_message_extracts_status() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(error_message(429, body), "RESOURCE_EXHAUSTED: Quota exceeded");
        assert_eq!(error_message(502, ""), "HTTP 502");
        assert_eq!(error_message(500, "oops"), "HTTP 500: oops");
    }
}
