//! Adapter from any `edgequake_llm` provider to [`GenerationBackend`].
//!
//! Lets the pipeline run against OpenAI, Anthropic, Ollama and the other
//! providers `edgequake_llm` ships, with the same rate limiting and retry
//! behaviour as the native Gemini backend.

use super::{BackendError, Candidate, GenerationBackend, GenerationRequest, RawResponse, Usage};
use crate::error::ApiError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wraps an `Arc<dyn LLMProvider>` with a per-call timeout.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBackend")
            .field("label", &self.label)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider,
            label: label.into(),
            timeout,
        }
    }

    /// Instantiate a named provider (`"openai"`, `"anthropic"`, `"ollama"`, ...)
    /// with the given model. API keys come from the provider's usual
    /// environment variables.
    pub fn from_name(provider_name: &str, model: &str, timeout: Duration) -> Result<Self, ApiError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            ApiError::Auth {
                message: format!("Provider '{provider_name}' is not configured: {e}"),
            }
        })?;
        Ok(Self::new(provider, provider_name, timeout))
    }
}

#[async_trait]
impl GenerationBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, BackendError> {
        let messages = vec![ChatMessage::user(request.prompt.as_str())];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_output_tokens as usize),
            ..Default::default()
        };

        debug!("{} request, prompt_length={}", self.label, request.prompt.len());

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| BackendError::new(format!("Request timed out after {:?}", self.timeout)))?
            .map_err(|e| BackendError::new(e.to_string()))?;

        Ok(RawResponse {
            candidates: vec![Candidate {
                parts: vec![response.content],
                finish_reason: None,
            }],
            usage: Some(Usage {
                prompt_tokens: response.prompt_tokens as u64,
                completion_tokens: response.completion_tokens as u64,
                total_tokens: None,
            }),
        })
    }
}
