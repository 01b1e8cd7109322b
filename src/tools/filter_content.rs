use super::{text_param, to_result, ParameterType, Tool, ToolParameter, ToolParams, ToolSchema, FILTER_CONTENT, TOOL_GENERATION};
use crate::error::ToolError;
use crate::llm::AiClient;
use crate::prompts::render;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Result of `filter_content`. Lengths are in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOutput {
    pub filtered_content: String,
    pub original_length: usize,
    pub filtered_length: usize,
}

/// Strip slide furniture and other noise from text with a model call.
pub struct FilterContentTool {
    schema: ToolSchema,
    client: Arc<AiClient>,
    prompt: String,
}

impl FilterContentTool {
    pub fn new(client: Arc<AiClient>, prompt: impl Into<String>) -> Self {
        Self {
            schema: ToolSchema {
                name: FILTER_CONTENT.to_string(),
                description: "Remove noise from any text content (slides, transcripts, documents)"
                    .to_string(),
                version: "1.0.0".to_string(),
                parameters: vec![ToolParameter::required(
                    "content",
                    ParameterType::String,
                    "Text content to filter",
                )],
            },
            client,
            prompt: prompt.into(),
        }
    }

    pub async fn run(&self, content: &str) -> Result<FilterOutput, ToolError> {
        let original_length = content.chars().count();
        info!("Filtering {} chars", original_length);

        let response = self
            .client
            .generate_with_retry(&render(&self.prompt, content), TOOL_GENERATION)
            .await
            .inspect_err(|e| error!("Content filtering failed: {}", e))?;

        let filtered_content = response.content.trim().to_string();
        let filtered_length = filtered_content.chars().count();
        info!(
            "Filtering complete: {} → {} chars",
            original_length, filtered_length
        );

        Ok(FilterOutput {
            filtered_content,
            original_length,
            filtered_length,
        })
    }
}

#[async_trait]
impl Tool for FilterContentTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, params: &ToolParams) -> Result<Value, ToolError> {
        let output = self.run(text_param(params, "content")?).await?;
        to_result(FILTER_CONTENT, &output)
    }
}
