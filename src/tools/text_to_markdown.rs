use super::{text_param, to_result, ParameterType, Tool, ToolParameter, ToolParams, ToolSchema, TEXT_TO_MARKDOWN, TOOL_GENERATION};
use crate::error::{ApiError, ToolError};
use crate::llm::AiClient;
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::render;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Result of `text_to_markdown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownOutput {
    pub markdown: String,
}

/// Reformat text as Markdown with a model call, then clean the answer.
pub struct TextToMarkdownTool {
    schema: ToolSchema,
    client: Arc<AiClient>,
    prompt: String,
}

impl TextToMarkdownTool {
    pub fn new(client: Arc<AiClient>, prompt: impl Into<String>) -> Self {
        Self {
            schema: ToolSchema {
                name: TEXT_TO_MARKDOWN.to_string(),
                description: "Convert plain text to well-formatted Markdown with LaTeX support"
                    .to_string(),
                version: "1.0.0".to_string(),
                parameters: vec![ToolParameter::required(
                    "content",
                    ParameterType::String,
                    "Text content to convert",
                )],
            },
            client,
            prompt: prompt.into(),
        }
    }

    pub async fn run(&self, content: &str) -> Result<MarkdownOutput, ToolError> {
        info!("Converting {} chars to Markdown", content.chars().count());

        let response = self
            .client
            .generate_with_retry(&render(&self.prompt, content), TOOL_GENERATION)
            .await
            .inspect_err(|e| error!("Markdown conversion failed: {}", e))?;

        let markdown = clean_markdown(&response.content);
        if markdown.is_empty() {
            return Err(ApiError::failed("Conversion produced no Markdown").into());
        }

        info!("Conversion complete: {} chars", markdown.chars().count());
        Ok(MarkdownOutput { markdown })
    }
}

#[async_trait]
impl Tool for TextToMarkdownTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, params: &ToolParams) -> Result<Value, ToolError> {
        let output = self.run(text_param(params, "content")?).await?;
        to_result(TEXT_TO_MARKDOWN, &output)
    }
}
