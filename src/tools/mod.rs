//! Named tool layer: schemas, parameter validation and dispatch.
//!
//! Three stateless operations are exposed under stable names so they can be
//! listed and invoked one at a time, or sequenced by
//! [`crate::process::DocumentPipeline`]:
//!
//! | name               | input        | result keys                                          |
//! |--------------------|--------------|------------------------------------------------------|
//! | `pdf_to_text`      | `file_data`  | `metadata`, `total_chunks`, `chunks`                 |
//! | `filter_content`   | `content`    | `filtered_content`, `original_length`, `filtered_length` |
//! | `text_to_markdown` | `content`    | `markdown`                                           |
//!
//! Parameters and results are JSON objects so the same registry can sit
//! behind an HTTP or MCP transport without an adapter layer.

mod filter_content;
mod pdf_to_text;
mod text_to_markdown;

pub use filter_content::{FilterContentTool, FilterOutput};
pub use pdf_to_text::{PdfToTextOutput, PdfToTextTool};
pub use text_to_markdown::{MarkdownOutput, TextToMarkdownTool};

use crate::chunking::Chunker;
use crate::config::FileLimits;
use crate::error::ToolError;
use crate::llm::{AiClient, GenerateOptions};
use crate::pipeline::extract::PageExtractor;
use crate::prompts::PromptSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Tool parameters as received from a caller.
pub type ToolParams = Map<String, Value>;

pub const PDF_TO_TEXT: &str = "pdf_to_text";
pub const FILTER_CONTENT: &str = "filter_content";
pub const TEXT_TO_MARKDOWN: &str = "text_to_markdown";

/// Sampling settings shared by the two model-backed tools.
pub(crate) const TOOL_GENERATION: GenerateOptions = GenerateOptions {
    temperature: Some(0.3),
    max_tokens: Some(8000),
};

// ── Schemas ──────────────────────────────────────────────────────────────

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    /// Base64-encoded file content.
    File,
}

/// One declared tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Accepted MIME types, for [`ParameterType::File`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_types: Option<Vec<String>>,
    /// Maximum decoded size in bytes, for [`ParameterType::File`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
}

impl ToolParameter {
    pub fn required(name: &str, kind: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
            default: None,
            mime_types: None,
            max_size: None,
        }
    }
}

/// Discovery record for a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub version: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
    }
}

// ── Tool trait ───────────────────────────────────────────────────────────

/// A named, schema-described operation over JSON parameters.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> &ToolSchema;

    fn name(&self) -> &str {
        &self.schema().name
    }

    /// Fail with [`ToolError::MissingParameters`] naming every required
    /// parameter that is absent or `null`.
    fn validate_parameters(&self, params: &ToolParams) -> Result<(), ToolError> {
        let missing: Vec<String> = self
            .schema()
            .required_parameters()
            .filter(|name| params.get(*name).map_or(true, Value::is_null))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolError::MissingParameters { names: missing })
        }
    }

    async fn execute(&self, params: &ToolParams) -> Result<Value, ToolError>;
}

/// Read a required string parameter.
pub(crate) fn string_param<'a>(params: &'a ToolParams, name: &str) -> Result<&'a str, ToolError> {
    match params.get(name) {
        None | Some(Value::Null) => Err(ToolError::MissingParameters {
            names: vec![name.to_string()],
        }),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ToolError::InvalidParameter {
            name: name.to_string(),
            reason: format!("expected a string, got {}", json_type(other)),
        }),
    }
}

/// Read a required string parameter that must contain non-whitespace text.
pub(crate) fn text_param<'a>(params: &'a ToolParams, name: &str) -> Result<&'a str, ToolError> {
    let s = string_param(params, name)?;
    if s.trim().is_empty() {
        return Err(ToolError::InvalidParameter {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(s)
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serialise a tool's typed output into its JSON result.
pub(crate) fn to_result<T: Serialize>(tool: &str, output: &T) -> Result<Value, ToolError> {
    serde_json::to_value(output).map_err(|e| ToolError::UnexpectedResult {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Name-keyed lookup table of tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The three standard tools, wired to the given collaborators.
    pub fn standard(
        extractor: Arc<dyn PageExtractor>,
        chunker: Chunker,
        client: Arc<AiClient>,
        limits: FileLimits,
        prompts: PromptSet,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PdfToTextTool::new(extractor, chunker, limits)));
        registry.register(Arc::new(FilterContentTool::new(
            Arc::clone(&client),
            prompts.filter_content,
        )));
        registry.register(Arc::new(TextToMarkdownTool::new(client, prompts.text_to_markdown)));
        info!("Registered {} tools", registry.tools.len());
        registry
    }

    /// Add `tool`, replacing any tool already registered under its name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Schemas of every registered tool, ordered by name.
    pub fn list_tools(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema().clone()).collect()
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_exists(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Validate `params` against the named tool's schema and run it.
    pub async fn execute(&self, name: &str, params: &ToolParams) -> Result<Value, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::ToolNotFound {
            name: name.to_string(),
        })?;
        tool.validate_parameters(params)?;
        info!("Executing tool: {}", name);
        tool.execute(params).await
    }
}
