//! Result types: generation responses and the pipeline execution trace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One successful text-generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Provider finish reason, `"UNKNOWN"` when the provider gave none.
    pub finish_reason: String,
}

/// Lifecycle of a [`PipelineStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cached,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Cached => "cached",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One stage invocation in a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub tool_name: String,
    /// Chunk this step worked on; `None` for document-level steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl PipelineStep {
    pub fn new(tool_name: impl Into<String>, chunk_index: Option<usize>, status: StepStatus) -> Self {
        Self {
            tool_name: tool_name.into(),
            chunk_index,
            status,
            result: None,
            error: None,
            duration_ms: None,
        }
    }
}

/// Output of a successful pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Every chunk's Markdown joined with `"\n\n---\n\n"`.
    pub markdown: String,
    /// Execution trace in the order steps were started.
    pub pipeline_steps: Vec<PipelineStep>,
    pub total_duration_ms: u64,
}

impl PipelineOutput {
    /// Steps with the given status, in trace order.
    pub fn steps_with_status(&self, status: StepStatus) -> impl Iterator<Item = &PipelineStep> {
        self.pipeline_steps.iter().filter(move |s| s.status == status)
    }
}
