//! Whole-document pipeline: extract → (filter) → markdown, chunk by chunk.
//!
//! [`DocumentPipeline::process`] drives the three registered tools by name
//! over one document and records every invocation as a [`PipelineStep`].
//!
//! ```text
//! pdf_to_text ──▶ chunk 0: filter_content ──▶ text_to_markdown ─┐
//!                 chunk 1: filter_content ──▶ text_to_markdown ─┤──▶ join "---"
//!                 ...                                           ─┘
//! ```
//!
//! ## Caching
//!
//! Step results are grouped per document (SHA-256 of the payload) and the
//! documents sit in a bounded LRU. Within a document, each result is keyed by
//! tool name, chunk index and a SHA-256 of the step's full input, so
//! re-running a document skips the model calls it has already paid for. A
//! long document never evicts its own extraction result. Cache hits appear
//! in the trace as [`StepStatus::Cached`] with `duration_ms = 0`.
//!
//! ## Failure
//!
//! Any step failure aborts the run. No partial Markdown is returned; the
//! [`PipelineError`] carries the trace, which always ends with the failing
//! step marked [`StepStatus::Failed`]. Chunks with no text are recorded as a
//! skipped `text_to_markdown` step and contribute nothing to the output.
//!
//! Chunks are processed strictly in order, one model call at a time.

use crate::config::PipelineConfig;
use crate::error::{OutputError, PipelineError, ToolError};
use crate::output::{PipelineOutput, PipelineStep, StepStatus};
use crate::pipeline::input::encode_file_data;
use crate::progress::ProgressCallback;
use crate::tools::{PdfToTextOutput, ToolParams, ToolRegistry, FILTER_CONTENT, PDF_TO_TEXT, TEXT_TO_MARKDOWN};
use lru::LruCache;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info};

/// Separator placed between consecutive chunks' Markdown.
pub const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// Input of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Base64-encoded PDF.
    pub file_data: String,
    /// Send raw chunk text straight to `text_to_markdown`.
    pub skip_filter: bool,
    /// Read and write the step cache. Default: `true`.
    pub cache_intermediate: bool,
}

impl ProcessRequest {
    pub fn new(file_data: impl Into<String>) -> Self {
        Self {
            file_data: file_data.into(),
            skip_filter: false,
            cache_intermediate: true,
        }
    }

    /// Request for raw PDF bytes.
    pub fn from_bytes(pdf: &[u8]) -> Self {
        Self::new(encode_file_data(pdf))
    }

    pub fn skip_filter(mut self, skip: bool) -> Self {
        self.skip_filter = skip;
        self
    }

    pub fn cache_intermediate(mut self, cache: bool) -> Self {
        self.cache_intermediate = cache;
        self
    }
}

/// Step results of one document, by step key.
type DocumentCache = HashMap<String, Value>;

/// Sequences the registered tools over a document, with a step cache.
///
/// Safe to share between concurrent runs: the cache sits behind a mutex
/// that is never held across an `.await`.
pub struct DocumentPipeline {
    registry: Arc<ToolRegistry>,
    cache: Mutex<LruCache<String, DocumentCache>>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for DocumentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPipeline")
            .field("registry", &self.registry)
            .field("cached_documents", &self.lock_cache().len())
            .field("cached_entries", &self.cache_len())
            .field("progress_callback", &self.progress.is_some())
            .finish()
    }
}

impl DocumentPipeline {
    pub fn new(registry: Arc<ToolRegistry>, config: PipelineConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry,
            cache: Mutex::new(LruCache::new(capacity)),
            progress: None,
        }
    }

    /// Receive chunk-level progress events.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Number of cached step results, across all documents.
    pub fn cache_len(&self) -> usize {
        self.lock_cache().iter().map(|(_, steps)| steps.len()).sum()
    }

    /// Number of documents with cached step results.
    pub fn cached_documents(&self) -> usize {
        self.lock_cache().len()
    }

    /// Drop every cached step result.
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
        info!("Pipeline cache cleared");
    }

    /// Run the whole pipeline over one document.
    pub async fn process(&self, request: &ProcessRequest) -> Result<PipelineOutput, PipelineError> {
        info!("Starting document processing pipeline");
        let start = Instant::now();
        let mut steps: Vec<PipelineStep> = Vec::new();

        match self.run(request, &mut steps).await {
            Ok(markdown) => {
                let total_duration_ms = start.elapsed().as_millis() as u64;
                info!("Pipeline completed in {}ms", total_duration_ms);
                Ok(PipelineOutput {
                    markdown,
                    pipeline_steps: steps,
                    total_duration_ms,
                })
            }
            Err(source) => {
                error!("Pipeline failed: {}", source);
                mark_failed(&mut steps, &source.to_string());
                let failed_step = steps
                    .last()
                    .map_or_else(|| PDF_TO_TEXT.to_string(), |s| s.tool_name.clone());
                Err(PipelineError {
                    failed_step,
                    steps,
                    source,
                })
            }
        }
    }

    /// Run the pipeline and write the Markdown to `path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn process_to_file(
        &self,
        request: &ProcessRequest,
        path: impl AsRef<Path>,
    ) -> Result<PipelineOutput, OutputError> {
        let output = self.process(request).await?;
        let path = path.as_ref();
        let write_err = |source| OutputError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = path.with_extension("md.tmp");
        tokio::fs::write(&tmp_path, &output.markdown)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        info!("Wrote {} bytes to {}", output.markdown.len(), path.display());
        Ok(output)
    }

    async fn run(&self, request: &ProcessRequest, steps: &mut Vec<PipelineStep>) -> Result<String, ToolError> {
        let digest = request
            .cache_intermediate
            .then(|| hex::encode(Sha256::digest(request.file_data.as_bytes())));
        let document = digest.as_deref();

        // ── Step 1: extract and chunk ────────────────────────────────────
        let extracted = self
            .execute_step(
                PDF_TO_TEXT,
                None,
                params("file_data", &request.file_data),
                CacheSlot::for_step(document, PDF_TO_TEXT, None, &request.file_data),
                steps,
            )
            .await?;
        let extracted: PdfToTextOutput =
            serde_json::from_value(extracted).map_err(|e| unexpected(PDF_TO_TEXT, e))?;

        let total = extracted.chunks.len();
        info!("Processing {} chunks through full pipeline", total);
        if let Some(cb) = &self.progress {
            cb.on_pipeline_start(total);
        }

        if request.skip_filter {
            steps.push(PipelineStep::new(FILTER_CONTENT, None, StepStatus::Skipped));
        }

        // ── Steps 2..: per chunk ─────────────────────────────────────────
        let mut markdown_chunks: Vec<String> = Vec::with_capacity(total);
        for chunk in &extracted.chunks {
            let i = chunk.chunk_index;
            if chunk.content.trim().is_empty() {
                debug!("Chunk {} has no text, skipping", i);
                steps.push(PipelineStep::new(TEXT_TO_MARKDOWN, Some(i), StepStatus::Skipped));
                continue;
            }
            info!("Processing chunk {}/{}", i + 1, total);
            if let Some(cb) = &self.progress {
                cb.on_chunk_start(i, total);
            }

            let text = if request.skip_filter {
                chunk.content.clone()
            } else {
                let filtered = self
                    .execute_step(
                        FILTER_CONTENT,
                        Some(i),
                        params("content", &chunk.content),
                        CacheSlot::for_step(document, FILTER_CONTENT, Some(i), &chunk.content),
                        steps,
                    )
                    .await?;
                string_field(FILTER_CONTENT, &filtered, "filtered_content")?
            };

            let formatted = self
                .execute_step(
                    TEXT_TO_MARKDOWN,
                    Some(i),
                    params("content", &text),
                    CacheSlot::for_step(document, TEXT_TO_MARKDOWN, Some(i), &text),
                    steps,
                )
                .await?;
            let markdown = string_field(TEXT_TO_MARKDOWN, &formatted, "markdown")?;

            debug!("Chunk {} processed: {} chars", i + 1, markdown.len());
            if let Some(cb) = &self.progress {
                cb.on_chunk_complete(i, total, markdown.len());
            }
            markdown_chunks.push(markdown);
        }

        let markdown = markdown_chunks.join(CHUNK_SEPARATOR);
        info!(
            "Pipeline completed: {} chunks → {} chars markdown",
            total,
            markdown.len()
        );
        if let Some(cb) = &self.progress {
            cb.on_pipeline_complete(total, markdown.len());
        }
        Ok(markdown)
    }

    /// Run one tool, or replay its cached result.
    ///
    /// On error the step is left `Running`; [`process`](Self::process) marks
    /// it failed.
    async fn execute_step(
        &self,
        tool: &str,
        chunk_index: Option<usize>,
        params: ToolParams,
        cache_slot: Option<CacheSlot<'_>>,
        steps: &mut Vec<PipelineStep>,
    ) -> Result<Value, ToolError> {
        if let Some(slot) = &cache_slot {
            let hit = self
                .lock_cache()
                .get(slot.document)
                .and_then(|entries| entries.get(&slot.key))
                .cloned();
            if let Some(result) = hit {
                info!("Cache hit for {}", tool);
                let mut step = PipelineStep::new(tool, chunk_index, StepStatus::Cached);
                step.result = Some(result.clone());
                step.duration_ms = Some(0);
                steps.push(step);
                return Ok(result);
            }
        }

        steps.push(PipelineStep::new(tool, chunk_index, StepStatus::Running));
        let running = steps.len() - 1;
        info!("Executing step: {}", tool);
        let started = Instant::now();

        let result = self.registry.execute(tool, &params).await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        let step = &mut steps[running];
        step.status = StepStatus::Completed;
        step.result = Some(result.clone());
        step.duration_ms = Some(duration_ms);
        info!("Step {} completed in {}ms", tool, duration_ms);

        if let Some(slot) = cache_slot {
            let mut cache = self.lock_cache();
            match cache.get_mut(slot.document) {
                Some(entries) => {
                    entries.insert(slot.key, result.clone());
                }
                None => {
                    let entries = DocumentCache::from([(slot.key, result.clone())]);
                    cache.put(slot.document.to_string(), entries);
                }
            }
        }
        Ok(result)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, DocumentCache>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Where a step's result lives in the cache.
struct CacheSlot<'a> {
    /// SHA-256 of the document payload.
    document: &'a str,
    key: String,
}

impl<'a> CacheSlot<'a> {
    /// `None` when caching is off for the run.
    fn for_step(
        document: Option<&'a str>,
        tool: &str,
        chunk_index: Option<usize>,
        input: &str,
    ) -> Option<Self> {
        document.map(|document| Self {
            document,
            key: cache_key(tool, chunk_index, input),
        })
    }
}

/// Close out the trace of a failed run.
///
/// Steps still `Running` are the ones that failed. When none is (the failure
/// came from reading a step's result), the last recorded step takes the blame.
fn mark_failed(steps: &mut [PipelineStep], message: &str) {
    let mut marked = false;
    for step in steps.iter_mut().filter(|s| s.status == StepStatus::Running) {
        step.status = StepStatus::Failed;
        step.error = Some(message.to_string());
        marked = true;
    }
    if !marked {
        if let Some(step) = steps.last_mut() {
            step.status = StepStatus::Failed;
            step.error = Some(message.to_string());
        }
    }
}

/// `tool[:chunk]:sha256(input)`.
fn cache_key(tool: &str, chunk_index: Option<usize>, input: &str) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    match chunk_index {
        Some(i) => format!("{tool}:{i}:{digest}"),
        None => format!("{tool}:{digest}"),
    }
}

fn params(name: &str, value: &str) -> ToolParams {
    let mut p = ToolParams::new();
    p.insert(name.to_string(), Value::String(value.to_string()));
    p
}

fn string_field(tool: &str, result: &Value, field: &str) -> Result<String, ToolError> {
    result
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::UnexpectedResult {
            tool: tool.to_string(),
            reason: format!("missing string field '{field}'"),
        })
}

fn unexpected(tool: &str, e: serde_json::Error) -> ToolError {
    ToolError::UnexpectedResult {
        tool: tool.to_string(),
        reason: e.to_string(),
    }
}
