//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::process::DocumentPipeline::with_progress`] to receive events as
//! the pipeline works through a document's chunks.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a log, or a terminal progress bar without the
//! library knowing anything about how the host application communicates.
//! Events carry counts and sizes only, never chunk text.
//!
//! # Example
//!
//! ```rust
//! use lecture2md::PipelineProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, chunk_index: usize, total_chunks: usize, markdown_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Chunk {}/{} done ({} bytes)", chunk_index + 1, total_chunks, markdown_len);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by [`crate::process::DocumentPipeline`] as a run progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Chunks are processed sequentially, so events for
/// one run arrive in order.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once extraction and chunking are done.
    ///
    /// # Arguments
    /// * `total_chunks`: number of chunks that will be processed
    fn on_pipeline_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called before the first model call for a chunk.
    fn on_chunk_start(&self, chunk_index: usize, total_chunks: usize) {
        let _ = (chunk_index, total_chunks);
    }

    /// Called when a chunk's Markdown is ready.
    ///
    /// # Arguments
    /// * `chunk_index` : 0-based chunk index
    /// * `total_chunks`: total chunks
    /// * `markdown_len`: byte length of the produced Markdown
    fn on_chunk_complete(&self, chunk_index: usize, total_chunks: usize, markdown_len: usize) {
        let _ = (chunk_index, total_chunks, markdown_len);
    }

    /// Called once after a successful run.
    fn on_pipeline_complete(&self, total_chunks: usize, markdown_len: usize) {
        let _ = (total_chunks, markdown_len);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Shared callback handle as stored by the pipeline.
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
