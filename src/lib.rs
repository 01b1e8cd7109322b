//! # lecture2md
//!
//! Turn lecture PDFs into clean Markdown with a text-generation model.
//!
//! ## Why chunk?
//!
//! A whole lecture deck rarely fits one model call, and cutting it at
//! arbitrary byte offsets splits definitions from their proofs. This crate
//! extracts the PDF's text layer page by page, packs pages into
//! token-bounded chunks that carry a short excerpt of the previous chunk, and
//! sends each chunk through two model passes: one to strip slide furniture,
//! one to rewrite the remainder as Markdown with LaTeX.
//!
//! ## Pipeline Overview
//!
//! ```text
//! base64 PDF
//!  │
//!  ├─ 1. Input    decode, size and signature checks
//!  ├─ 2. Extract  page text + metadata via pdfium (spawn_blocking)
//!  ├─ 3. Chunk    token-bounded chunks with overlap, oversized pages split
//!  ├─ 4. Filter   model call per chunk (optional), rate-limited + retried
//!  ├─ 5. Format   model call per chunk, Markdown cleanup
//!  └─ 6. Output   chunks joined with `---`, full step trace
//! ```
//!
//! Every stage is also a named tool in a [`ToolRegistry`] and can be run on
//! its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lecture2md::{
//!     AiClient, Chunker, ChunkingConfig, ClientConfig, DocumentPipeline, FileLimits,
//!     PdfiumExtractor, PipelineConfig, ProcessRequest, PromptSet, TokenCounter, ToolRegistry,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let registry = ToolRegistry::standard(
//!         Arc::new(PdfiumExtractor::new()),
//!         Chunker::new(ChunkingConfig::default(), Arc::new(TokenCounter::new())),
//!         Arc::new(AiClient::gemini(client)?),
//!         FileLimits::default(),
//!         PromptSet::default(),
//!     );
//!     let pipeline = DocumentPipeline::new(Arc::new(registry), PipelineConfig::default());
//!
//!     let pdf = std::fs::read("lecture01.pdf")?;
//!     let output = pipeline.process(&ProcessRequest::from_bytes(&pdf)).await?;
//!     println!("{}", output.markdown);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `lecture2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! lecture2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chunking;
pub mod config;
pub mod document;
pub mod error;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod tokens;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chunking::Chunker;
pub use config::{ChunkingConfig, ClientConfig, ClientConfigBuilder, FileLimits, PipelineConfig};
pub use document::{Chunk, DocumentMetadata, Page};
pub use error::{ApiError, ConfigError, FileValidationError, OutputError, PdfProcessingError, PipelineError, ToolError};
pub use llm::{AiClient, GenerateOptions, GenerationBackend, GeminiBackend, ProviderBackend, RateLimiter};
pub use output::{GenerationResult, PipelineOutput, PipelineStep, StepStatus};
pub use pipeline::extract::{ExtractedDocument, PageExtractor, PdfiumExtractor};
pub use process::{DocumentPipeline, ProcessRequest};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use prompts::PromptSet;
pub use tokens::TokenCounter;
pub use tools::{Tool, ToolParameter, ToolParams, ToolRegistry, ToolSchema};
