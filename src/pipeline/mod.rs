//! Document-side stages that sit around the model calls.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the PDF backend can be swapped without
//! touching the tools that use it.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ (chunking) ──▶ (model) ──▶ postprocess
//! (base64)  (pdfium)                              (cleanup)
//! ```
//!
//! 1. [`input`]  : decode and validate the base64 payload, or read a path/URL
//! 2. [`extract`]: PDF bytes to pages and metadata; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`postprocess`]: deterministic cleanup of model-written Markdown

pub mod extract;
pub mod input;
pub mod postprocess;
