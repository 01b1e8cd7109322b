//! Token-aware chunking of extracted pages.
//!
//! Pages are packed greedily into batches that stay under
//! [`ChunkingConfig::target_tokens`]. When a batch is flushed, the tail of its
//! last one or two pages becomes an overlap excerpt that is prefixed onto the
//! *next* chunk, so a model reading chunks in isolation still sees how the
//! previous one ended.
//!
//! ```text
//! pages:  [p1 p2] [p3] [p4 ─ too big ─] [p5 p6]
//!            │      │        │              │
//! chunks:    0      1     2, 3, 4 (parts)   5
//! overlap:   -    p1-p2      -           tail(p4)
//! ```
//!
//! A page larger than [`ChunkingConfig::max_tokens`] never joins a batch; it
//! is split on blank-line paragraph boundaries into standalone "part" chunks
//! that carry no overlap themselves.

use crate::config::ChunkingConfig;
use crate::document::{format_page_range, Chunk, Page};
use crate::tokens::TokenCounter;
use std::sync::Arc;
use tracing::{debug, info, warn};

const OVERLAP_MARKER: &str = "[Previous context...]";

/// Splits page sequences into [`Chunk`]s.
///
/// Pure over its input: the same pages and config always give the same chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    counter: Arc<TokenCounter>,
}

impl Chunker {
    pub fn new(config: ChunkingConfig, counter: Arc<TokenCounter>) -> Self {
        info!(
            "Initialized Chunker with max_tokens={}, target={}, overlap={}",
            config.max_tokens, config.target_tokens, config.overlap_tokens
        );
        Self { config, counter }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn token_counter(&self) -> &Arc<TokenCounter> {
        &self.counter
    }

    /// Chunk `pages` (in page order). An empty slice gives no chunks.
    pub fn chunk_pages(&self, pages: &[Page]) -> Vec<Chunk> {
        if pages.is_empty() {
            warn!("No pages to chunk");
            return Vec::new();
        }

        info!("Chunking {} pages with token-based strategy", pages.len());

        let page_tokens: Vec<usize> = pages
            .iter()
            .map(|page| {
                let tokens = self.counter.count_tokens(&page.text);
                debug!("Page {}: {} tokens", page.page_number, tokens);
                tokens
            })
            .collect();

        let chunks = self.build_chunks(pages, &page_tokens);

        let total: usize = chunks.iter().map(|c| c.token_count).sum();
        info!(
            "Created {} chunks (avg {} tokens/chunk)",
            chunks.len(),
            total / chunks.len().max(1)
        );
        chunks
    }

    fn build_chunks(&self, pages: &[Page], page_tokens: &[usize]) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut batch: Vec<&Page> = Vec::new();
        let mut batch_tokens = 0usize;
        let mut overlap: Option<String> = None;

        for (page, &tokens) in pages.iter().zip(page_tokens) {
            if batch_tokens + tokens > self.config.target_tokens && !batch.is_empty() {
                chunks.push(self.chunk_from_pages(chunks.len(), &batch, overlap.as_deref()));
                overlap = self.extract_overlap(&batch);
                batch.clear();
                batch_tokens = 0;
            }

            if tokens > self.config.max_tokens {
                warn!(
                    "Page {} has {} tokens (exceeds max {}), will split",
                    page.page_number, tokens, self.config.max_tokens
                );
                if !batch.is_empty() {
                    chunks.push(self.chunk_from_pages(chunks.len(), &batch, overlap.as_deref()));
                    batch.clear();
                    batch_tokens = 0;
                }
                let parts = self.split_large_page(page, chunks.len());
                chunks.extend(parts);
                overlap = self.extract_overlap(&[page]);
            } else {
                batch.push(page);
                batch_tokens += tokens;
            }
        }

        if !batch.is_empty() {
            chunks.push(self.chunk_from_pages(chunks.len(), &batch, overlap.as_deref()));
        }

        chunks
    }

    /// Build one chunk from a batch of pages, prefixing `overlap` unless this
    /// is the document's first chunk.
    fn chunk_from_pages(&self, chunk_index: usize, pages: &[&Page], overlap: Option<&str>) -> Chunk {
        let content = pages
            .iter()
            .filter(|p| !p.is_blank())
            .map(|p| format!("=== Page {} ===\n{}", p.page_number, p.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let overlap = overlap.filter(|o| chunk_index > 0 && !o.is_empty());
        let full_content = match overlap {
            Some(o) => format!("{OVERLAP_MARKER}\n{o}\n\n{content}"),
            None => content,
        };

        let page_numbers: Vec<usize> = pages.iter().map(|p| p.page_number).collect();
        let token_count = self.counter.count_tokens(&full_content);
        if token_count < self.config.min_chunk_tokens {
            debug!(
                "Chunk {} has {} tokens (below min {})",
                chunk_index, token_count, self.config.min_chunk_tokens
            );
        }

        Chunk {
            chunk_index,
            char_count: full_content.chars().count(),
            content: full_content,
            token_count,
            page_range: format_page_range(&page_numbers),
            page_numbers,
            has_overlap: overlap.is_some(),
            overlap_content: overlap.map(str::to_string),
        }
    }

    /// Trailing `overlap_tokens` of the last one or two pages, trimmed to the
    /// last few complete sentences when sentence breaks are present.
    fn extract_overlap(&self, pages: &[&Page]) -> Option<String> {
        if self.config.overlap_tokens == 0 {
            return None;
        }

        let start = pages.len().saturating_sub(2);
        let combined = pages[start..]
            .iter()
            .filter(|p| !p.is_blank())
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        if combined.is_empty() {
            return None;
        }

        let tail = self.counter.tail_tokens(&combined, self.config.overlap_tokens);
        let sentences: Vec<&str> = tail.split(". ").collect();
        let overlap = if sentences.len() > 1 {
            sentences[sentences.len().saturating_sub(3)..].join(". ")
        } else {
            tail
        };

        let overlap = overlap.trim();
        (!overlap.is_empty()).then(|| overlap.to_string())
    }

    /// Split one oversized page on paragraph boundaries into standalone
    /// chunks numbered from `first_index`.
    fn split_large_page(&self, page: &Page, first_index: usize) -> Vec<Chunk> {
        let mut parts: Vec<Chunk> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens = 0usize;

        for para in page.text.split("\n\n").filter(|p| !p.trim().is_empty()) {
            let para_tokens = self.counter.count_tokens(para);

            if current_tokens + para_tokens > self.config.target_tokens && !current.is_empty() {
                parts.push(self.page_part(page, first_index + parts.len(), parts.len() + 1, &current));
                current.clear();
                current_tokens = 0;
            }

            current.push(para);
            current_tokens += para_tokens;
        }

        if !current.is_empty() {
            parts.push(self.page_part(page, first_index + parts.len(), parts.len() + 1, &current));
        }

        info!("Split page {} into {} chunks", page.page_number, parts.len());
        parts
    }

    fn page_part(&self, page: &Page, chunk_index: usize, part: usize, paragraphs: &[&str]) -> Chunk {
        let content = format!(
            "=== Page {} (part {}) ===\n{}",
            page.page_number,
            part,
            paragraphs.join("\n\n")
        );
        Chunk {
            chunk_index,
            token_count: self.counter.count_tokens(&content),
            char_count: content.chars().count(),
            content,
            page_range: page.page_number.to_string(),
            page_numbers: vec![page.page_number],
            has_overlap: false,
            overlap_content: None,
        }
    }
}
