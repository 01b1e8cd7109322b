//! Document-side data types: extracted pages, chunks and PDF metadata.

use serde::{Deserialize, Serialize};

/// One extracted PDF page.
///
/// Produced by a [`crate::pipeline::extract::PageExtractor`] in page order,
/// numbered contiguously from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page number.
    pub page_number: usize,
    /// Extracted text, trimmed.
    pub text: String,
    /// Character count of the text as extracted, before trimming.
    pub char_count: usize,
}

impl Page {
    /// Build a page from raw extracted text.
    pub fn new(page_number: usize, raw_text: &str) -> Self {
        Self {
            page_number,
            text: raw_text.trim().to_string(),
            char_count: raw_text.chars().count(),
        }
    }

    /// Placeholder for a page whose extraction failed; keeps numbering intact.
    pub fn empty(page_number: usize) -> Self {
        Self {
            page_number,
            text: String::new(),
            char_count: 0,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A token-bounded span of document content ready for a model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the chunk sequence, contiguous from 0.
    pub chunk_index: usize,
    /// Final content, including any `[Previous context...]` prefix.
    pub content: String,
    /// Tokens in `content`.
    pub token_count: usize,
    /// Characters in `content`.
    pub char_count: usize,
    /// `"N"` for one page, `"N-M"` for a span.
    pub page_range: String,
    /// Every page number that contributed to this chunk.
    pub page_numbers: Vec<usize>,
    pub has_overlap: bool,
    /// The excerpt prefixed onto `content`; `Some` iff `has_overlap`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap_content: Option<String>,
}

/// Format page numbers as `"N"` or `"first-last"`.
pub fn format_page_range(page_numbers: &[usize]) -> String {
    match page_numbers {
        [] => String::new(),
        [single] => single.to_string(),
        [first, .., last] => format!("{first}-{last}"),
    }
}

/// Document-level PDF metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
}
