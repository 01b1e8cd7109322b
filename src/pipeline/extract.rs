//! PDF text extraction: PDF bytes → ordered [`Page`]s and document metadata.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`extract_document`] moves the work onto tokio's blocking pool so text
//! extraction of a long lecture deck never stalls the worker threads that
//! are busy awaiting model calls.
//!
//! ## Page failures
//!
//! A page whose text layer cannot be read becomes an empty [`Page`] with a
//! `warn!`; numbering stays contiguous and the rest of the document is still
//! processed. Only failures to open the whole document are errors.

use crate::document::{DocumentMetadata, Page};
use crate::error::PdfProcessingError;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pages and metadata of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub metadata: DocumentMetadata,
    pub pages: Vec<Page>,
}

/// Narrow boundary over a PDF parsing library.
///
/// Implementations are synchronous; [`extract_document`] runs them on the
/// blocking pool.
pub trait PageExtractor: Send + Sync {
    /// Pages in order, numbered from 1.
    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<Page>, PdfProcessingError>;

    fn metadata(&self, pdf: &[u8]) -> Result<DocumentMetadata, PdfProcessingError>;

    /// Pages and metadata together. Override when both can share one parse.
    fn extract(&self, pdf: &[u8]) -> Result<ExtractedDocument, PdfProcessingError> {
        Ok(ExtractedDocument {
            metadata: self.metadata(pdf)?,
            pages: self.extract_pages(pdf)?,
        })
    }
}

/// Run `extractor` over `pdf` on the blocking pool.
pub async fn extract_document(
    extractor: Arc<dyn PageExtractor>,
    pdf: Vec<u8>,
) -> Result<ExtractedDocument, PdfProcessingError> {
    tokio::task::spawn_blocking(move || extractor.extract(&pdf))
        .await
        .map_err(|e| PdfProcessingError::Task(e.to_string()))?
}

// ── PDFium ───────────────────────────────────────────────────────────────

/// [`PageExtractor`] backed by PDFium.
///
/// The library is located through `pdfium-auto` (`PDFIUM_LIB_PATH`, the
/// local cache, or a one-time download) unless an explicit path is given.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_path: Option<PathBuf>,
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the PDFium shared library at `path` instead of auto-locating it.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, PdfProcessingError> {
        let bound = match &self.library_path {
            Some(path) => pdfium_auto::bind_pdfium_from_path(path),
            None => pdfium_auto::bind_pdfium_silent(),
        };
        bound.map_err(|e| PdfProcessingError::Binding(e.to_string()))
    }
}

fn open<'a>(pdfium: &'a Pdfium, pdf: &'a [u8]) -> Result<PdfDocument<'a>, PdfProcessingError> {
    pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| PdfProcessingError::Open(format!("{:?}", e)))
}

fn read_pages(document: &PdfDocument<'_>) -> Vec<Page> {
    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    pages
        .iter()
        .enumerate()
        .map(|(idx, page)| {
            let page_number = idx + 1;
            match page.text() {
                Ok(text) => {
                    let page = Page::new(page_number, &text.all());
                    debug!("Extracted page {}: {} chars", page_number, page.char_count);
                    page
                }
                Err(e) => {
                    warn!("Failed to extract text from page {}: {:?}", page_number, e);
                    Page::empty(page_number)
                }
            }
        })
        .collect()
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        page_count: document.pages().len() as usize,
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
    }
}

impl PageExtractor for PdfiumExtractor {
    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<Page>, PdfProcessingError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, pdf)?;
        Ok(read_pages(&document))
    }

    fn metadata(&self, pdf: &[u8]) -> Result<DocumentMetadata, PdfProcessingError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, pdf)?;
        Ok(read_metadata(&document))
    }

    fn extract(&self, pdf: &[u8]) -> Result<ExtractedDocument, PdfProcessingError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, pdf)?;
        Ok(ExtractedDocument {
            metadata: read_metadata(&document),
            pages: read_pages(&document),
        })
    }
}
