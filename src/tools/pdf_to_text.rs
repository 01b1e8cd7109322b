use super::{string_param, to_result, ParameterType, Tool, ToolParameter, ToolParams, ToolSchema, PDF_TO_TEXT};
use crate::chunking::Chunker;
use crate::config::FileLimits;
use crate::document::{Chunk, DocumentMetadata};
use crate::error::ToolError;
use crate::pipeline::extract::{extract_document, PageExtractor};
use crate::pipeline::input::validate_pdf_payload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Result of `pdf_to_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfToTextOutput {
    pub metadata: DocumentMetadata,
    pub total_chunks: usize,
    pub chunks: Vec<Chunk>,
}

/// Decode a base64 PDF, extract its pages and chunk them.
pub struct PdfToTextTool {
    schema: ToolSchema,
    extractor: Arc<dyn PageExtractor>,
    chunker: Chunker,
    limits: FileLimits,
}

impl PdfToTextTool {
    pub fn new(extractor: Arc<dyn PageExtractor>, chunker: Chunker, limits: FileLimits) -> Self {
        let mut file_data = ToolParameter::required(
            "file_data",
            ParameterType::File,
            "PDF file content (base64 encoded string)",
        );
        file_data.mime_types = Some(vec!["application/pdf".to_string()]);
        file_data.max_size = Some(limits.max_file_size);

        Self {
            schema: ToolSchema {
                name: PDF_TO_TEXT.to_string(),
                description: "Extract text from a PDF and split it into token-bounded, \
                              overlapping chunks that fit LLM context limits"
                    .to_string(),
                version: "1.0.0".to_string(),
                parameters: vec![file_data],
            },
            extractor,
            chunker,
            limits,
        }
    }

    /// Typed entry point behind [`Tool::execute`].
    pub async fn run(&self, file_data: &str) -> Result<PdfToTextOutput, ToolError> {
        info!("Executing PDF to text extraction with token-based chunking");

        let pdf = validate_pdf_payload(file_data, &self.limits).inspect_err(|e| {
            error!("PDF validation failed: {}", e);
        })?;

        let document = extract_document(Arc::clone(&self.extractor), pdf)
            .await
            .inspect_err(|e| error!("PDF extraction failed: {}", e))?;

        let chunks = self.chunker.chunk_pages(&document.pages);
        info!(
            "Extraction complete: {} chunks created from {} pages",
            chunks.len(),
            document.pages.len()
        );

        Ok(PdfToTextOutput {
            metadata: document.metadata,
            total_chunks: chunks.len(),
            chunks,
        })
    }
}

#[async_trait]
impl Tool for PdfToTextTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, params: &ToolParams) -> Result<Value, ToolError> {
        let output = self.run(string_param(params, "file_data")?).await?;
        to_result(PDF_TO_TEXT, &output)
    }
}
