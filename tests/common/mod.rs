//! Shared fixtures: an in-memory page extractor and a scripted model backend,
//! so the registry and pipeline run without PDFium or the network.

#![allow(dead_code)]

use async_trait::async_trait;
use lecture2md::error::PdfProcessingError;
use lecture2md::llm::{BackendError, Candidate, GenerationRequest, RawResponse, Usage};
use lecture2md::{
    AiClient, Chunker, ChunkingConfig, ClientConfig, DocumentMetadata, FileLimits,
    GenerationBackend, Page, PageExtractor, PromptSet, TokenCounter, ToolRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Smallest payload that passes the signature and trailer checks.
pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\ntrailer\n<<>>\n%%EOF\n";

pub const FOOTER: &str = "Slide footer: CS101 Fall";

/// A lecture page of roughly 40 tokens ending with a slide footer line.
pub fn lecture_page(n: usize) -> String {
    let body = "The gradient descent update rule is applied. ".repeat(3);
    format!("Page {n} covers topic {n}. {}\n{FOOTER}", body.trim_end())
}

/// Thresholds small enough that every [`lecture_page`] becomes its own chunk.
pub fn small_chunks() -> ChunkingConfig {
    ChunkingConfig {
        max_tokens: 60,
        target_tokens: 40,
        overlap_tokens: 10,
        min_chunk_tokens: 5,
    }
}

/// Prompts with recognisable prefixes for [`ScriptedBackend`].
pub fn test_prompts() -> PromptSet {
    PromptSet {
        filter_content: "FILTER:\n{content}".to_string(),
        text_to_markdown: "MARKDOWN:\n{content}".to_string(),
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Returns fixed page texts for any payload.
pub struct FakeExtractor {
    pages: Vec<String>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new(pages: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn lecture(page_count: usize) -> Arc<Self> {
        Self::new((1..=page_count).map(lecture_page).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageExtractor for FakeExtractor {
    fn extract_pages(&self, _pdf: &[u8]) -> Result<Vec<Page>, PdfProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .iter()
            .enumerate()
            .map(|(i, text)| Page::new(i + 1, text))
            .collect())
    }

    fn metadata(&self, _pdf: &[u8]) -> Result<DocumentMetadata, PdfProcessingError> {
        Ok(DocumentMetadata {
            page_count: self.pages.len(),
            title: Some("Lecture 1: Optimisation".to_string()),
            ..Default::default()
        })
    }
}

// ── Backend ──────────────────────────────────────────────────────────────────

/// Answers `FILTER:` prompts by dropping footer lines and `MARKDOWN:` prompts
/// by wrapping the text under a heading inside a ```markdown fence.
#[derive(Default)]
pub struct ScriptedBackend {
    prompts: Mutex<Vec<String>>,
    /// Any prompt containing both strings fails with HTTP 401.
    fail_on: Option<(&'static str, &'static str)>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(prefix: &'static str, needle: &'static str) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some((prefix, needle)),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, BackendError> {
        let prompt = request.prompt.clone();
        self.prompts.lock().unwrap().push(prompt.clone());

        if let Some((prefix, needle)) = self.fail_on {
            if prompt.starts_with(prefix) && prompt.contains(needle) {
                return Err(BackendError::with_status(401, "API key not valid"));
            }
        }

        let text = if let Some(content) = prompt.strip_prefix("FILTER:\n") {
            content
                .lines()
                .filter(|l| !l.contains(FOOTER))
                .collect::<Vec<_>>()
                .join("\n")
        } else if let Some(content) = prompt.strip_prefix("MARKDOWN:\n") {
            format!("```markdown\n## Notes\n\n{content}\n```")
        } else {
            "OK".to_string()
        };

        Ok(RawResponse {
            candidates: vec![Candidate {
                parts: vec![text],
                finish_reason: Some("STOP".to_string()),
            }],
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: None,
            }),
        })
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

/// A client with no admission waits and no retry sleeps.
pub fn client(backend: Arc<ScriptedBackend>) -> Arc<AiClient> {
    let config = ClientConfig::builder()
        .max_requests_per_minute(10_000)
        .retry_delay(Duration::ZERO)
        .rate_limit_backoff(Duration::ZERO)
        .build()
        .unwrap();
    Arc::new(AiClient::new(config, backend))
}

pub fn registry(extractor: Arc<FakeExtractor>, backend: Arc<ScriptedBackend>) -> ToolRegistry {
    registry_with_limits(extractor, backend, FileLimits::default())
}

pub fn registry_with_limits(
    extractor: Arc<FakeExtractor>,
    backend: Arc<ScriptedBackend>,
    limits: FileLimits,
) -> ToolRegistry {
    ToolRegistry::standard(
        extractor,
        Chunker::new(small_chunks(), Arc::new(TokenCounter::new())),
        client(backend),
        limits,
        test_prompts(),
    )
}
