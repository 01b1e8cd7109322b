//! Prompt templates for the two model-backed tools.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing what "noise" means or how
//!    formulas are rendered requires editing exactly one place.
//!
//! 2. **Testability**: unit tests can inspect prompts directly without a
//!    model, so a template that loses its `{content}` placeholder is caught
//!    before it ships.
//!
//! Deployments can replace either template at start-up with
//! [`PromptSet::load_dir`], which reads `filter_content.md` and
//! `text_to_markdown.md` from a directory.

use std::path::Path;
use tracing::info;

/// Placeholder replaced with the tool's input text.
pub const CONTENT_PLACEHOLDER: &str = "{content}";

/// Default template for `filter_content`.
pub const FILTER_CONTENT_PROMPT: &str = r#"You are cleaning up text extracted from lecture material (slides, handouts, transcripts).

Remove noise that carries no teaching content:
- Page numbers, slide numbers and "Page X of Y" markers
- Headers and footers repeated on every page (course codes, university names, dates)
- Navigation text ("next slide", "back to contents", "click here")
- Copyright lines, logos described as text, and watermarks
- Stray characters produced by PDF extraction

Keep everything that teaches:
- Definitions, theorems, proofs, examples and exercises
- Formulas exactly as written, including LaTeX between $ or $$ delimiters
- Code, in full, including indentation
- Section titles and the order of the material
- Lines starting with "=== Page" and "[Previous context...]" markers

Do not summarise, paraphrase, translate or add anything.
Output ONLY the cleaned text, with no commentary.

TEXT:
{content}"#;

/// Default template for `text_to_markdown`.
pub const TEXT_TO_MARKDOWN_PROMPT: &str = r#"Convert the following lecture text into clean, well-structured Markdown.

Rules:
1. STRUCTURE
   - Use ## for major topics and ### for subtopics; do not use #
   - Turn bullet-like lines into - lists and numbered steps into 1. 2. 3. lists
   - Use **bold** for defined terms
2. MATHEMATICS
   - Write inline formulas as $...$ and display formulas as $$...$$ using LaTeX
   - Repair formulas broken across lines by text extraction
3. CODE
   - Wrap code in fenced blocks with a language identifier when it is clear
4. CONTEXT MARKERS
   - Text under "[Previous context...]" repeats the end of the previous part;
     use it for continuity but do not output it again
   - Drop "=== Page N ===" markers
5. OUTPUT
   - Preserve every piece of content; do not summarise or add commentary
   - Output ONLY the Markdown; do NOT wrap it in ```markdown fences

TEXT:
{content}"#;

/// The templates used by one tool registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub filter_content: String,
    pub text_to_markdown: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            filter_content: FILTER_CONTENT_PROMPT.to_string(),
            text_to_markdown: TEXT_TO_MARKDOWN_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Defaults, overridden by `<dir>/filter_content.md` and
    /// `<dir>/text_to_markdown.md` where those files exist.
    pub fn load_dir(dir: &Path) -> std::io::Result<Self> {
        let mut set = Self::default();
        for (name, slot) in [
            ("filter_content", &mut set.filter_content),
            ("text_to_markdown", &mut set.text_to_markdown),
        ] {
            let path = dir.join(format!("{name}.md"));
            if path.is_file() {
                *slot = std::fs::read_to_string(&path)?;
                info!("Loaded {} prompt from {}", name, path.display());
            }
        }
        Ok(set)
    }
}

/// Substitute `content` into `template`.
pub fn render(template: &str, content: &str) -> String {
    template.replace(CONTENT_PLACEHOLDER, content)
}
