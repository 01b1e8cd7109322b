//! Token counting and truncation with the `cl100k_base` encoding.
//!
//! The same BPE vocabulary most hosted LLM APIs account in, so counts here
//! track what the downstream model will bill and enforce closely enough to
//! size chunks against a context window.
//!
//! ## Degraded mode
//!
//! If the encoding cannot be loaded, or a token slice cannot be decoded back
//! to UTF-8, the counter falls back to the 4-characters-per-token heuristic.
//! Every fallback is logged at `warn!` so estimates never pass silently as
//! exact counts.

use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

/// Characters per token assumed by the fallback estimator.
const CHARS_PER_TOKEN: usize = 4;

/// Tokens a decode may shed to land on a UTF-8 boundary before giving up.
const MAX_BOUNDARY_SHIFT: usize = 3;

/// Counts and truncates text by token count.
///
/// Loading the encoding is expensive; build one instance at start-up and
/// share it behind an `Arc`.
pub struct TokenCounter {
    encoding: Option<CoreBPE>,
    encoding_name: &'static str,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding_name", &self.encoding_name)
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter {
    /// Load `cl100k_base`, falling back to estimation if it fails to load.
    pub fn new() -> Self {
        match tiktoken_rs::cl100k_base() {
            Ok(encoding) => {
                debug!("Initialized TokenCounter with encoding: cl100k_base");
                Self {
                    encoding: Some(encoding),
                    encoding_name: "cl100k_base",
                }
            }
            Err(e) => {
                warn!(
                    "Failed to load cl100k_base encoding ({}); token counts will be estimated",
                    e
                );
                Self::estimating()
            }
        }
    }

    /// A counter that always uses the character heuristic.
    pub fn estimating() -> Self {
        Self {
            encoding: None,
            encoding_name: "estimate",
        }
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding_name
    }

    /// `true` when no real encoding is loaded.
    pub fn is_degraded(&self) -> bool {
        self.encoding.is_none()
    }

    /// Number of tokens in `text`. Empty text is 0 tokens.
    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match &self.encoding {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => estimate_tokens(text),
        }
    }

    /// Keep the first `max_tokens` tokens of `text`.
    ///
    /// Returns `text` unchanged when it already fits. Otherwise the kept
    /// prefix is decoded back to text and `"..."` appended if `add_ellipsis`.
    pub fn truncate_to_tokens(&self, text: &str, max_tokens: usize, add_ellipsis: bool) -> String {
        if text.is_empty() {
            return String::new();
        }
        let ellipsis = if add_ellipsis { "..." } else { "" };

        let Some(bpe) = &self.encoding else {
            if estimate_tokens(text) <= max_tokens {
                return text.to_string();
            }
            return format!("{}{}", char_head(text, max_tokens * CHARS_PER_TOKEN), ellipsis);
        };

        let tokens = bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        // A cut can land inside a multi-byte character; shed a token or two.
        for shift in 0..=MAX_BOUNDARY_SHIFT.min(max_tokens) {
            if let Ok(decoded) = bpe.decode(tokens[..max_tokens - shift].to_vec()) {
                debug!("Truncated text from {} to {} tokens", tokens.len(), max_tokens - shift);
                return format!("{decoded}{ellipsis}");
            }
        }

        warn!(
            "Token decode failed while truncating to {} tokens; falling back to character slicing",
            max_tokens
        );
        format!("{}{}", char_head(text, max_tokens * CHARS_PER_TOKEN), ellipsis)
    }

    /// Keep the last `max_tokens` tokens of `text`.
    pub fn tail_tokens(&self, text: &str, max_tokens: usize) -> String {
        if text.is_empty() || max_tokens == 0 {
            return String::new();
        }

        let Some(bpe) = &self.encoding else {
            return char_tail(text, max_tokens * CHARS_PER_TOKEN).to_string();
        };

        let tokens = bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        let start = tokens.len() - max_tokens;
        for shift in 0..=MAX_BOUNDARY_SHIFT.min(max_tokens - 1) {
            if let Ok(decoded) = bpe.decode(tokens[start + shift..].to_vec()) {
                return decoded;
            }
        }

        warn!(
            "Token decode failed while taking last {} tokens; falling back to character slicing",
            max_tokens
        );
        char_tail(text, max_tokens * CHARS_PER_TOKEN).to_string()
    }
}

fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

fn char_head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn char_tail(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
