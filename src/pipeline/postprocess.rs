//! Deterministic cleanup of model-generated Markdown.
//!
//! The formatting prompt asks for bare Markdown, but models still wrap
//! answers in code fences, emit `\r\n`, pad lines with spaces, or leave
//! zero-width characters copied from the PDF text layer. These passes fix
//! structure only; they never rewrite words.
//!
//! The result is trimmed rather than newline-terminated because chunk
//! outputs are joined with a `---` separator afterwards.

use once_cell::sync::Lazy;
use regex::Regex;

/// Run every cleanup pass over one chunk's Markdown.
///
/// Order matters: fences come off before line-level passes see the text,
/// and line endings are normalised before anything splits on `\n`.
pub fn clean_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = strip_line_ends(&s);
    let s = squeeze_blank_runs(&s);
    let s = space_headings(&s);
    let s = drop_extra_table_rules(&s);
    let s = drop_invisible(&s);
    s.trim().to_string()
}

// ── Fences ───────────────────────────────────────────────────────────────

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_FENCED.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Whitespace ───────────────────────────────────────────────────────────

fn strip_line_ends(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

/// Three or more blank lines become two.
fn squeeze_blank_runs(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n\n").into_owned()
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} \S").unwrap());

/// A heading that directly follows a text line gets a blank line before it.
fn space_headings(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in input.lines() {
        let follows_text = out.last().is_some_and(|prev| !prev.is_empty());
        if RE_HEADING.is_match(line) && follows_text {
            out.push("");
        }
        out.push(line);
    }
    out.join("\n")
}

// ── Tables ───────────────────────────────────────────────────────────────

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_rule_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// GFM allows one `|---|` rule, directly under the header. Models sometimes
/// repeat it between body rows.
fn drop_extra_table_rules(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut row_in_table = 0usize;

    for line in input.lines() {
        if !is_table_row(line) {
            row_in_table = 0;
            out.push(line);
            continue;
        }
        row_in_table += 1;
        if is_rule_row(line) && row_in_table != 2 {
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}

// ── Unicode ──────────────────────────────────────────────────────────────

const INVISIBLE: [char; 6] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'];

fn drop_invisible(input: &str) -> String {
    input.replace(INVISIBLE, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence() {
        assert_eq!(strip_outer_fence("```markdown\n# Hi\nthere\n```"), "# Hi\nthere");
        assert_eq!(strip_outer_fence("```\n# Hi\n```\n"), "# Hi");
    }

    #[test]
    fn keeps_inner_code_blocks() {
        let input = "# Code\n\n```rust\nfn main() {}\n```";
        assert_eq!(strip_outer_fence(input), input);
    }

    #[test]
    fn squeezes_blank_lines() {
        assert_eq!(squeeze_blank_runs("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(squeeze_blank_runs("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn headings_get_breathing_room() {
        assert_eq!(space_headings("intro\n## Part 2\nbody"), "intro\n\n## Part 2\nbody");
        assert_eq!(space_headings("# Top\ntext"), "# Top\ntext");
        assert_eq!(space_headings("#hashtag\n"), "#hashtag");
    }

    #[test]
    fn removes_body_rules_only() {
        let input = "| A | B |\n| --- | --- |\n| 1 | 2 |\n|---|---|\n| 3 | 4 |";
        let out = drop_extra_table_rules(input);
        assert_eq!(out, "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |");
    }

    #[test]
    fn removes_invisible_characters() {
        assert_eq!(drop_invisible("eigen\u{200B}value\u{00AD}s\u{FEFF}"), "eigenvalues");
    }

    #[test]
    fn full_cleanup() {
        let raw = "```markdown\r\n# Lecture 3   \r\nNotes\u{200B}\r\n## Proof\r\n\r\n\r\n\r\n\r\nDone\r\n```\r\n";
        assert_eq!(clean_markdown(raw), "# Lecture 3\nNotes\n\n## Proof\n\n\nDone");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(clean_markdown("   \n\n"), "");
    }
}
