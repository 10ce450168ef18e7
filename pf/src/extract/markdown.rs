//! Best-effort repair of model markdown
//!
//! Streaming models often collapse a table onto one line
//! (`| A | B | |---|---| | 1 | 2 |`) or send escaped newlines. These
//! heuristics put rows back on their own lines. They never touch text that
//! has no pipes or escapes in it.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid markdown regex")
}

// Header row followed by separator row
static HEADER_THEN_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| re(r"(\|)[ \t]+(\|[-:]+)"));
// Separator row followed by a data row
static SEPARATOR_THEN_ROW: LazyLock<Regex> = LazyLock::new(|| re(r"([-:]+\|)[ \t]+(\|[ \t]*[A-Za-z0-9])"));
// Two data rows on one line, separated by a wide gap
static ROW_THEN_ROW: LazyLock<Regex> = LazyLock::new(|| re(r"(\|)[ \t]{2,}(\|[ \t]*[A-Za-z0-9])"));

static LOOSE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| re(r"\|[ \t]*(\|[-:]+[-:| \t]+)"));
static LOOSE_ROW_START: LazyLock<Regex> = LazyLock::new(|| re(r"([-:]+\|)[ \t]*(\|[ \t]*[^-|\s])"));
static WIDE_GAP: LazyLock<Regex> = LazyLock::new(|| re(r"\|[ \t]{3,}\|"));
// A row ending and a separator run glued together on one line
static GLUED_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| re(r"\|[ \t]*\|[-:]{3,}"));

fn normalize_escapes(content: &str) -> String {
    content
        .replace("\\n", "\n")
        .replace("\\t", "  ")
        .replace("\r\n", "\n")
}

/// Normalize escapes and split single-line tables into rows
pub fn sanitize_markdown(content: &str) -> String {
    debug!(len = content.len(), "sanitize_markdown: called");
    let text = normalize_escapes(content);
    let text = HEADER_THEN_SEPARATOR.replace_all(&text, "${1}\n${2}");
    let text = SEPARATOR_THEN_ROW.replace_all(&text, "${1}\n${2}");
    let text = ROW_THEN_ROW.replace_all(&text, "${1}\n${2}");
    text.into_owned()
}

/// More aggressive table splitting, for output `sanitize_markdown` can't fix
pub fn fix_tables(content: &str) -> String {
    debug!(len = content.len(), "fix_tables: called");
    let text = content.replace("\\n", "\n");
    let text = LOOSE_SEPARATOR.replace_all(&text, "|\n${1}");
    let text = LOOSE_ROW_START.replace_all(&text, "${1}\n${2}");
    let text = WIDE_GAP.replace_all(&text, "|\n|");
    text.into_owned()
}

/// Whether a table row still shares its line with another row
pub fn has_collapsed_table(content: &str) -> bool {
    content
        .lines()
        .any(|line| GLUED_SEPARATOR.is_match(line) || WIDE_GAP.is_match(line))
}
