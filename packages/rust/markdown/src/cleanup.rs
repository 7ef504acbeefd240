//! Post-conversion cleanup pipeline for Markdown output.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! htmd output is already mostly sane; these passes squeeze the blank-line
//! runs and editor droppings that survive conversion.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = collapse_blank_lines(&result);
    result = strip_leftover_html(&result);
    result = normalize_whitespace(&result);
    result = trim_document(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Collapse blank-line runs
// ---------------------------------------------------------------------------

/// Allow at most one blank line between blocks.
fn collapse_blank_lines(md: &str) -> String {
    static BLANKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    BLANKS_RE.replace_all(md, "\n\n").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 2: Strip leftover HTML wrappers
// ---------------------------------------------------------------------------

/// Remove structural tags htmd passes through unconverted.
///
/// Rich-text editors wrap content in `<div>`/`<span>`/`<font>` layers that
/// carry no Markdown meaning. Lines inside fenced code blocks are left
/// untouched so HTML examples survive.
fn strip_leftover_html(md: &str) -> String {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)</?(?:div|span|figure|figcaption|font|center)\b[^>]*>")
            .expect("valid regex")
    });

    let mut in_code_block = false;
    let mut lines: Vec<String> = Vec::new();

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            lines.push(line.to_string());
            continue;
        }
        if in_code_block {
            lines.push(line.to_string());
        } else {
            lines.push(TAG_RE.replace_all(line, "").into_owned());
        }
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Whitespace normalization
// ---------------------------------------------------------------------------

/// Strip trailing whitespace from every line.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Document edges
// ---------------------------------------------------------------------------

/// Trim leading and trailing blank space and end with exactly one newline.
fn trim_document(md: &str) -> String {
    format!("{}\n", md.trim())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
