//! HTML-to-Markdown conversion for knowledge base answer bodies.
//!
//! Zammad bodies are HTML fragments produced by a rich-text editor (no
//! `<html>` wrapper, frequently pasted in from Word or Outlook). Conversion
//! runs through `htmd`, with `<table>` elements lifted out and rendered to
//! pipe tables beforehand because htmd 0.1 has no table support.

mod cleanup;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use kbmirror_shared::{MirrorError, Result};

/// Placeholder stem for lifted tables. Each table becomes a one-word
/// paragraph htmd passes through verbatim, swapped back after cleanup so
/// the rendered rows survive htmd's whitespace collapsing.
const TABLE_TOKEN: &str = "kbmirror-table-";

/// Convert an HTML fragment to cleaned Markdown.
///
/// Empty or whitespace-only input converts to an empty string; any other
/// output ends with exactly one newline.
pub fn convert(html: &str) -> Result<String> {
    if html.trim().is_empty() {
        return Ok(String::new());
    }

    let (html, tables) = lift_tables(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style"])
        .build();

    let raw_markdown = converter
        .convert(&html)
        .map_err(|e| MirrorError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(
        raw_len = raw_markdown.len(),
        tables = tables.len(),
        "htmd conversion complete"
    );

    let cleaned = cleanup::run_pipeline(&raw_markdown);
    let restored = restore_tables(&cleaned, &tables);

    if restored.trim().is_empty() {
        return Ok(String::new());
    }
    Ok(restored)
}

// ---------------------------------------------------------------------------
// Table handling
// ---------------------------------------------------------------------------

/// Replace each `<table>` with a placeholder paragraph and return the
/// rewritten fragment plus the rendered pipe tables in document order.
fn lift_tables(html: &str) -> (String, Vec<String>) {
    let doc = Html::parse_fragment(html);
    let table_sel = Selector::parse("table").unwrap();

    if doc.select(&table_sel).next().is_none() {
        return (html.to_string(), Vec::new());
    }

    // Work on the reserialized fragment so the outer-HTML replacement below
    // matches exactly (parsing normalizes things like implied <tbody>).
    let mut rewritten = doc.root_element().inner_html();
    let mut tables = Vec::new();

    for (i, table_el) in doc.select(&table_sel).enumerate() {
        let placeholder = format!("<p>{TABLE_TOKEN}{i}</p>");
        rewritten = rewritten.replacen(&table_el.html(), &placeholder, 1);
        tables.push(table_to_markdown(&table_el));
    }

    (rewritten, tables)
}

/// Swap lifted-table placeholders back in after conversion and cleanup.
fn restore_tables(markdown: &str, tables: &[String]) -> String {
    let mut result = markdown.to_string();
    for (i, table) in tables.iter().enumerate() {
        let token = format!("{TABLE_TOKEN}{i}");
        result = result.replacen(&token, table, 1);
    }
    result
}

/// Render a single `<table>` element as a GitHub-style pipe table.
///
/// The first row always becomes the header row (Markdown tables require
/// one); editor tables frequently have no `<th>` cells at all.
fn table_to_markdown(table: &ElementRef) -> String {
    let tr_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("th, td").unwrap();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for tr in table.select(&tr_sel) {
        let cells: Vec<String> = tr
            .select(&cell_sel)
            .map(|cell| {
                cell.text()
                    .collect::<String>()
                    .trim()
                    .replace('\n', " ")
            })
            .collect();
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    if rows.is_empty() {
        return String::new();
    }

    // Pad ragged rows out to the widest row
    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(col_count, String::new());
    }

    let render_row = |cells: &[String]| format!("| {} |", cells.join(" | "));
    let separator = vec!["---".to_string(); col_count];

    let mut md = String::new();
    md.push_str(&render_row(&rows[0]));
    md.push('\n');
    md.push_str(&render_row(&separator));
    for row in &rows[1..] {
        md.push('\n');
        md.push_str(&render_row(row));
    }
    md
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
