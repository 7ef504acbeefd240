//! Knowledge base export: turns one Zammad knowledge base into a tree of
//! Markdown files with YAML frontmatter, mirrored category folders, and
//! locally materialized images.
//!
//! The public surface is small: build an [`ExportContext`] around a
//! configured client, hand it to [`run_export`] together with a
//! [`ProgressReporter`], and read the [`ExportSummary`] back.

mod answers;
mod context;
mod images;
mod output;
mod walker;

pub use context::ExportContext;
pub use walker::{ExportSummary, ProgressReporter, SilentProgress, run_export};
