//! Shared types, error model, and configuration for kbmirror.
//!
//! This crate is the foundation depended on by all other kbmirror crates.
//! It provides:
//! - [`MirrorError`] — the unified error type with its fatal/recoverable split
//! - Domain types ([`KnowledgeBase`], [`Category`], [`AnswerMeta`], [`AnswerStatus`])
//! - Configuration ([`AppConfig`], config loading, credential resolution)
//! - Slug generation for the on-disk layout

pub mod config;
pub mod error;
pub mod slug;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExportConfig, ServerConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_base_url, resolve_token,
};
pub use error::{MirrorError, Result};
pub use slug::slugify;
pub use types::{AnswerMeta, AnswerStatus, Category, KnowledgeBase};
