//! Output tree layout and file writing.
//!
//! Everything lands under a single root: category folders mirror the
//! knowledge base hierarchy, answers are `{slug}.md` inside them, every
//! category gets an `_index.md`, and all images share one flat `images/`
//! directory at the root.

use std::path::{Path, PathBuf};

use tracing::info;

use kbmirror_shared::{MirrorError, Result};

pub(crate) struct OutputTree {
    root: PathBuf,
}

impl OutputTree {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub(crate) fn answer_path(&self, parts: &[String], slug: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in parts {
            path.push(part);
        }
        path.push(format!("{slug}.md"));
        path
    }

    pub(crate) fn index_path(&self, parts: &[String]) -> PathBuf {
        let mut path = self.root.clone();
        for part in parts {
            path.push(part);
        }
        path.push("_index.md");
        path
    }

    /// Write a Markdown file, creating parent directories as needed.
    pub(crate) fn write_markdown(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MirrorError::io(parent, e))?;
        }
        std::fs::write(path, content).map_err(|e| MirrorError::io(path, e))?;

        let shown = path.strip_prefix(&self.root).unwrap_or(path);
        info!(path = %shown.display(), "wrote");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_nest_under_category_parts() {
        let tree = OutputTree::new("/tmp/kb");
        let parts = vec!["fleet-ops".to_string(), "gunnery".to_string()];

        assert_eq!(
            tree.answer_path(&parts, "calibrating-turrets"),
            PathBuf::from("/tmp/kb/fleet-ops/gunnery/calibrating-turrets.md")
        );
        assert_eq!(
            tree.index_path(&parts),
            PathBuf::from("/tmp/kb/fleet-ops/gunnery/_index.md")
        );
    }

    #[test]
    fn root_answers_have_no_folder() {
        let tree = OutputTree::new("/tmp/kb");
        assert_eq!(
            tree.answer_path(&[], "orphan"),
            PathBuf::from("/tmp/kb/orphan.md")
        );
    }

    #[test]
    fn images_live_in_one_flat_dir() {
        let tree = OutputTree::new("/tmp/kb");
        assert_eq!(tree.images_dir(), PathBuf::from("/tmp/kb/images"));
    }

    #[test]
    fn write_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let tree = OutputTree::new(tmp.path());
        let path = tree.answer_path(&["a".to_string(), "b".to_string()], "deep");

        tree.write_markdown(&path, "# Deep\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Deep\n");
    }
}
