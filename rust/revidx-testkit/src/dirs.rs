use std::path::PathBuf;

use tempfile::TempDir;

/// A scratch directory with a not yet existing `index` subdirectory.
///
/// Builds are expected to create the index directory themselves.
pub struct ScratchDir {
    root: TempDir,
}

impl ScratchDir {
    pub fn new() -> anyhow::Result<ScratchDir> {
        Ok(ScratchDir {
            root: tempfile::Builder::new().prefix("revidx-").tempdir()?,
        })
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.path().join("index")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}
