//! Per-invocation scratch directory

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{FileOperation, InstallError, Result};
use crate::files;

/// Randomly named temporary directory holding every download and extraction
/// of one install. Removed when dropped, whatever the outcome.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace under `root`, creating `root` if needed.
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| InstallError::fs(root, FileOperation::CreateDir, e))?;
        let dir = tempfile::Builder::new()
            .prefix("lml-install-")
            .tempdir_in(root)
            .map_err(|e| InstallError::fs(root, FileOperation::CreateDir, e))?;
        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a file directly inside the workspace
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Create (if needed) and return a subdirectory
    pub async fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        files::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Remove the workspace now and report failures
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|e| InstallError::fs(path, FileOperation::Delete, e))
    }
}
