//! File operation utilities
//!
//! Every helper attaches the path and operation to I/O failures so callers
//! can propagate with `?`.

use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::error::{FileOperation, InstallError, Result};

/// How a source file reaches its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// The source is owned by the caller and stays in place
    Copy,
    /// The source is a disposable artifact
    Move,
}

fn missing_or(path: &Path, operation: FileOperation, err: std::io::Error) -> InstallError {
    if err.kind() == IoErrorKind::NotFound {
        InstallError::SourceNotFound { path: path.to_path_buf() }
    } else {
        InstallError::fs(path, operation, err)
    }
}

pub async fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| InstallError::fs(path, FileOperation::CreateDir, e))
}

/// Write `contents` to `path`, replacing any existing file
pub async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    fs::write(path, contents)
        .await
        .map_err(|e| InstallError::fs(path, FileOperation::Write, e))
}

/// Copy `src` over `dest`. A missing source is [`InstallError::SourceNotFound`].
pub async fn copy_file(src: &Path, dest: &Path) -> Result<u64> {
    let bytes = fs::copy(src, dest)
        .await
        .map_err(|e| missing_or(src, FileOperation::Copy, e))?;
    debug!("Copied {} -> {} ({} bytes)", src.display(), dest.display(), bytes);
    Ok(bytes)
}

/// Move `src` to `dest`, falling back to copy and delete across filesystems
pub async fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if fs::rename(src, dest).await.is_ok() {
        debug!("Moved {} -> {}", src.display(), dest.display());
        return Ok(());
    }

    if dest.exists() {
        fs::remove_file(dest)
            .await
            .map_err(|e| InstallError::fs(dest, FileOperation::Delete, e))?;
    }
    copy_file(src, dest).await?;
    fs::remove_file(src)
        .await
        .map_err(|e| InstallError::fs(src, FileOperation::Delete, e))?;
    debug!("Moved {} -> {} by copy", src.display(), dest.display());
    Ok(())
}

pub async fn transfer_file(src: &Path, dest: &Path, transfer: Transfer) -> Result<()> {
    match transfer {
        Transfer::Copy => copy_file(src, dest).await.map(|_| ()),
        Transfer::Move => move_file(src, dest).await,
    }
}
