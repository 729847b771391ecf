//! Error types for the installation pipeline with context and recovery information

use std::path::PathBuf;
use thiserror::Error;

/// Every failure the pipeline can surface to its caller
#[derive(Error, Debug)]
pub enum InstallError {
    /// A local path or a file the flow depends on does not exist
    #[error("Source not found: '{path}'")]
    SourceNotFound { path: PathBuf },

    /// The source string is neither a supported URL nor a supported local file
    #[error("Unsupported source '{source_str}': {reason}")]
    InvalidSource { source_str: String, reason: String },

    /// The archive does not contain an installable asset folder
    #[error("Invalid package '{path}': {reason}")]
    InvalidPackage { path: PathBuf, reason: String },

    /// The archive could not be opened or extracted
    #[error("Failed to extract archive '{path}'")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Network-layer failure while talking to the remote host
    #[error("HTTP request to '{url}' failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote host answered with a non-success status
    #[error("HTTP request to '{url}' returned status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Retry budget exhausted for a remote fetch
    #[error("Download of '{url}' failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: usize,
        last_error: String,
    },

    /// The primary model or the texture is absent from the asset folder
    #[error("Required asset '*.{extension}' not found in '{folder}'")]
    MissingRequiredAsset { folder: PathBuf, extension: String },

    /// The package identifier is empty once sanitized
    #[error("Invalid package identifier '{identifier}'")]
    InvalidIdentifier { identifier: String },

    /// Template rendering or XML rewriting failed
    #[error("Failed to render template '{template}': {message}")]
    Template { template: String, message: String },

    /// The manifest could not be serialized
    #[error("Failed to write manifest '{path}': {message}")]
    Manifest { path: PathBuf, message: String },

    /// File system I/O errors with file context
    #[error("File operation failed: {operation} '{path}'")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Coarse classification of [`InstallError`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceNotFound,
    InvalidSource,
    InvalidPackage,
    TransientNetworkFailure,
    MissingRequiredAsset,
    /// Never returned as an error: a corrupt manifest is replaced, see [`crate::registry`]
    RegistryCorrupt,
    InvalidIdentifier,
    Template,
    FileSystem,
    Internal,
}

/// Types of file operations for error context
#[derive(Debug, Clone, PartialEq)]
pub enum FileOperation {
    Read,
    Write,
    Copy,
    Move,
    Delete,
    CreateDir,
    ListDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Copy => write!(f, "copying"),
            FileOperation::Move => write!(f, "moving"),
            FileOperation::Delete => write!(f, "deleting"),
            FileOperation::CreateDir => write!(f, "creating directory"),
            FileOperation::ListDir => write!(f, "listing directory"),
        }
    }
}

pub type Result<T> = std::result::Result<T, InstallError>;

/// Full cause chain of an error on one line
pub(crate) fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl InstallError {
    /// Build a [`InstallError::FileSystem`] from an I/O error
    pub fn fs<P: Into<PathBuf>>(path: P, operation: FileOperation, source: std::io::Error) -> Self {
        InstallError::FileSystem {
            path: path.into(),
            operation,
            source,
        }
    }

    pub(crate) fn template<S: Into<String>>(template: S, message: impl std::fmt::Display) -> Self {
        InstallError::Template {
            template: template.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallError::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            InstallError::InvalidSource { .. } => ErrorKind::InvalidSource,
            InstallError::InvalidPackage { .. } => ErrorKind::InvalidPackage,
            InstallError::Archive { .. } => ErrorKind::InvalidPackage,
            InstallError::Http { .. } => ErrorKind::TransientNetworkFailure,
            InstallError::HttpStatus { .. } => ErrorKind::TransientNetworkFailure,
            InstallError::RetriesExhausted { .. } => ErrorKind::TransientNetworkFailure,
            InstallError::MissingRequiredAsset { .. } => ErrorKind::MissingRequiredAsset,
            InstallError::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            InstallError::Template { .. } => ErrorKind::Template,
            InstallError::Manifest { .. } => ErrorKind::FileSystem,
            InstallError::FileSystem { .. } => ErrorKind::FileSystem,
            InstallError::Task(_) => ErrorKind::Internal,
        }
    }

    /// Check if error is recoverable (the fetch should be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            InstallError::Http { .. } => true,
            InstallError::HttpStatus { .. } => true,
            InstallError::RetriesExhausted { .. } => false, // Already exhausted retries
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            InstallError::SourceNotFound { .. } => "source_not_found",
            InstallError::InvalidSource { .. } => "invalid_source",
            InstallError::InvalidPackage { .. } => "invalid_package",
            InstallError::Archive { .. } => "archive",
            InstallError::Http { .. } => "http_request",
            InstallError::HttpStatus { .. } => "http_status",
            InstallError::RetriesExhausted { .. } => "retries_exhausted",
            InstallError::MissingRequiredAsset { .. } => "missing_required_asset",
            InstallError::InvalidIdentifier { .. } => "invalid_identifier",
            InstallError::Template { .. } => "template",
            InstallError::Manifest { .. } => "manifest",
            InstallError::FileSystem { .. } => "file_system",
            InstallError::Task(_) => "task",
        }
    }
}
