//! LML Installer Library
//!
//! This library turns third-party vehicle and DLC content into packages for
//! Lenny's Mod Loader. It acquires the content from a local path or a URL,
//! extracts archives, composes the canonical package folder with generated
//! metadata, installs auxiliary lighting definitions and registers the
//! package in the loader's manifest.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lml_installer::{InstallRequest, Installer, InstallerConfig, ProgressEvent};
//! use std::sync::Arc;
//!
//! # async fn example() -> lml_installer::Result<()> {
//! let config = InstallerConfig::builder("C:/Games/GTAV")
//!     .max_attempts(3)
//!     .build();
//!
//! let installer = Installer::new(config)?.with_progress_callback(Arc::new(|event: ProgressEvent| {
//!     if let ProgressEvent::Progress { percent } = event {
//!         println!("Progress: {}%", percent);
//!     }
//! }));
//!
//! let request = InstallRequest::parse("dlctolml:?url=https://example.com/falcon.zip", None)?;
//! let outcome = installer.install(&request).await?;
//! println!("Installed {}", outcome.package.folder);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Sources**: local folders, `.zip` archives and `.rpf` binaries, http(s) URLs and protocol links
//! - **Retry logic**: fixed-interval retries for remote fetches with progress events per attempt
//! - **Package configuration**: `dlc_config.ini` naming, handling overrides and lighting mapping
//! - **Templates**: generated vehicle metadata and descriptors, handling presets
//! - **Manifest**: idempotent registration with backup of unreadable manifests

pub mod composer;
pub mod config;
pub mod error;
pub mod files;
pub mod ini;
pub mod lighting;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod sanitize;
pub mod source;
pub mod templates;

// Re-export commonly used types for convenience
pub use composer::{Package, PackageComposer, PackageKind};
pub use config::InstallerConfig;
pub use error::{ErrorKind, FileOperation, InstallError, Result};
pub use ini::PackageConfig;
pub use pipeline::{InstallOutcome, Installer};
pub use progress::{
    CompositeProgressReporter, ConsoleProgressReporter, InstallStage, IntoProgressCallback,
    NullProgressReporter, ProgressCallback, ProgressEvent, ProgressReporter,
};
pub use registry::{ManifestParseError, ModEntry, RegistryChange, RegistryDocument, RegistryUpdater};
pub use sanitize::{sanitize_identifier, sanitize_name};
pub use source::{Fetcher, HttpFetcher, InstallRequest, SourceAsset, SourceSpec};
pub use templates::{HandlingPresets, TemplateEngine};
