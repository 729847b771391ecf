//! Auxiliary lighting definitions
//!
//! Lighting XML files live outside the package, in one shared folder of the
//! game directory. Existing files with the same name are overwritten.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{FileOperation, InstallError, Result};
use crate::files;
use crate::ini::PackageConfig;
use crate::progress::ProgressSink;
use crate::sanitize::{sanitize_identifier, sanitize_name};
use crate::source::SourceAsset;

/// Folder inside a metadata archive holding lighting definitions
pub const LIGHTING_SOURCE_DIR: &str = "els";

/// Copies lighting definitions into the shared target folder
#[derive(Debug, Clone)]
pub struct LightingInstaller {
    target: PathBuf,
    progress: ProgressSink,
}

impl LightingInstaller {
    pub fn new<P: Into<PathBuf>>(target: P, progress: ProgressSink) -> Self {
        Self {
            target: target.into(),
            progress,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    async fn copy_into_target(&self, src: &Path, file_name: &str) -> Result<PathBuf> {
        files::create_dir_all(&self.target).await?;
        let dest = self.target.join(file_name);
        files::copy_file(src, &dest).await?;
        Ok(dest)
    }

    /// Install definitions from an extracted metadata archive rooted at
    /// `metadata_root`, as the configuration directs.
    ///
    /// Pack mode wins over single-asset mode when both flags are set.
    pub async fn install_from_metadata(
        &self,
        metadata_root: &Path,
        config: &PackageConfig,
    ) -> Result<Vec<PathBuf>> {
        let source_dir = metadata_root.join(LIGHTING_SOURCE_DIR);
        if !source_dir.is_dir() {
            debug!("No lighting folder in {}", metadata_root.display());
            return Ok(Vec::new());
        }

        if config.is_vehicle_pack {
            self.install_pack(&source_dir, config).await
        } else if config.has_els {
            Ok(self
                .install_single(&source_dir, config.spawn_name())
                .await?
                .into_iter()
                .collect())
        } else {
            Ok(Vec::new())
        }
    }

    /// Pack mode: every mapped file present in `source_dir`, under its own
    /// (sanitized) name. Empty mappings and missing files are skipped.
    pub async fn install_pack(&self, source_dir: &Path, config: &PackageConfig) -> Result<Vec<PathBuf>> {
        let mut installed = Vec::new();

        for (vehicle, file) in &config.vehicle_els {
            let file = file.trim();
            if file.is_empty() {
                debug!("No lighting file mapped for '{}'", vehicle);
                continue;
            }

            let src = source_dir.join(file);
            if !src.is_file() {
                debug!("Lighting file {} for '{}' not found", src.display(), vehicle);
                continue;
            }

            let Some(file_name) = Path::new(file).file_name() else {
                continue;
            };
            let dest = self
                .copy_into_target(&src, &sanitize_name(&file_name.to_string_lossy()))
                .await?;
            installed.push(dest);
        }

        info!("Installed {} lighting definitions", installed.len());
        Ok(installed)
    }

    /// Single-asset mode: the first `.xml` of `source_dir`, renamed after the
    /// spawn name. Without a spawn name nothing is copied and a warning is
    /// reported.
    pub async fn install_single(&self, source_dir: &Path, spawn_name: Option<&str>) -> Result<Option<PathBuf>> {
        let Some(spawn_name) = spawn_name.filter(|name| !name.trim().is_empty()) else {
            let message = "Lighting is enabled but no spawn name is configured; lighting definition not installed";
            warn!("{}", message);
            self.progress.warning(message);
            return Ok(None);
        };

        let Some(src) = first_xml(source_dir).await? else {
            debug!("No lighting definition in {}", source_dir.display());
            return Ok(None);
        };

        let dest = self
            .copy_into_target(&src, &format!("{}.xml", sanitize_identifier(spawn_name)))
            .await?;
        info!("Installed lighting definition {}", dest.display());
        Ok(Some(dest))
    }

    /// The asset folder's own lighting definition, renamed to `{name}.xml`
    pub async fn install_from_asset(&self, asset: &SourceAsset, name: &str) -> Result<Option<PathBuf>> {
        let Some(src) = asset.lighting.as_deref() else {
            return Ok(None);
        };
        let dest = self.copy_into_target(src, &format!("{}.xml", name)).await?;
        info!("Installed lighting definition {}", dest.display());
        Ok(Some(dest))
    }
}

async fn first_xml(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| InstallError::fs(dir, FileOperation::ListDir, e))?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| InstallError::fs(dir, FileOperation::ListDir, e))?
    {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xml")) {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}
