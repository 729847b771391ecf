//! Install pipeline
//!
//! [`Installer`] owns everything an install needs (configuration, templates,
//! presets, the fetcher and the progress sink) and drives one source through
//! acquisition, composition, lighting and registration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

use crate::composer::{Package, PackageComposer};
use crate::config::InstallerConfig;
use crate::error::{InstallError, Result};
use crate::files::Transfer;
use crate::ini::{self, CONFIG_FILE_NAME, PackageConfig};
use crate::lighting::LightingInstaller;
use crate::progress::{InstallStage, ProgressCallback, ProgressSink, ProgressSpan};
use crate::registry::{RegistryChange, RegistryUpdater};
use crate::source::{
    Fetcher, HttpFetcher, InstallRequest, SourceAsset, SourceSpec, Workspace, discover_asset_folder,
    extract_zip, url_file_stem,
};
use crate::templates::{HandlingPresets, TemplateEngine, presets};

const ARCHIVE_DOWNLOAD: &str = "download.zip";
const BINARY_DOWNLOAD: &str = "download.rpf";
const METADATA_DOWNLOAD: &str = "metadata.zip";
const EXTRACT_DIR: &str = "extract";
const METADATA_DIR: &str = "metadata";

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub package: Package,
    pub registry: RegistryChange,
    /// Lighting definitions written outside the package
    pub lighting: Vec<PathBuf>,
}

enum BinarySource<'s> {
    Local(&'s Path),
    Remote(&'s Url),
}

/// Runs installs against one game directory
pub struct Installer {
    config: InstallerConfig,
    templates: TemplateEngine,
    presets: HandlingPresets,
    fetcher: Arc<dyn Fetcher>,
    progress: ProgressSink,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("config", &self.config)
            .field("presets", &self.presets.names().collect::<Vec<_>>())
            .field("progress", &self.progress)
            .finish()
    }
}

impl Installer {
    pub fn new(config: InstallerConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Ok(Self {
            templates: TemplateEngine::new()?,
            presets: HandlingPresets::builtin(),
            fetcher,
            progress: ProgressSink::default(),
            config,
        })
    }

    pub fn with_fetcher<F: Fetcher + 'static>(mut self, fetcher: F) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = ProgressSink::new(Some(callback));
        self
    }

    pub fn with_presets(mut self, presets: HandlingPresets) -> Self {
        self.presets = presets;
        self
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn presets(&self) -> &HandlingPresets {
        &self.presets
    }

    fn composer(&self) -> PackageComposer<'_> {
        PackageComposer::new(&self.config, &self.templates, self.progress.clone())
    }

    fn lighting(&self) -> LightingInstaller {
        LightingInstaller::new(self.config.lighting_dir(), self.progress.clone())
    }

    /// Install whatever `request` points at.
    pub async fn install(&self, request: &InstallRequest) -> Result<InstallOutcome> {
        info!(remote = request.source.is_remote(), "Installing {}", request.source);
        let identifier = request.identifier.as_deref();

        match &request.source {
            SourceSpec::LocalArchive(path) => self.install_vehicle_archive(path, identifier).await,
            SourceSpec::LocalFolder(path) => self.install_vehicle_folder(path, identifier).await,
            SourceSpec::RemoteArchive(url) => self.install_vehicle_url(url, identifier).await,
            SourceSpec::LocalBinary(path) => {
                self.install_dlc(BinarySource::Local(path), request.metadata.as_ref(), identifier)
                    .await
            }
            SourceSpec::RemoteBinary(url) => {
                self.install_dlc(BinarySource::Remote(url), request.metadata.as_ref(), identifier)
                    .await
            }
        }
    }

    /// Install a vehicle from a local zip archive.
    #[instrument(skip(self))]
    pub async fn install_vehicle_archive(&self, archive: &Path, identifier: Option<&str>) -> Result<InstallOutcome> {
        if !archive.is_file() {
            return Err(InstallError::SourceNotFound {
                path: archive.to_path_buf(),
            });
        }

        let workspace = Workspace::new(&self.config.temp_root)?;
        self.progress.report(10);
        self.progress.stage(InstallStage::Extracting);
        let extract_root = workspace.subdir(EXTRACT_DIR).await?;
        extract_zip(archive, &extract_root).await?;
        self.progress.report(25);

        let asset = discover_asset_folder(&extract_root).await?;
        let outcome = self.finish_vehicle(&extract_root, asset, identifier).await?;
        close(workspace);
        Ok(outcome)
    }

    /// Download a vehicle archive and install it.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn install_vehicle_url(&self, url: &Url, identifier: Option<&str>) -> Result<InstallOutcome> {
        let workspace = Workspace::new(&self.config.temp_root)?;
        let archive = workspace.file(ARCHIVE_DOWNLOAD);

        self.progress.stage(InstallStage::Downloading);
        self.fetcher
            .fetch(url, &archive, ProgressSpan::new(0, 50), &self.progress)
            .await?;
        self.progress.report(55);

        self.progress.stage(InstallStage::Extracting);
        let extract_root = workspace.subdir(EXTRACT_DIR).await?;
        extract_zip(&archive, &extract_root).await?;
        self.progress.report(60);

        let asset = discover_asset_folder(&extract_root).await?;
        let outcome = self.finish_vehicle(&extract_root, asset, identifier).await?;
        close(workspace);
        Ok(outcome)
    }

    /// Install a vehicle from an asset folder on disk.
    #[instrument(skip(self))]
    pub async fn install_vehicle_folder(&self, folder: &Path, identifier: Option<&str>) -> Result<InstallOutcome> {
        if !folder.is_dir() {
            return Err(InstallError::SourceNotFound {
                path: folder.to_path_buf(),
            });
        }

        let scan_root = folder.to_path_buf();
        let asset = tokio::task::spawn_blocking(move || SourceAsset::scan(&scan_root)).await??;
        self.finish_vehicle(folder, asset, identifier).await
    }

    /// Install a local DLC binary.
    pub async fn install_dlc_file(&self, binary: &Path) -> Result<InstallOutcome> {
        self.install_dlc(BinarySource::Local(binary), None, None).await
    }

    /// Download a DLC binary, plus its optional metadata archive, and install it.
    pub async fn install_dlc_url(&self, url: &Url, metadata: Option<&Url>) -> Result<InstallOutcome> {
        self.install_dlc(BinarySource::Remote(url), metadata, None).await
    }

    async fn finish_vehicle(
        &self,
        root: &Path,
        asset: SourceAsset,
        identifier: Option<&str>,
    ) -> Result<InstallOutcome> {
        let package_config = match ini::parse_file(&root.join(CONFIG_FILE_NAME)).await? {
            Some(found) => Some(found),
            None => ini::parse_file(&asset.folder.join(CONFIG_FILE_NAME)).await?,
        };

        let folder_name = asset
            .folder
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let identifier = identifier.unwrap_or(&folder_name);

        let selector = package_config.as_ref().and_then(|c| c.handling_preset.as_deref());
        let preset = match self.presets.select(selector) {
            Some((name, definition)) => {
                info!("Using handling preset '{}'", name);
                definition
            }
            None => presets::TRAILBLAZER_META,
        };

        self.progress.stage(InstallStage::Composing);
        let package = self
            .composer()
            .compose_vehicle(&asset, identifier, preset, package_config.as_ref())
            .await?;

        let registry = self.register(&package).await?;
        self.progress.report(95);

        self.progress.stage(InstallStage::Lighting);
        let lighting = self.vehicle_lighting(root, &asset, &package, package_config.as_ref()).await?;

        self.progress.report(100);
        info!("Installed vehicle package {}", package.folder);
        Ok(InstallOutcome {
            package,
            registry,
            lighting,
        })
    }

    async fn vehicle_lighting(
        &self,
        root: &Path,
        asset: &SourceAsset,
        package: &Package,
        package_config: Option<&PackageConfig>,
    ) -> Result<Vec<PathBuf>> {
        let lighting = self.lighting();
        let mut installed = Vec::new();

        let has_els = package_config.is_some_and(|c| c.has_els);
        let is_pack = package_config.is_some_and(|c| c.is_vehicle_pack);

        if let Some(config) = package_config.filter(|_| has_els || is_pack) {
            installed.extend(lighting.install_from_metadata(root, config).await?);
        }
        if !has_els {
            installed.extend(lighting.install_from_asset(asset, &package.name).await?);
        }
        Ok(installed)
    }

    #[instrument(skip(self, binary, metadata))]
    async fn install_dlc(
        &self,
        binary: BinarySource<'_>,
        metadata: Option<&Url>,
        name_hint: Option<&str>,
    ) -> Result<InstallOutcome> {
        let workspace = Workspace::new(&self.config.temp_root)?;

        let (binary_path, transfer, fallback_name) = match binary {
            BinarySource::Local(path) => {
                if !path.is_file() {
                    return Err(InstallError::SourceNotFound {
                        path: path.to_path_buf(),
                    });
                }
                let stem = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned());
                (path.to_path_buf(), Transfer::Copy, stem)
            }
            BinarySource::Remote(url) => {
                self.progress.stage(InstallStage::Downloading);
                let dest = workspace.file(BINARY_DOWNLOAD);
                self.fetcher
                    .fetch(url, &dest, ProgressSpan::new(0, 40), &self.progress)
                    .await?;
                (dest, Transfer::Move, url_file_stem(url))
            }
        };

        let mut lighting = Vec::new();
        let mut package_config = None;
        if let Some(metadata) = metadata {
            self.progress.stage(InstallStage::Downloading);
            let archive = workspace.file(METADATA_DOWNLOAD);
            self.fetcher
                .fetch(metadata, &archive, ProgressSpan::new(40, 45), &self.progress)
                .await?;
            self.progress.report(50);

            self.progress.stage(InstallStage::Extracting);
            let metadata_root = workspace.subdir(METADATA_DIR).await?;
            extract_zip(&archive, &metadata_root).await?;
            package_config = ini::parse_file(&metadata_root.join(CONFIG_FILE_NAME)).await?;

            if let Some(config) = package_config.as_ref() {
                self.progress.stage(InstallStage::Lighting);
                lighting = self.lighting().install_from_metadata(&metadata_root, config).await?;
            }
        } else {
            self.progress.report(50);
        }

        let name = package_config
            .as_ref()
            .and_then(|c| c.dlc_name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .or(name_hint)
            .map(str::to_string)
            .or(fallback_name)
            .ok_or_else(|| InstallError::InvalidIdentifier {
                identifier: String::new(),
            })?;

        self.progress.stage(InstallStage::Composing);
        let package = self
            .composer()
            .compose_dlc(&binary_path, &name, transfer, package_config.as_ref())
            .await?;

        let registry = self.register(&package).await?;
        self.progress.report(100);

        close(workspace);
        info!("Installed DLC package {}", package.folder);
        Ok(InstallOutcome {
            package,
            registry,
            lighting,
        })
    }

    async fn register(&self, package: &Package) -> Result<RegistryChange> {
        self.progress.stage(InstallStage::Registering);
        let updater = RegistryUpdater::new(self.config.manifest_path());
        let change = updater.register(&package.folder, &package.name).await?;
        if change.recovered_from_corruption {
            self.progress.warning(format!(
                "Manifest was unreadable and has been recreated; the old file is at {}",
                updater.backup_path().display()
            ));
        }
        Ok(change)
    }
}

/// Remove the workspace, logging rather than failing an install that succeeded
fn close(workspace: Workspace) {
    let path = workspace.path().to_path_buf();
    if let Err(e) = workspace.close() {
        warn!("Failed to remove workspace {}: {}", path.display(), e);
    }
}
