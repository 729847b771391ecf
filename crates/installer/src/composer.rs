//! Canonical package layout
//!
//! A vehicle package is `<lml>/_{name}/` with the renamed assets in `stream/`,
//! the generated metadata in `data/` and a descriptor at the root. A DLC
//! package is `<lml>/{name}/` holding the binary as `dlc.rpf` and its
//! descriptor.

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::config::InstallerConfig;
use crate::error::{InstallError, Result};
use crate::files::{self, Transfer};
use crate::ini::PackageConfig;
use crate::progress::ProgressSink;
use crate::sanitize::{sanitize_identifier, sanitize_name};
use crate::source::SourceAsset;
use crate::templates::{DescriptorFields, TemplateEngine};

pub const STREAM_DIR: &str = "stream";
pub const DATA_DIR: &str = "data";
pub const DESCRIPTOR_FILE: &str = "install.xml";
/// File name of the binary inside a DLC package
pub const DLC_BINARY_NAME: &str = "dlc.rpf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Vehicle,
    Dlc,
}

/// A composed package on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub kind: PackageKind,
    /// Root folder name, the manifest key
    pub folder: String,
    /// Sanitized identifier the package was built for
    pub name: String,
    pub root: PathBuf,
}

impl Package {
    pub fn stream_dir(&self) -> PathBuf {
        self.root.join(STREAM_DIR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(DESCRIPTOR_FILE)
    }
}

/// Builds packages under the mod loader folder
pub struct PackageComposer<'a> {
    config: &'a InstallerConfig,
    templates: &'a TemplateEngine,
    progress: ProgressSink,
}

impl<'a> PackageComposer<'a> {
    pub fn new(config: &'a InstallerConfig, templates: &'a TemplateEngine, progress: ProgressSink) -> Self {
        Self {
            config,
            templates,
            progress,
        }
    }

    fn descriptor_fields<'f>(&'f self, package_name: &'f str, package: Option<&'f PackageConfig>) -> DescriptorFields<'f> {
        DescriptorFields {
            package_name,
            author: package
                .and_then(|p| p.author.as_deref())
                .unwrap_or(&self.config.default_author),
            version: package
                .and_then(|p| p.version.as_deref())
                .unwrap_or(&self.config.default_version),
        }
    }

    /// Compose a vehicle package from `asset`.
    ///
    /// The configuration's spawn name takes precedence over `identifier`.
    /// `handling_preset` is the preset definition used when the configuration
    /// carries no handling overrides. Nothing is written when the model or
    /// texture is missing.
    #[instrument(skip(self, asset, handling_preset, package), fields(folder = %asset.folder.display()))]
    pub async fn compose_vehicle(
        &self,
        asset: &SourceAsset,
        identifier: &str,
        handling_preset: &str,
        package: Option<&PackageConfig>,
    ) -> Result<Package> {
        let raw_name = package.and_then(PackageConfig::spawn_name).unwrap_or(identifier);
        let name = sanitize_identifier(raw_name);
        if name.is_empty() {
            return Err(InstallError::InvalidIdentifier {
                identifier: raw_name.to_string(),
            });
        }

        let model = required(asset, asset.model.as_deref(), "yft")?;
        let texture = required(asset, asset.texture.as_deref(), "ytd")?;

        self.progress.report(65);
        let folder = format!("_{}", name);
        let package_out = Package {
            kind: PackageKind::Vehicle,
            folder: folder.clone(),
            name: name.clone(),
            root: self.config.lml_dir().join(&folder),
        };
        let stream_dir = package_out.stream_dir();
        let data_dir = package_out.data_dir();
        files::create_dir_all(&stream_dir).await?;
        files::create_dir_all(&data_dir).await?;
        self.progress.report(70);

        files::copy_file(model, &stream_dir.join(format!("{}.yft", name))).await?;
        if let Some(hi_model) = asset.hi_model.as_deref() {
            files::copy_file(hi_model, &stream_dir.join(format!("{}_hi.yft", name))).await?;
        }
        files::copy_file(texture, &stream_dir.join(format!("{}.ytd", name))).await?;
        self.progress.report(80);

        let handling = match package {
            Some(p) if !p.handling_values.is_empty() => {
                debug!("Rendering handling from {} overrides", p.handling_values.len());
                self.templates.render_handling_overrides(&name, &p.handling_values)?
            }
            _ => self.templates.handling_from_preset(handling_preset, &name)?,
        };
        files::write_file(&data_dir.join("handling.meta"), handling).await?;
        files::write_file(&data_dir.join("vehicles.meta"), self.templates.vehicles_meta(&name)?).await?;
        files::write_file(
            &data_dir.join("carvariations.meta"),
            self.templates.carvariations_meta(&name)?,
        )
        .await?;
        files::write_file(&data_dir.join("carcols.meta"), self.templates.carcols_meta(&name)?).await?;

        let fields = self.descriptor_fields(&folder, package);
        let descriptor = self.templates.vehicle_install(&fields, &name)?;
        files::write_file(&package_out.descriptor_path(), descriptor).await?;

        info!("Composed vehicle package {}", package_out.root.display());
        Ok(package_out)
    }

    /// Compose a DLC package around `binary`, named after `name`.
    #[instrument(skip(self, binary, package), fields(binary = %binary.display()))]
    pub async fn compose_dlc(
        &self,
        binary: &Path,
        name: &str,
        transfer: Transfer,
        package: Option<&PackageConfig>,
    ) -> Result<Package> {
        let folder = sanitize_name(name);
        if folder.is_empty() {
            return Err(InstallError::InvalidIdentifier {
                identifier: name.to_string(),
            });
        }

        let package_out = Package {
            kind: PackageKind::Dlc,
            folder: folder.clone(),
            name: folder.clone(),
            root: self.config.lml_dir().join(&folder),
        };
        files::create_dir_all(&package_out.root).await?;
        files::transfer_file(binary, &package_out.root.join(DLC_BINARY_NAME), transfer).await?;
        self.progress.report(70);

        let fields = self.descriptor_fields(&folder, package);
        let descriptor = self.templates.dlc_install(&fields, DLC_BINARY_NAME)?;
        files::write_file(&package_out.descriptor_path(), descriptor).await?;
        self.progress.report(90);

        info!("Composed DLC package {}", package_out.root.display());
        Ok(package_out)
    }
}

fn required<'p>(asset: &SourceAsset, path: Option<&'p Path>, extension: &str) -> Result<&'p Path> {
    path.ok_or_else(|| InstallError::MissingRequiredAsset {
        folder: asset.folder.clone(),
        extension: extension.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::HandlingPresets;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: InstallerConfig,
        templates: TemplateEngine,
        asset_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let asset_dir = dir.path().join("assets");
        std::fs::create_dir_all(&asset_dir).unwrap();
        let config = InstallerConfig::new(dir.path().join("game"));
        Fixture {
            config,
            templates: TemplateEngine::new().unwrap(),
            asset_dir,
            _dir: dir,
        }
    }

    fn preset() -> String {
        let presets = HandlingPresets::builtin();
        presets.select(None).unwrap().1.to_string()
    }

    #[tokio::test]
    async fn vehicle_layout_is_canonical() {
        let f = fixture();
        std::fs::write(f.asset_dir.join("car.yft"), b"model").unwrap();
        std::fs::write(f.asset_dir.join("car_hi.yft"), b"hi").unwrap();
        std::fs::write(f.asset_dir.join("car.ytd"), b"texture").unwrap();
        let asset = SourceAsset::scan(&f.asset_dir).unwrap();

        let composer = PackageComposer::new(&f.config, &f.templates, ProgressSink::default());
        let package = composer.compose_vehicle(&asset, "Falcon", &preset(), None).await.unwrap();

        assert_eq!(package.kind, PackageKind::Vehicle);
        assert_eq!(package.folder, "_falcon");
        let root = f.config.lml_dir().join("_falcon");
        assert_eq!(package.root, root);
        assert_eq!(std::fs::read(root.join("stream/falcon.yft")).unwrap(), b"model");
        assert_eq!(std::fs::read(root.join("stream/falcon_hi.yft")).unwrap(), b"hi");
        assert_eq!(std::fs::read(root.join("stream/falcon.ytd")).unwrap(), b"texture");
        for meta in ["handling.meta", "vehicles.meta", "carvariations.meta", "carcols.meta"] {
            assert!(root.join("data").join(meta).is_file(), "{meta} missing");
        }

        let handling = std::fs::read_to_string(root.join("data/handling.meta")).unwrap();
        assert!(handling.contains("<handlingName>falcon</handlingName>"));

        let descriptor = std::fs::read_to_string(root.join("install.xml")).unwrap();
        assert!(descriptor.contains("<Name>_falcon</Name>"));
        assert!(descriptor.contains("<Author>Created by lml-installer</Author>"));
        assert!(descriptor.contains(r#"<Addon name="falcon">"#));
    }

    #[tokio::test]
    async fn missing_texture_writes_nothing() {
        let f = fixture();
        std::fs::write(f.asset_dir.join("car.yft"), b"model").unwrap();
        let asset = SourceAsset::scan(&f.asset_dir).unwrap();

        let composer = PackageComposer::new(&f.config, &f.templates, ProgressSink::default());
        let err = composer.compose_vehicle(&asset, "falcon", &preset(), None).await.unwrap_err();

        match err {
            InstallError::MissingRequiredAsset { ref extension, .. } => assert_eq!(extension, "ytd"),
            ref other => panic!("unexpected error: {other}"),
        }
        assert!(!f.config.lml_dir().join("_falcon").exists());
    }

    #[tokio::test]
    async fn configuration_overrides_name_author_and_handling() {
        let f = fixture();
        std::fs::write(f.asset_dir.join("car.yft"), b"model").unwrap();
        std::fs::write(f.asset_dir.join("car.ytd"), b"texture").unwrap();
        let asset = SourceAsset::scan(&f.asset_dir).unwrap();
        let package = PackageConfig::parse_str(
            "[metadata]\nSpawnName=Pol:Car\nAuthor=Jane\nVersion=3.1\n[handling]\nfMass=1500.000000\n",
        );

        let composer = PackageComposer::new(&f.config, &f.templates, ProgressSink::default());
        let out = composer
            .compose_vehicle(&asset, "ignored", &preset(), Some(&package))
            .await
            .unwrap();

        assert_eq!(out.folder, "_pol_car");
        let handling = std::fs::read_to_string(out.data_dir().join("handling.meta")).unwrap();
        assert!(handling.contains("<handlingName>pol_car</handlingName>"));
        assert!(handling.contains(r#"<fMass value="1500.000000"/>"#));

        let descriptor = std::fs::read_to_string(out.descriptor_path()).unwrap();
        assert!(descriptor.contains("<Author>Jane</Author>"));
        assert!(descriptor.contains("<Version>3.1</Version>"));
    }

    #[tokio::test]
    async fn blank_identifier_is_rejected() {
        let f = fixture();
        let asset = SourceAsset::default();
        let composer = PackageComposer::new(&f.config, &f.templates, ProgressSink::default());
        let err = composer.compose_vehicle(&asset, "   ", &preset(), None).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidIdentifier);
    }

    #[tokio::test]
    async fn dlc_package_holds_binary_and_descriptor() {
        let f = fixture();
        let binary = f.asset_dir.join("Police Pack.rpf");
        std::fs::write(&binary, b"RPF7").unwrap();

        let composer = PackageComposer::new(&f.config, &f.templates, ProgressSink::default());
        let package = composer
            .compose_dlc(&binary, "Police Pack", Transfer::Copy, None)
            .await
            .unwrap();

        assert_eq!(package.kind, PackageKind::Dlc);
        assert_eq!(package.folder, "Police Pack");
        assert_eq!(std::fs::read(package.root.join("dlc.rpf")).unwrap(), b"RPF7");
        assert!(binary.exists());
        let descriptor = std::fs::read_to_string(package.descriptor_path()).unwrap();
        assert!(descriptor.contains(r#"<Resource name="Police Pack">"#));
    }
}
