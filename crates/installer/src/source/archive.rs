//! Archive extraction and asset-folder discovery

use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{FileOperation, InstallError, Result};

/// Recognized files of an asset folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceAsset {
    pub folder: PathBuf,
    /// Primary model (`.yft`)
    pub model: Option<PathBuf>,
    /// Texture dictionary (`.ytd`)
    pub texture: Option<PathBuf>,
    /// High-detail model (`_hi.yft`)
    pub hi_model: Option<PathBuf>,
    /// Lighting definition (any `.xml` other than `carvariations.xml`)
    pub lighting: Option<PathBuf>,
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

fn lowercase_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

impl SourceAsset {
    /// Inspect the files directly inside `folder`, in file-name order.
    pub fn scan(folder: &Path) -> Result<Self> {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(folder)
            .map_err(|e| InstallError::fs(folder, FileOperation::ListDir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| InstallError::fs(folder, FileOperation::ListDir, e))?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort_by_key(|path| path.file_name().map(|name| name.to_os_string()));

        let mut asset = SourceAsset {
            folder: folder.to_path_buf(),
            ..Default::default()
        };
        let mut any_model = None;

        for path in files {
            let name = lowercase_name(&path);
            if has_extension(&path, "yft") {
                if name.ends_with("_hi.yft") {
                    asset.hi_model.get_or_insert_with(|| path.clone());
                } else {
                    asset.model.get_or_insert_with(|| path.clone());
                }
                any_model.get_or_insert(path);
            } else if has_extension(&path, "ytd") {
                asset.texture.get_or_insert(path);
            } else if has_extension(&path, "xml") && name != "carvariations.xml" {
                asset.lighting.get_or_insert(path);
            }
        }

        if asset.model.is_none() {
            asset.model = any_model;
        }
        Ok(asset)
    }

    /// Holds at least a model and a texture
    pub fn qualifies(&self) -> bool {
        self.model.is_some() && self.texture.is_some()
    }
}

/// First qualifying folder under `root`, root included, depth-first with
/// entries visited in file-name order.
pub fn find_asset_folder(root: &Path) -> Result<Option<SourceAsset>> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            InstallError::fs(path, FileOperation::ListDir, e.into())
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let asset = SourceAsset::scan(entry.path())?;
        if asset.qualifies() {
            debug!("Asset folder found at {}", entry.path().display());
            return Ok(Some(asset));
        }
    }
    Ok(None)
}

/// [`find_asset_folder`] on a blocking worker; no qualifying folder is
/// [`InstallError::InvalidPackage`].
pub async fn discover_asset_folder(root: &Path) -> Result<SourceAsset> {
    let search_root = root.to_path_buf();
    let found = tokio::task::spawn_blocking(move || find_asset_folder(&search_root)).await??;

    found.ok_or_else(|| InstallError::InvalidPackage {
        path: root.to_path_buf(),
        reason: "no folder contains both a .yft model and a .ytd texture".to_string(),
    })
}

/// Extract every entry of the zip at `archive` into `dest`.
pub async fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let archive_path = archive.to_path_buf();
    let dest_path = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = File::open(&archive_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InstallError::SourceNotFound { path: archive_path.clone() }
            } else {
                InstallError::fs(&archive_path, FileOperation::Read, e)
            }
        })?;
        let mut zip = ZipArchive::new(file).map_err(|e| InstallError::Archive {
            path: archive_path.clone(),
            source: e,
        })?;
        let entries = zip.len();
        zip.extract(&dest_path).map_err(|e| InstallError::Archive {
            path: archive_path.clone(),
            source: e,
        })?;
        info!("Extracted {} entries from {}", entries, archive_path.display());
        Ok(())
    })
    .await?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Write a zip holding `files` (path inside the archive, contents)
    pub(crate) fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn scan_recognizes_asset_roles() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["car_hi.yft", "car.YFT", "car.ytd", "carvariations.xml", "car.xml", "readme.txt"] {
            touch(&dir.path().join(name));
        }

        let asset = SourceAsset::scan(dir.path()).unwrap();
        assert!(asset.qualifies());
        assert_eq!(asset.model.unwrap().file_name().unwrap(), "car.YFT");
        assert_eq!(asset.hi_model.unwrap().file_name().unwrap(), "car_hi.yft");
        assert_eq!(asset.texture.unwrap().file_name().unwrap(), "car.ytd");
        assert_eq!(asset.lighting.unwrap().file_name().unwrap(), "car.xml");
    }

    #[test]
    fn hi_model_alone_still_counts_as_model() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("car_hi.yft"));
        touch(&dir.path().join("car.ytd"));

        let asset = SourceAsset::scan(dir.path()).unwrap();
        assert!(asset.qualifies());
        assert_eq!(asset.model, asset.hi_model);
    }

    #[test]
    fn discovery_returns_nested_folder_not_root() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("dlc_config.ini"));
        touch(&dir.path().join("model_only.yft"));
        touch(&dir.path().join("a_docs").join("readme.txt"));
        touch(&dir.path().join("b_pack").join("inner").join("car.yft"));
        touch(&dir.path().join("b_pack").join("inner").join("car.ytd"));
        touch(&dir.path().join("c_other").join("van.yft"));
        touch(&dir.path().join("c_other").join("van.ytd"));

        let asset = find_asset_folder(dir.path()).unwrap().unwrap();
        assert_eq!(asset.folder, dir.path().join("b_pack").join("inner"));
    }

    #[test]
    fn root_wins_when_it_qualifies() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("car.yft"));
        touch(&dir.path().join("car.ytd"));
        touch(&dir.path().join("nested").join("van.yft"));
        touch(&dir.path().join("nested").join("van.ytd"));

        let asset = find_asset_folder(dir.path()).unwrap().unwrap();
        assert_eq!(asset.folder, dir.path());
    }

    #[tokio::test]
    async fn extract_then_discover() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("falcon.zip");
        write_zip(&archive, &[("Falcon/falcon.yft", b"model"), ("Falcon/falcon.ytd", b"texture")]);

        let out = dir.path().join("out");
        extract_zip(&archive, &out).await.unwrap();
        let asset = discover_asset_folder(&out).await.unwrap();
        assert_eq!(asset.folder, out.join("Falcon"));
    }

    #[tokio::test]
    async fn archive_without_assets_is_invalid_package() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.zip");
        write_zip(&archive, &[("readme.txt", b"nothing here")]);

        let out = dir.path().join("out");
        extract_zip(&archive, &out).await.unwrap();
        let err = discover_asset_folder(&out).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidPackage);
    }

    #[tokio::test]
    async fn corrupt_archive_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip").unwrap();

        let err = extract_zip(&archive, &dir.path().join("out")).await.unwrap_err();
        assert!(matches!(err, InstallError::Archive { .. }));
    }
}
