//! End-to-end install flows against a temporary game directory

use lml_installer::{
    ErrorKind, InstallRequest, Installer, InstallerConfig, PackageKind, ProgressEvent, RegistryDocument,
    SourceSpec,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct GameFixture {
    dir: tempfile::TempDir,
}

impl GameFixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn game_dir(&self) -> PathBuf {
        self.dir.path().join("game")
    }

    fn lml(&self) -> PathBuf {
        self.game_dir().join("lml")
    }

    fn config(&self) -> InstallerConfig {
        InstallerConfig::builder(self.game_dir())
            .temp_root(self.dir.path().join("tmp"))
            .retry_delay(Duration::from_millis(10))
            .build()
    }

    fn installer(&self) -> Installer {
        Installer::new(self.config()).unwrap()
    }

    fn manifest(&self) -> RegistryDocument {
        let text = std::fs::read_to_string(self.lml().join("mods.xml")).unwrap();
        RegistryDocument::parse(&text).unwrap()
    }

    fn write(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }
}

fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, contents) in files {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap();
}

#[tokio::test]
async fn folder_without_configuration_produces_canonical_package() {
    let game = GameFixture::new();
    game.write("src/car/car.yft", b"model");
    game.write("src/car/car.ytd", b"texture");
    let folder = game.dir.path().join("src/car");

    let request = InstallRequest::parse(folder.to_str().unwrap(), None)
        .unwrap()
        .with_identifier("Falcon");
    assert!(matches!(request.source, SourceSpec::LocalFolder(_)));

    let outcome = game.installer().install(&request).await.unwrap();

    let root = game.lml().join("_falcon");
    assert_eq!(outcome.package.root, root);
    for file in [
        "stream/falcon.yft",
        "stream/falcon.ytd",
        "data/handling.meta",
        "data/vehicles.meta",
        "data/carvariations.meta",
        "data/carcols.meta",
        "install.xml",
    ] {
        assert!(root.join(file).is_file(), "{file} missing");
    }
    assert!(!root.join("stream/falcon_hi.yft").exists());

    let manifest = game.manifest();
    let entry = manifest.entry("_falcon").unwrap();
    assert_eq!(entry.name, "falcon");
    assert!(entry.enabled);
    assert!(!entry.overwrite);
    assert_eq!(manifest.load_order(), vec!["_falcon".to_string()]);
}

#[tokio::test]
async fn reinstalling_supersedes_package_and_keeps_one_manifest_entry() {
    let game = GameFixture::new();
    let archive = game.dir.path().join("falcon.zip");
    write_zip(
        &archive,
        &[
            ("dlc_config.ini", b"[metadata]\nSpawnName=Falcon\nAuthor=Jane\n[handling]\nPreset=Renault Duster\n"),
            ("pack/Falcon/body.yft", b"v1"),
            ("pack/Falcon/body.ytd", b"t1"),
        ],
    );
    let installer = game.installer();
    let request = InstallRequest::parse(archive.to_str().unwrap(), None).unwrap();

    installer.install(&request).await.unwrap();
    write_zip(
        &archive,
        &[
            ("dlc_config.ini", b"[metadata]\nSpawnName=Falcon\n"),
            ("pack/Falcon/body.yft", b"v2"),
            ("pack/Falcon/body.ytd", b"t2"),
        ],
    );
    let second = installer.install(&request).await.unwrap();

    assert!(!second.registry.entry_added);
    assert!(!second.registry.load_order_added);
    assert_eq!(
        std::fs::read(game.lml().join("_falcon/stream/falcon.yft")).unwrap(),
        b"v2"
    );
    let manifest = game.manifest();
    assert_eq!(manifest.entries().len(), 1);
    assert_eq!(manifest.load_order().len(), 1);
}

#[tokio::test]
async fn archive_configuration_selects_preset_and_author() {
    let game = GameFixture::new();
    let archive = game.dir.path().join("falcon.zip");
    write_zip(
        &archive,
        &[
            ("dlc_config.ini", b"[metadata]\nSpawnName=Falcon\nAuthor=Jane\n[handling]\nPreset=Renault Duster\n"),
            ("pack/Falcon/body.yft", b"model"),
            ("pack/Falcon/body.ytd", b"texture"),
        ],
    );

    game.installer().install_vehicle_archive(&archive, None).await.unwrap();

    let handling = std::fs::read_to_string(game.lml().join("_falcon/data/handling.meta")).unwrap();
    assert!(handling.contains("<handlingName>falcon</handlingName>"));
    let duster = lml_installer::HandlingPresets::builtin();
    let expected = duster
        .get(lml_installer::templates::presets::DUSTER)
        .unwrap()
        .replace("<handlingName>DUSTER</handlingName>", "<handlingName>falcon</handlingName>");
    assert_eq!(handling, expected);

    let descriptor = std::fs::read_to_string(game.lml().join("_falcon/install.xml")).unwrap();
    assert!(descriptor.contains("<Author>Jane</Author>"));
}

#[tokio::test]
async fn configuration_inside_asset_folder_is_used_when_root_has_none() {
    let game = GameFixture::new();
    let archive = game.dir.path().join("falcon.zip");
    write_zip(
        &archive,
        &[
            ("readme.txt", b"drive safe"),
            ("pack/Falcon/dlc_config.ini", b"[metadata]\nSpawnName=Raptor\nAuthor=Sam\n"),
            ("pack/Falcon/body.yft", b"model"),
            ("pack/Falcon/body.ytd", b"texture"),
        ],
    );

    let outcome = game
        .installer()
        .install_vehicle_archive(&archive, Some("Falcon"))
        .await
        .unwrap();

    assert_eq!(outcome.package.kind, PackageKind::Vehicle);
    assert_eq!(outcome.package.folder, "_raptor");
    let root = game.lml().join("_raptor");
    assert!(root.join("stream/raptor.yft").is_file());
    assert!(!game.lml().join("_falcon").exists());
    let descriptor = std::fs::read_to_string(root.join("install.xml")).unwrap();
    assert!(descriptor.contains("<Author>Sam</Author>"));
    assert!(game.manifest().entry("_raptor").is_some());
}

#[tokio::test]
async fn remote_archive_recovers_from_transient_failures() {
    let server = MockServer::start().await;
    let game = GameFixture::new();
    let archive = game.dir.path().join("served.zip");
    write_zip(&archive, &[("Falcon/falcon.yft", b"model"), ("Falcon/falcon.ytd", b"texture")]);
    let body = std::fs::read(&archive).unwrap();

    Mock::given(method("GET"))
        .and(path("/mods/falcon.zip"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mods/falcon.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = events.clone();
    let installer = game
        .installer()
        .with_progress_callback(Arc::new(move |event| captured.lock().unwrap().push(event)));

    let link = format!("dlctolml:?url={}/mods/falcon.zip", server.uri());
    let request = InstallRequest::parse(&link, None).unwrap();
    let outcome = installer.install(&request).await.unwrap();

    assert_eq!(outcome.package.folder, "_falcon");
    let events = events.lock().unwrap();
    let retries = events
        .iter()
        .filter(|event| matches!(event, ProgressEvent::RetryAttempt { .. }))
        .count();
    assert_eq!(retries, 2);
    assert_eq!(events.last(), Some(&ProgressEvent::Progress { percent: 100 }));
}

#[tokio::test]
async fn local_dlc_binary_is_copied_and_registered() {
    let game = GameFixture::new();
    let binary = game.write("downloads/PolicePack.rpf", b"RPF7");

    let request = InstallRequest::parse(binary.to_str().unwrap(), None).unwrap();
    let outcome = game.installer().install(&request).await.unwrap();

    assert_eq!(outcome.package.kind, PackageKind::Dlc);
    assert_eq!(outcome.package.folder, "PolicePack");
    assert!(binary.exists());
    assert_eq!(
        std::fs::read(game.lml().join("PolicePack/dlc.rpf")).unwrap(),
        b"RPF7"
    );
    assert!(game.manifest().entry("PolicePack").is_some());
}

#[tokio::test]
async fn missing_texture_fails_before_writing_package() {
    let game = GameFixture::new();
    game.write("src/car/car.yft", b"model");

    let err = game
        .installer()
        .install_vehicle_folder(&game.dir.path().join("src/car"), Some("Falcon"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingRequiredAsset);
    assert!(!game.lml().join("_falcon").exists());
    assert!(!game.lml().join("mods.xml").exists());
}
