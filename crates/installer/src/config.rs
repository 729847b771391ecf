//! Configuration for installer operations

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Folder under the game directory where the mod loader keeps its packages
pub const LML_DIR_NAME: &str = "lml";
/// Manifest file listing installed packages and their load order
pub const MANIFEST_FILE_NAME: &str = "mods.xml";

/// Configuration for install operations
///
/// Passed explicitly into [`crate::Installer`]; nothing here is process-wide.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Game installation directory (contains `lml/` and `ELS/`)
    pub game_dir: PathBuf,
    /// Total attempts for a remote fetch, including the first one
    pub max_attempts: usize,
    /// Fixed delay between fetch attempts
    pub retry_delay: Duration,
    /// Request timeout; `None` keeps the transport default
    pub timeout: Option<Duration>,
    pub user_agent: String,
    /// Author written into descriptors when the package configuration has none
    pub default_author: String,
    /// Version written into descriptors when the package configuration has none
    pub default_version: String,
    /// Parent directory for per-install working directories
    pub temp_root: PathBuf,
}

impl InstallerConfig {
    pub fn new<P: Into<PathBuf>>(game_dir: P) -> Self {
        Self {
            game_dir: game_dir.into(),
            ..Self::default()
        }
    }

    pub fn builder<P: Into<PathBuf>>(game_dir: P) -> InstallerConfigBuilder {
        InstallerConfigBuilder {
            config: Self::new(game_dir),
        }
    }

    pub fn lml_dir(&self) -> PathBuf {
        self.game_dir.join(LML_DIR_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.lml_dir().join(MANIFEST_FILE_NAME)
    }

    /// Target folder for auxiliary lighting definitions
    pub fn lighting_dir(&self) -> PathBuf {
        self.game_dir.join("ELS").join("pack_default")
    }

    /// Whether `dir` looks like a game installation (holds `GTA5.exe`)
    pub fn is_game_dir(dir: &Path) -> bool {
        dir.is_dir() && dir.join("GTA5.exe").is_file()
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            game_dir: PathBuf::from("."),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            timeout: None,
            user_agent: concat!("lml-installer/", env!("CARGO_PKG_VERSION")).to_string(),
            default_author: "Created by lml-installer".to_string(),
            default_version: "1.0".to_string(),
            temp_root: std::env::temp_dir(),
        }
    }
}

/// Builder for [`InstallerConfig`]
#[derive(Debug, Clone)]
pub struct InstallerConfigBuilder {
    config: InstallerConfig,
}

impl InstallerConfigBuilder {
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn default_author<S: Into<String>>(mut self, author: S) -> Self {
        self.config.default_author = author.into();
        self
    }

    pub fn default_version<S: Into<String>>(mut self, version: S) -> Self {
        self.config.default_version = version.into();
        self
    }

    pub fn temp_root<P: Into<PathBuf>>(mut self, temp_root: P) -> Self {
        self.config.temp_root = temp_root.into();
        self
    }

    pub fn build(self) -> InstallerConfig {
        self.config
    }
}
