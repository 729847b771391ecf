//! Package configuration (`dlc_config.ini`) parsing
//!
//! The file is line oriented: `[section]` headers and `key=value` pairs,
//! blank lines and `;` comments ignored. Parsing never fails on content;
//! unknown sections and keys are skipped and unparsable booleans read as
//! `false`.

use indexmap::IndexMap;
use std::path::Path;
use tracing::debug;

use crate::error::{FileOperation, InstallError, Result};

/// File name the configuration is looked up under inside a package
pub const CONFIG_FILE_NAME: &str = "dlc_config.ini";

/// Settings parsed from a package configuration file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageConfig {
    pub spawn_name: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    /// Name used for direct-binary packages (`rpf_settings.DlcName`)
    pub dlc_name: Option<String>,
    /// Handling preset selector (`handling.Preset`)
    pub handling_preset: Option<String>,
    /// Handling field overrides, in declaration order
    pub handling_values: IndexMap<String, String>,
    pub has_els: bool,
    pub is_vehicle_pack: bool,
    /// Per-vehicle lighting file names for vehicle packs
    pub vehicle_els: IndexMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Metadata,
    Handling,
    RpfSettings,
    Vehicles,
    Unknown,
}

impl Section {
    fn from_header(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "metadata" => Section::Metadata,
            "handling" => Section::Handling,
            "rpf_settings" => Section::RpfSettings,
            "vehicles" => Section::Vehicles,
            _ => Section::Unknown,
        }
    }
}

/// Tolerant boolean: `true`/`false` in any case, anything else is `false`.
fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

impl PackageConfig {
    /// Parse configuration text. Never fails.
    pub fn parse_str(text: &str) -> Self {
        let mut config = PackageConfig::default();
        let mut section = Section::None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
                section = Section::from_header(&line[1..line.len() - 1]);
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            config.apply(section, key, value);
        }

        config
    }

    fn apply(&mut self, section: Section, key: &str, value: &str) {
        let is = |name: &str| key.eq_ignore_ascii_case(name);

        match section {
            Section::Metadata => {
                if is("SpawnName") {
                    self.spawn_name = Some(value.to_string());
                } else if is("Author") {
                    self.author = Some(value.to_string());
                } else if is("Version") {
                    self.version = Some(value.to_string());
                } else if is("HasEls") {
                    self.has_els = parse_bool(value);
                }
            }
            Section::Handling => {
                if is("Preset") {
                    self.handling_preset = Some(value.to_string());
                } else {
                    self.handling_values.insert(key.to_string(), value.to_string());
                }
            }
            Section::RpfSettings => {
                if is("DlcName") {
                    self.dlc_name = Some(value.to_string());
                } else if is("SpawnName") {
                    self.spawn_name = Some(value.to_string());
                } else if is("IsVehiclePack") {
                    self.is_vehicle_pack = parse_bool(value);
                } else if is("HasEls") {
                    self.has_els = parse_bool(value);
                }
            }
            Section::Vehicles => {
                self.vehicle_els.insert(key.to_string(), value.to_string());
            }
            Section::None | Section::Unknown => {
                debug!("Ignoring key '{}' outside a recognized section", key);
            }
        }
    }

    /// Spawn name if present and not blank
    pub fn spawn_name(&self) -> Option<&str> {
        self.spawn_name.as_deref().filter(|name| !name.trim().is_empty())
    }
}

/// Read and parse the configuration at `path`.
///
/// Returns `Ok(None)` when the file does not exist: a missing configuration
/// means "use the caller's defaults".
pub async fn parse_file(path: &Path) -> Result<Option<PackageConfig>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let config = PackageConfig::parse_str(text.trim_start_matches('\u{feff}'));
            debug!("Parsed package configuration from {}", path.display());
            Ok(Some(config))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(InstallError::fs(path, FileOperation::Read, e)),
    }
}
