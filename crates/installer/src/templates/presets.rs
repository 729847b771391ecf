//! Named handling presets

use indexmap::IndexMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{FileOperation, InstallError, Result};

pub const TRAILBLAZER: &str = "Chevrolet Trailblazer";
pub const S10: &str = "Chevrolet S10";
pub const DUSTER: &str = "Renault Duster";

pub(crate) const TRAILBLAZER_META: &str = include_str!("../../templates/handling/trailblazer.meta");
pub(crate) const S10_META: &str = include_str!("../../templates/handling/s10.meta");
pub(crate) const DUSTER_META: &str = include_str!("../../templates/handling/duster.meta");

/// Ordered table of handling definitions selectable by name
///
/// The first entry is the default preset.
#[derive(Debug, Clone)]
pub struct HandlingPresets {
    presets: IndexMap<String, String>,
}

impl Default for HandlingPresets {
    fn default() -> Self {
        Self::builtin()
    }
}

impl HandlingPresets {
    /// The three presets shipped with the installer, Trailblazer first
    pub fn builtin() -> Self {
        let mut presets = IndexMap::new();
        presets.insert(TRAILBLAZER.to_string(), TRAILBLAZER_META.to_string());
        presets.insert(S10.to_string(), S10_META.to_string());
        presets.insert(DUSTER.to_string(), DUSTER_META.to_string());
        Self { presets }
    }

    /// Add or replace a preset, keeping its position when replacing
    pub fn insert<N: Into<String>, D: Into<String>>(&mut self, name: N, definition: D) {
        self.presets.insert(name.into(), definition.into());
    }

    pub fn with_preset<N: Into<String>, D: Into<String>>(mut self, name: N, definition: D) -> Self {
        self.insert(name, definition);
        self
    }

    /// Load every `*.meta` file in `dir` as a preset named after its file stem.
    ///
    /// Returns how many presets were loaded.
    pub async fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| InstallError::fs(dir, FileOperation::ListDir, e))?;

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| InstallError::fs(dir, FileOperation::ListDir, e))?
        {
            let path = entry.path();
            let is_meta = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("meta"));
            if is_meta && path.is_file() {
                found.push(path);
            }
        }
        found.sort();

        for path in &found {
            let Some(name) = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
                continue;
            };
            let definition = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| InstallError::fs(path, FileOperation::Read, e))?;
            debug!("Loaded handling preset '{}' from {}", name, path.display());
            self.insert(name, definition);
        }

        info!("Loaded {} handling presets from {}", found.len(), dir.display());
        Ok(found.len())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.presets.get(name).map(String::as_str)
    }

    /// Resolve a selector to `(name, definition)`.
    ///
    /// Exact match first, then case-insensitive; anything else falls back to
    /// the default preset. `None` only when the table is empty.
    pub fn select(&self, selector: Option<&str>) -> Option<(&str, &str)> {
        if let Some(wanted) = selector.map(str::trim).filter(|s| !s.is_empty()) {
            if let Some((name, definition)) = self.presets.get_key_value(wanted) {
                return Some((name.as_str(), definition.as_str()));
            }
            if let Some((name, definition)) = self
                .presets
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            {
                return Some((name.as_str(), definition.as_str()));
            }
            debug!("Unknown handling preset '{}', using default", wanted);
        }

        self.presets
            .first()
            .map(|(name, definition)| (name.as_str(), definition.as_str()))
    }
}
