//! Descriptor and metadata document rendering
//!
//! Fixed documents are `tera` templates with a handful of substitution points;
//! handling definitions go through the streaming rewrites in [`handling`].

pub mod handling;
pub mod presets;

use indexmap::IndexMap;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

use crate::error::{InstallError, Result, describe};

pub use handling::{RewriteReport, apply_overrides, rename_handling};
pub use presets::HandlingPresets;

pub const VEHICLES_META: &str = "vehicles.meta";
pub const CARVARIATIONS_META: &str = "carvariations.meta";
pub const CARCOLS_META: &str = "carcols.meta";
pub const VEHICLE_INSTALL_XML: &str = "install_vehicle.xml";
pub const DLC_INSTALL_XML: &str = "install_dlc.xml";

/// Values substituted into a package descriptor
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorFields<'a> {
    pub package_name: &'a str,
    pub author: &'a str,
    pub version: &'a str,
}

/// Renders every generated document of a package
#[derive(Debug)]
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".meta", ".xml"]);
        tera.add_raw_templates(vec![
            (VEHICLES_META, include_str!("../../templates/vehicles.meta")),
            (CARVARIATIONS_META, include_str!("../../templates/carvariations.meta")),
            (CARCOLS_META, include_str!("../../templates/carcols.meta")),
            (VEHICLE_INSTALL_XML, include_str!("../../templates/install_vehicle.xml")),
            (DLC_INSTALL_XML, include_str!("../../templates/install_dlc.xml")),
        ])
        .map_err(|e| InstallError::template("builtin", describe(&e)))?;

        Ok(Self { tera })
    }

    fn render(&self, template: &str, context: &Context) -> Result<String> {
        debug!("Rendering {}", template);
        self.tera
            .render(template, context)
            .map_err(|e| InstallError::template(template, describe(&e)))
    }

    fn render_model(&self, template: &str, model_name: &str) -> Result<String> {
        let mut context = Context::new();
        context.insert("model_name", model_name);
        self.render(template, &context)
    }

    pub fn vehicles_meta(&self, model_name: &str) -> Result<String> {
        self.render_model(VEHICLES_META, model_name)
    }

    pub fn carvariations_meta(&self, model_name: &str) -> Result<String> {
        self.render_model(CARVARIATIONS_META, model_name)
    }

    pub fn carcols_meta(&self, model_name: &str) -> Result<String> {
        self.render_model(CARCOLS_META, model_name)
    }

    /// `install.xml` of a vehicle package
    pub fn vehicle_install(&self, fields: &DescriptorFields<'_>, spawn_name: &str) -> Result<String> {
        let mut context = Context::from_serialize(fields)
            .map_err(|e| InstallError::template(VEHICLE_INSTALL_XML, describe(&e)))?;
        context.insert("spawn_name", spawn_name);
        self.render(VEHICLE_INSTALL_XML, &context)
    }

    /// `install.xml` of a DLC package shipping `binary_name`
    pub fn dlc_install(&self, fields: &DescriptorFields<'_>, binary_name: &str) -> Result<String> {
        let mut context = Context::from_serialize(fields)
            .map_err(|e| InstallError::template(DLC_INSTALL_XML, describe(&e)))?;
        context.insert("binary_name", binary_name);
        self.render(DLC_INSTALL_XML, &context)
    }

    /// Single-field rewrite: `preset` renamed to `identifier`
    pub fn handling_from_preset(&self, preset: &str, identifier: &str) -> Result<String> {
        rename_handling(preset, identifier)
    }

    /// Table-driven override on top of the built-in base definition
    pub fn render_handling_overrides(
        &self,
        identifier: &str,
        overrides: &IndexMap<String, String>,
    ) -> Result<String> {
        let (document, report) = apply_overrides(presets::S10_META, identifier, overrides)?;
        debug!(
            "Applied {} handling overrides, dropped {}",
            report.applied.len(),
            report.dropped.len()
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> DescriptorFields<'static> {
        DescriptorFields {
            package_name: "Falcon & Co",
            author: "Jane",
            version: "2.0",
        }
    }

    #[test]
    fn model_templates_substitute_every_point() {
        let engine = TemplateEngine::new().unwrap();

        let vehicles = engine.vehicles_meta("falcon").unwrap();
        assert!(vehicles.contains("<modelName>falcon</modelName>"));
        assert!(vehicles.contains("<handlingId>falcon</handlingId>"));
        assert!(!vehicles.contains("{{"));

        assert!(engine.carvariations_meta("falcon").unwrap().contains("falcon"));
        assert!(engine.carcols_meta("falcon").unwrap().contains("<name>falcon_kit_1</name>"));
    }

    #[test]
    fn documents_end_at_their_closing_tag() {
        let engine = TemplateEngine::new().unwrap();

        let endings = [
            (engine.vehicles_meta("falcon").unwrap(), "</CVehicleModelInfo__InitDataList>"),
            (engine.carvariations_meta("falcon").unwrap(), "</CVehicleModelInfoVariation>"),
            (engine.carcols_meta("falcon").unwrap(), "</CVehicleModelInfo__Colours>"),
            (engine.vehicle_install(&fields(), "falcon").unwrap(), "</EasyInstall>"),
            (engine.dlc_install(&fields(), "dlc.rpf").unwrap(), "</EasyInstall>"),
        ];
        for (document, closing) in endings {
            assert!(document.ends_with(closing), "{closing} is not the last line");
        }
    }

    #[test]
    fn vehicle_descriptor_escapes_values() {
        let engine = TemplateEngine::new().unwrap();
        let descriptor = engine.vehicle_install(&fields(), "falcon").unwrap();

        assert!(descriptor.contains("<Name>Falcon &amp; Co</Name>"));
        assert!(descriptor.contains("<Author>Jane</Author>"));
        assert!(descriptor.contains("<Version>2.0</Version>"));
        assert!(descriptor.contains(r#"<Addon name="falcon">"#));
    }

    #[test]
    fn dlc_descriptor_references_binary() {
        let engine = TemplateEngine::new().unwrap();
        let descriptor = engine.dlc_install(&fields(), "dlc.rpf").unwrap();

        assert!(descriptor.starts_with("<?xml"));
        assert!(descriptor.contains("<DlcRpf>dlc.rpf</DlcRpf>"));
    }

    #[test]
    fn overrides_apply_to_base_definition() {
        let engine = TemplateEngine::new().unwrap();
        let mut overrides = IndexMap::new();
        overrides.insert("fMass".to_string(), "1800.0".to_string());
        overrides.insert("fNotAField".to_string(), "1".to_string());

        let document = engine.render_handling_overrides("falcon", &overrides).unwrap();
        assert!(document.contains("<handlingName>falcon</handlingName>"));
        assert!(document.contains(r#"<fMass value="1800.0"/>"#));
        assert!(!document.contains("fNotAField"));
    }

    #[test]
    fn preset_rewrite_keeps_preset_values() {
        let engine = TemplateEngine::new().unwrap();
        let presets = HandlingPresets::builtin();
        let (_, definition) = presets.select(Some(presets::DUSTER)).unwrap();

        let document = engine.handling_from_preset(definition, "falcon").unwrap();
        assert!(document.contains("<handlingName>falcon</handlingName>"));
        assert!(!document.contains("<handlingName>DUSTER</handlingName>"));
    }
}
