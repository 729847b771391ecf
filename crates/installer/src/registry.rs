//! The shared package manifest (`lml/mods.xml`)
//!
//! The manifest lists every installed package and, separately, the order the
//! mod loader applies them in. Entries are only added or re-enabled here,
//! never removed. There is no locking: each registration loads the file,
//! mutates it and rewrites it whole.
//!
//! The document is kept as a generic element tree, so sections, fields and
//! group exclusions written by the loader itself survive a rewrite even when
//! nothing here knows about them.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, FileOperation, InstallError, Result};
use crate::files;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

const ROOT: &str = "ModsManager";
const MODS: &str = "Mods";
const LOAD_ORDER: &str = "LoadOrder";
const MOD: &str = "Mod";
const FOLDER: &str = "folder";
const NAME: &str = "Name";
const ENABLED: &str = "Enabled";
const OVERWRITE: &str = "Overwrite";
const DISABLED_GROUPS: &str = "DisabledGroups";

/// Why a manifest could not be read
#[derive(Debug, Error)]
pub enum ManifestParseError {
    #[error("malformed XML: {0}")]
    Syntax(String),

    #[error("element <{0}> is never closed")]
    Unclosed(String),

    #[error("document has no root element")]
    MissingRoot,

    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),
}

fn syntax(err: impl std::fmt::Display) -> ManifestParseError {
    ManifestParseError::Syntax(err.to_string())
}

#[derive(Debug, Clone, PartialEq)]
enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Comments, CDATA and processing instructions, written back as read
    Other(Event<'static>),
}

impl XmlNode {
    fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(element) => Some(element),
            _ => None,
        }
    }

    fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            XmlNode::Element(element) => Some(element),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    fn with_text(name: &str, text: &str) -> Self {
        let mut element = Self::new(name);
        element.children.push(XmlNode::Text(text.to_string()));
        element
    }

    fn from_start(start: &BytesStart<'_>) -> std::result::Result<Self, ManifestParseError> {
        let mut element = Self::new(&String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(syntax)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(syntax)?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.name == name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|element| element.name == name)
    }

    fn ensure_child(&mut self, name: &str) {
        if self.child(name).is_none() {
            self.push(XmlElement::new(name));
        }
    }

    fn push(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    fn text(&self) -> String {
        let mut text = String::new();
        for child in &self.children {
            match child {
                XmlNode::Text(value) => text.push_str(value),
                XmlNode::Other(Event::CData(data)) => text.push_str(&String::from_utf8_lossy(data)),
                _ => {}
            }
        }
        text
    }

    fn set_text(&mut self, text: &str) {
        self.children = vec![XmlNode::Text(text.to_string())];
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(XmlElement::text)
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>, path: &Path) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| write_failed(path, e));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| write_failed(path, e))?;
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write(writer, path)?,
                XmlNode::Text(text) => writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(|e| write_failed(path, e))?,
                XmlNode::Other(event) => writer
                    .write_event(event.clone())
                    .map_err(|e| write_failed(path, e))?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| write_failed(path, e))
    }
}

fn write_failed(path: &Path, err: impl std::fmt::Display) -> InstallError {
    InstallError::Manifest {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Flags are read the way the loader writes them, in any case.
/// Anything unrecognised counts as unset.
fn parse_flag(text: &str) -> bool {
    let text = text.trim();
    text.eq_ignore_ascii_case("true") || text == "1"
}

/// Attach a finished element to its parent, or make it the root
fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> std::result::Result<(), ManifestParseError> {
    match stack.last_mut() {
        Some(parent) => parent.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(syntax("more than one root element")),
    }
    Ok(())
}

/// Read-only view of one installed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModEntry {
    /// Package folder name, unique within the manifest
    pub folder: String,
    pub name: String,
    pub enabled: bool,
    pub overwrite: bool,
    /// Text of every `DisabledGroups` child, whatever it is called
    pub disabled_groups: Vec<String>,
}

impl ModEntry {
    fn from_element(element: &XmlElement) -> Option<Self> {
        let folder = element.attribute(FOLDER)?;
        Some(Self {
            folder: folder.to_string(),
            name: element.child_text(NAME).unwrap_or_default(),
            enabled: element.child_text(ENABLED).is_some_and(|text| parse_flag(&text)),
            overwrite: element.child_text(OVERWRITE).is_some_and(|text| parse_flag(&text)),
            disabled_groups: element
                .child(DISABLED_GROUPS)
                .map(|groups| groups.elements().map(|group| group.text().trim().to_string()).collect())
                .unwrap_or_default(),
        })
    }

    fn element(folder: &str, display_name: &str) -> XmlElement {
        let mut element = XmlElement::new(MOD);
        element.attributes.push((FOLDER.to_string(), folder.to_string()));
        element.push(XmlElement::with_text(NAME, display_name));
        element.push(XmlElement::with_text(ENABLED, "true"));
        element.push(XmlElement::with_text(OVERWRITE, "false"));
        element.push(XmlElement::new(DISABLED_GROUPS));
        element
    }
}

/// What a registration changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryChange {
    pub entry_added: bool,
    pub load_order_added: bool,
    /// The previous manifest was unreadable and has been replaced
    pub recovered_from_corruption: bool,
}

/// The manifest document
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryDocument {
    /// Comments and doctype ahead of the root element
    prolog: Vec<Event<'static>>,
    root: XmlElement,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        let mut root = XmlElement::new(ROOT);
        root.push(XmlElement::new(MODS));
        root.push(XmlElement::new(LOAD_ORDER));
        Self {
            prolog: Vec::new(),
            root,
        }
    }
}

impl RegistryDocument {
    /// Parse a manifest. Only malformed XML or a foreign root element is an
    /// error; unknown sections and odd field values are kept as they are.
    pub fn parse(text: &str) -> std::result::Result<Self, ManifestParseError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut prolog = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event().map_err(syntax)? {
                Event::Eof => break,
                Event::Decl(_) => {}
                Event::Start(start) => stack.push(XmlElement::from_start(&start)?),
                Event::Empty(start) => {
                    let element = XmlElement::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(end) => {
                    let element = stack.pop().ok_or_else(|| syntax("unexpected closing tag"))?;
                    if element.name.as_bytes() != end.name().as_ref() {
                        return Err(syntax(format!("mismatched closing tag for <{}>", element.name)));
                    }
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(syntax)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Text(text.into_owned())),
                        None if text.trim().is_empty() => {}
                        None => return Err(syntax("text outside the root element")),
                    }
                }
                other => match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Other(other.into_owned())),
                    None if root.is_none() => prolog.push(other.into_owned()),
                    None => {}
                },
            }
        }

        if let Some(open) = stack.last() {
            return Err(ManifestParseError::Unclosed(open.name.clone()));
        }
        let root = root.ok_or(ManifestParseError::MissingRoot)?;
        if root.name != ROOT {
            return Err(ManifestParseError::UnexpectedRoot(root.name));
        }
        Ok(Self { prolog, root })
    }

    /// Every `Mod` entry carrying a folder attribute, in document order
    pub fn entries(&self) -> Vec<ModEntry> {
        self.root
            .child(MODS)
            .map(|mods| {
                mods.elements()
                    .filter(|element| element.name == MOD)
                    .filter_map(ModEntry::from_element)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn entry(&self, folder: &str) -> Option<ModEntry> {
        self.entries().into_iter().find(|entry| entry.folder == folder)
    }

    /// Folder references of the load order, in order
    pub fn load_order(&self) -> Vec<String> {
        self.root
            .child(LOAD_ORDER)
            .map(|order| {
                order
                    .elements()
                    .filter(|element| element.name == MOD)
                    .map(|element| element.text().trim().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Add `folder` if unknown, otherwise re-enable it, and make sure it is
    /// in the load order exactly once. Everything else is left as found.
    pub fn upsert(&mut self, folder: &str, display_name: &str) -> RegistryChange {
        let mut change = RegistryChange::default();
        self.root.ensure_child(MODS);
        self.root.ensure_child(LOAD_ORDER);

        if let Some(mods) = self.root.child_mut(MODS) {
            let existing = mods
                .elements_mut()
                .find(|element| element.name == MOD && element.attribute(FOLDER) == Some(folder));
            match existing {
                Some(entry) => match entry.child_mut(ENABLED) {
                    Some(enabled) => enabled.set_text("true"),
                    None => entry.push(XmlElement::with_text(ENABLED, "true")),
                },
                None => {
                    mods.push(ModEntry::element(folder, display_name));
                    change.entry_added = true;
                }
            }
        }

        if let Some(order) = self.root.child_mut(LOAD_ORDER) {
            let listed = order
                .elements()
                .any(|element| element.name == MOD && element.text().trim() == folder);
            if !listed {
                order.push(XmlElement::with_text(MOD, folder));
                change.load_order_added = true;
            }
        }

        change
    }

    /// Serialize with an XML declaration and two-space indentation
    pub fn to_xml(&self, path: &Path) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        for event in &self.prolog {
            writer
                .write_event(event.clone())
                .map_err(|e| write_failed(path, e))?;
        }
        self.root.write(&mut writer, path)?;
        let body = String::from_utf8(writer.into_inner()).map_err(|e| write_failed(path, e))?;
        Ok(format!("{}\n{}\n", XML_DECLARATION, body))
    }
}

/// Loads, updates and rewrites the manifest at one path
#[derive(Debug, Clone)]
pub struct RegistryUpdater {
    path: PathBuf,
}

impl RegistryUpdater {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("xml.bak")
    }

    /// Load the manifest. A missing or blank file is an empty document; an
    /// unreadable one is backed up and replaced by an empty document.
    ///
    /// The flag is `true` when the file had to be replaced.
    pub async fn load(&self) -> Result<(RegistryDocument, bool)> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No manifest at {}, starting fresh", self.path.display());
                return Ok((RegistryDocument::default(), false));
            }
            Err(e) => return Err(InstallError::fs(&self.path, FileOperation::Read, e)),
        };

        let text = String::from_utf8_lossy(&bytes);
        let text = text.trim_start_matches('\u{feff}');
        if text.trim().is_empty() {
            return Ok((RegistryDocument::default(), false));
        }

        match RegistryDocument::parse(text) {
            Ok(document) => Ok((document, false)),
            Err(e) => {
                let backup = self.backup_path();
                files::copy_file(&self.path, &backup).await?;
                warn!(
                    kind = ?ErrorKind::RegistryCorrupt,
                    "Manifest {} is unreadable ({}); backed up to {} and replaced",
                    self.path.display(),
                    e,
                    backup.display()
                );
                Ok((RegistryDocument::default(), true))
            }
        }
    }

    pub async fn save(&self, document: &RegistryDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            files::create_dir_all(parent).await?;
        }
        files::write_file(&self.path, document.to_xml(&self.path)?).await
    }

    /// Register `folder` under `display_name` and rewrite the manifest.
    pub async fn register(&self, folder: &str, display_name: &str) -> Result<RegistryChange> {
        let (mut document, recovered) = self.load().await?;
        let mut change = document.upsert(folder, display_name);
        change.recovered_from_corruption = recovered;
        self.save(&document).await?;

        info!(
            "Registered {} in {} (new entry: {}, new load order reference: {})",
            folder,
            self.path.display(),
            change.entry_added,
            change.load_order_added
        );
        Ok(change)
    }
}
