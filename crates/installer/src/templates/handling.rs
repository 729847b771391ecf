//! Streaming rewrites of handling definitions
//!
//! Only the first `Item type="CHandlingData"` is touched. Every event outside
//! the rewritten fields is copied through unchanged, so comments, spacing and
//! unrelated sub-handling blocks survive byte for byte.

use indexmap::IndexMap;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use crate::error::{InstallError, Result};

pub const HANDLING_TEMPLATE: &str = "handling.meta";
const HANDLING_ITEM_TYPE: &[u8] = b"CHandlingData";
const NAME_FIELD: &str = "handlingName";

/// What a rewrite actually changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    pub renamed: bool,
    /// Override keys that matched a field
    pub applied: Vec<String>,
    /// Override keys with no matching `value`-bearing field
    pub dropped: Vec<String>,
}

fn xml_error(err: impl std::fmt::Display) -> InstallError {
    InstallError::template(HANDLING_TEMPLATE, err)
}

/// Replace the handling name of an existing definition.
pub fn rename_handling(definition: &str, identifier: &str) -> Result<String> {
    let (output, report) = rewrite(definition, identifier, &IndexMap::new())?;
    if !report.renamed {
        warn!("No CHandlingData item found, handling definition left unchanged");
    }
    Ok(output)
}

/// Set the handling name, then overwrite the `value` attribute of every
/// direct `CHandlingData` child named in `overrides`.
///
/// Keys that match no such field are dropped without error.
pub fn apply_overrides(
    definition: &str,
    identifier: &str,
    overrides: &IndexMap<String, String>,
) -> Result<(String, RewriteReport)> {
    let (output, report) = rewrite(definition, identifier, overrides)?;
    if !report.dropped.is_empty() {
        debug!("Ignored unknown handling fields: {}", report.dropped.join(", "));
    }
    Ok((output, report))
}

fn is_handling_item(start: &BytesStart<'_>) -> Result<bool> {
    if start.name().as_ref() != b"Item" {
        return Ok(false);
    }
    let kind = start.try_get_attribute("type").map_err(xml_error)?;
    Ok(kind.is_some_and(|attr| attr.value.as_ref() == HANDLING_ITEM_TYPE))
}

fn override_value<'a>(
    start: BytesStart<'a>,
    overrides: &IndexMap<String, String>,
    report: &mut RewriteReport,
) -> Result<BytesStart<'a>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let Some(value) = overrides.get(&name) else {
        return Ok(start);
    };
    if start.try_get_attribute("value").map_err(xml_error)?.is_none() {
        return Ok(start);
    }

    let mut updated = BytesStart::new(name.clone());
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.as_ref() == b"value" {
            updated.push_attribute(("value", value.as_str()));
        } else {
            updated.push_attribute(attr);
        }
    }
    report.applied.push(name);
    Ok(updated)
}

fn rewrite(
    definition: &str,
    identifier: &str,
    overrides: &IndexMap<String, String>,
) -> Result<(String, RewriteReport)> {
    let mut reader = Reader::from_str(definition);
    let mut writer = Writer::new(Vec::with_capacity(definition.len() + 64));
    let mut report = RewriteReport::default();

    // Depth of the currently open element, root = 1.
    let mut depth = 0usize;
    // Depth of the handling item's direct children while inside it.
    let mut field_depth: Option<usize> = None;
    let mut item_seen = false;
    // Set while skipping the old content of the name field.
    let mut name_depth: Option<usize> = None;

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        match event {
            Event::Eof => break,
            Event::Start(start) => {
                depth += 1;
                if name_depth.is_some() {
                    continue;
                }
                if !item_seen && is_handling_item(&start)? {
                    item_seen = true;
                    field_depth = Some(depth + 1);
                    writer.write_event(Event::Start(start)).map_err(xml_error)?;
                } else if field_depth == Some(depth) && start.name().as_ref() == NAME_FIELD.as_bytes() {
                    writer.write_event(Event::Start(start)).map_err(xml_error)?;
                    writer
                        .write_event(Event::Text(BytesText::new(identifier)))
                        .map_err(xml_error)?;
                    name_depth = Some(depth);
                    report.renamed = true;
                } else if field_depth == Some(depth) {
                    let start = override_value(start, overrides, &mut report)?;
                    writer.write_event(Event::Start(start)).map_err(xml_error)?;
                } else {
                    writer.write_event(Event::Start(start)).map_err(xml_error)?;
                }
            }
            Event::Empty(start) => {
                if name_depth.is_some() {
                    continue;
                }
                if field_depth == Some(depth + 1) && start.name().as_ref() == NAME_FIELD.as_bytes() {
                    writer
                        .write_event(Event::Start(BytesStart::new(NAME_FIELD)))
                        .map_err(xml_error)?;
                    writer
                        .write_event(Event::Text(BytesText::new(identifier)))
                        .map_err(xml_error)?;
                    writer
                        .write_event(Event::End(BytesEnd::new(NAME_FIELD)))
                        .map_err(xml_error)?;
                    report.renamed = true;
                } else if field_depth == Some(depth + 1) {
                    let start = override_value(start, overrides, &mut report)?;
                    writer.write_event(Event::Empty(start)).map_err(xml_error)?;
                } else {
                    writer.write_event(Event::Empty(start)).map_err(xml_error)?;
                }
            }
            Event::End(end) => {
                if let Some(open) = name_depth {
                    if open != depth {
                        depth -= 1;
                        continue;
                    }
                    name_depth = None;
                }
                if field_depth == Some(depth + 1) {
                    field_depth = None;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(end)).map_err(xml_error)?;
            }
            other => {
                if name_depth.is_some() {
                    continue;
                }
                writer.write_event(other).map_err(xml_error)?;
            }
        }
    }

    report.dropped = overrides
        .keys()
        .filter(|key| !report.applied.contains(key))
        .cloned()
        .collect();

    let output = String::from_utf8(writer.into_inner()).map_err(xml_error)?;
    Ok((output, report))
}
