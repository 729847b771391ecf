//! Source identification and acquisition
//!
//! An install starts from a string: a local path, an http(s) URL or one of
//! the two protocol links web pages hand to the installer. [`InstallRequest`]
//! turns that string into a typed [`SourceSpec`]; the submodules fetch,
//! extract and inspect what it points at.

pub mod archive;
pub mod http;
pub mod workspace;

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

use crate::error::{InstallError, Result};

pub use archive::{SourceAsset, discover_asset_folder, extract_zip, find_asset_folder};
pub use http::{Fetcher, HttpFetcher};
pub use workspace::Workspace;

/// Scheme of links carrying a DLC binary (`link=`) and its metadata (`metadata=`)
pub const DLC_LINK_SCHEME: &str = "modmanagerdlc";
/// Scheme of links carrying a vehicle archive (`url=`)
pub const VEHICLE_LINK_SCHEME: &str = "dlctolml";

/// Where the package content comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// A `.zip` holding an asset folder
    LocalArchive(PathBuf),
    /// A `.rpf` resource binary
    LocalBinary(PathBuf),
    /// An already extracted asset folder
    LocalFolder(PathBuf),
    RemoteArchive(Url),
    RemoteBinary(Url),
}

impl SourceSpec {
    pub fn is_remote(&self) -> bool {
        matches!(self, SourceSpec::RemoteArchive(_) | SourceSpec::RemoteBinary(_))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, SourceSpec::LocalBinary(_) | SourceSpec::RemoteBinary(_))
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::LocalArchive(path) => write!(f, "archive {}", path.display()),
            SourceSpec::LocalBinary(path) => write!(f, "binary {}", path.display()),
            SourceSpec::LocalFolder(path) => write!(f, "folder {}", path.display()),
            SourceSpec::RemoteArchive(url) => write!(f, "remote archive {}", url),
            SourceSpec::RemoteBinary(url) => write!(f, "remote binary {}", url),
        }
    }
}

/// A single install invocation's input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub source: SourceSpec,
    /// Metadata archive accompanying a binary source
    pub metadata: Option<Url>,
    /// Caller-chosen identifier; the package configuration may override it
    pub identifier: Option<String>,
}

fn invalid(source: &str, reason: impl Into<String>) -> InstallError {
    InstallError::InvalidSource {
        source_str: source.to_string(),
        reason: reason.into(),
    }
}

fn query_value(link: &Url, key: &str) -> Option<String> {
    link.query_pairs()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_http(source: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| invalid(source, format!("malformed URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(source, format!("unsupported URL scheme '{}'", other))),
    }
}

/// Lowercased extension of the last path segment of `url`
pub(crate) fn url_extension(url: &Url) -> Option<String> {
    url_file_name(url)
        .and_then(|name| Path::new(&name).extension().map(|ext| ext.to_string_lossy().to_lowercase()))
}

pub(crate) fn url_file_name(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Stem of the last path segment of `url`, if any
pub(crate) fn url_file_stem(url: &Url) -> Option<String> {
    url_file_name(url).and_then(|name| {
        Path::new(&name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    })
}

fn classify_remote(source: &str, url: Url) -> Result<SourceSpec> {
    match url_extension(&url).as_deref() {
        Some("rpf") => Ok(SourceSpec::RemoteBinary(url)),
        Some("zip") => Ok(SourceSpec::RemoteArchive(url)),
        _ => Err(invalid(source, "remote sources must end in .zip or .rpf")),
    }
}

fn classify_local(source: &str) -> Result<SourceSpec> {
    let path = PathBuf::from(source);
    if !path.exists() {
        return Err(InstallError::SourceNotFound { path });
    }
    if path.is_dir() {
        return Ok(SourceSpec::LocalFolder(path));
    }

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase());
    match extension.as_deref() {
        Some("rpf") => Ok(SourceSpec::LocalBinary(path)),
        Some("zip") => Ok(SourceSpec::LocalArchive(path)),
        _ => Err(invalid(source, "local sources must be a folder, a .zip or a .rpf")),
    }
}

impl InstallRequest {
    pub fn new(source: SourceSpec) -> Self {
        Self {
            source,
            metadata: None,
            identifier: None,
        }
    }

    pub fn with_identifier<S: Into<String>>(mut self, identifier: S) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Url) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Identify `source` and attach an optional metadata archive URL.
    ///
    /// A `metadata` parameter inside a protocol link takes precedence over
    /// the `metadata` argument. Metadata only applies to binary sources and
    /// is dropped with a warning for anything else.
    pub fn parse(source: &str, metadata: Option<&str>) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(invalid(source, "empty source"));
        }

        let mut link_metadata = None;
        let parsed = match Url::parse(trimmed) {
            Ok(link) if link.scheme().eq_ignore_ascii_case(DLC_LINK_SCHEME) => {
                let target = query_value(&link, "link")
                    .ok_or_else(|| invalid(source, "protocol link has no 'link' parameter"))?;
                link_metadata = query_value(&link, "metadata");
                let url = parse_http(source, &target)?;
                match url_extension(&url).as_deref() {
                    Some("zip") => SourceSpec::RemoteArchive(url),
                    _ => SourceSpec::RemoteBinary(url),
                }
            }
            Ok(link) if link.scheme().eq_ignore_ascii_case(VEHICLE_LINK_SCHEME) => {
                let target = query_value(&link, "url")
                    .ok_or_else(|| invalid(source, "protocol link has no 'url' parameter"))?;
                SourceSpec::RemoteArchive(parse_http(source, &target)?)
            }
            Ok(url) if matches!(url.scheme(), "http" | "https") => classify_remote(source, url)?,
            // Single-letter schemes are drive letters of Windows paths.
            Ok(url) if url.scheme().len() > 1 && !Path::new(trimmed).exists() => {
                return Err(invalid(source, format!("unsupported URL scheme '{}'", url.scheme())));
            }
            _ => classify_local(trimmed)?,
        };

        let metadata = link_metadata
            .as_deref()
            .or(metadata.map(str::trim).filter(|m| !m.is_empty()))
            .map(|raw| parse_http(raw, raw))
            .transpose()?;

        let metadata = match metadata {
            Some(url) if !parsed.is_binary() => {
                warn!("Ignoring metadata {} for non-binary source {}", url, parsed);
                None
            }
            other => other,
        };

        debug!("Identified {} (metadata: {:?})", parsed, metadata.as_ref().map(Url::as_str));
        Ok(Self {
            source: parsed,
            metadata,
            identifier: None,
        })
    }
}
