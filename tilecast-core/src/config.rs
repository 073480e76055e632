//! Typed description of a configured tile source and its caching policy.
//!
//! The JSON wire shape matches the server configuration file: camelCase keys,
//! a `type` tag selecting the backend, and optional backend-specific blocks.
//! After backend initialization the record is re-emitted with inferred fields
//! filled in (format, content type, zoom range, geographical bounds, srs).

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tilecast_tile_utils::MAX_ZOOM;
use tilejson::Bounds;

/// Default per-request timeout for HTTP-backed sources, in seconds.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 15;
/// Default connection pool size for PostGIS sources.
pub const DEFAULT_POSTGRES_POOL_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Mbtiles,
    File,
    Xyz,
    Tms,
    Wmts,
    Wms,
    Postgis,
    Geotiff,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Mbtiles => "mbtiles",
            Self::File => "file",
            Self::Xyz => "xyz",
            Self::Tms => "tms",
            Self::Wmts => "wmts",
            Self::Wms => "wms",
            Self::Postgis => "postgis",
            Self::Geotiff => "geotiff",
        };
        f.write_str(name)
    }
}

impl SourceKind {
    /// Backends whose `location` must be a local filesystem path.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Mbtiles | Self::File | Self::Geotiff)
    }

    /// Backends whose `location` is an http(s) URL or URL template.
    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Xyz | Self::Tms | Self::Wmts | Self::Wms)
    }
}

/// Read-through cache attached to a source.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Only `mbtiles` is recognized.
    #[serde(rename = "type")]
    pub kind: String,
    pub dbfile: PathBuf,
}

/// PostGIS-specific source settings.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgisSourceConfig {
    pub table: String,
    pub geometry: String,
    #[serde(default)]
    pub fields: Vec<String>,
    pub pool_size: Option<usize>,
}

/// WMTS-specific source settings used for init-time validation.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmtsSourceConfig {
    pub capabilities_url: Option<String>,
    pub layer: Option<String>,
    pub style: Option<String>,
    pub tile_matrix_set: Option<String>,
}

#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Unique layer identifier used in URLs. Must be non-empty.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub description: Option<String>,
    /// Local path, path/URL template, or base URL, depending on `kind`.
    pub location: String,
    /// Tile payload format name (`png`, `jpg`, `pbf`, ...).
    pub format: Option<String>,
    pub content_type: Option<String>,
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
    pub srs: Option<String>,
    /// Y axis convention for `file`/`xyz` templates; the `tms` kind implies it.
    pub tms: Option<bool>,
    /// Geographical bounds in degrees, west/south/east/north.
    pub bounds: Option<Bounds>,
    pub cache: Option<CacheConfig>,
    pub postgis: Option<PostgisSourceConfig>,
    pub wmts: Option<WmtsSourceConfig>,
    pub timeout_seconds: Option<u64>,
}

impl SourceConfig {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: SourceKind, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: None,
            description: None,
            location: location.into(),
            format: None,
            content_type: None,
            min_zoom: None,
            max_zoom: None,
            srs: None,
            tms: None,
            bounds: None,
            cache: None,
            postgis: None,
            wmts: None,
            timeout_seconds: None,
        }
    }

    /// Static validation, before any backend I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptySourceId);
        }
        if self.location.trim().is_empty() {
            return Err(ConfigError::EmptyLocation(self.id.clone()));
        }
        if self.kind.is_http() && !self.location.starts_with("http") {
            return Err(ConfigError::NotAnUrl(self.id.clone(), self.location.clone()));
        }
        if self.kind == SourceKind::Postgis && self.postgis.is_none() {
            return Err(ConfigError::MissingPostgisBlock(self.id.clone()));
        }
        if let Some(cache) = &self.cache {
            if cache.kind != "mbtiles" {
                return Err(ConfigError::UnsupportedCacheKind(
                    self.id.clone(),
                    cache.kind.clone(),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.min_zoom, self.max_zoom) {
            if min > max {
                return Err(ConfigError::InvalidZoomRange(self.id.clone(), min, max));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn min_zoom(&self) -> u8 {
        self.min_zoom.unwrap_or(0)
    }

    #[must_use]
    pub fn max_zoom(&self) -> u8 {
        self.max_zoom.unwrap_or(MAX_ZOOM)
    }

    #[must_use]
    pub fn is_valid_zoom(&self, zoom: u8) -> bool {
        zoom >= self.min_zoom() && zoom <= self.max_zoom()
    }

    #[must_use]
    pub fn uses_tms_rows(&self) -> bool {
        self.kind == SourceKind::Tms || self.tms.unwrap_or(false)
    }

    #[must_use]
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS)
    }
}

/// Invalid static configuration. Fatal at startup.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Source id must not be empty")]
    EmptySourceId,

    #[error("Source {0} has an empty location")]
    EmptyLocation(String),

    #[error("Source {0} of a remote kind needs an http(s) location, got {1:?}")]
    NotAnUrl(String, String),

    #[error("Source {0} is of kind postgis but has no postgis block")]
    MissingPostgisBlock(String),

    #[error("Source {0} requests unsupported cache kind {1:?}, only mbtiles is supported")]
    UnsupportedCacheKind(String, String),

    #[error("Source {0} has minZoom {1} greater than maxZoom {2}")]
    InvalidZoomRange(String, u8, u8),

    #[error("Duplicate source id {0}")]
    DuplicateSourceId(String),
}
