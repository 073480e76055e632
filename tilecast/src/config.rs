//! JSON configuration file loading and eager source resolution.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};
use tilecast_core::config::{SourceConfig, SourceKind};
use tilecast_core::tiles::cache::CachedSource;
use tilecast_core::tiles::catalog::TileRegistry;
use tilecast_core::tiles::file::FileSource;
use tilecast_core::tiles::geotiff::GeoTiffSource;
use tilecast_core::tiles::http::{HttpSource, WmtsSource};
use tilecast_core::tiles::mbtiles::MbtilesSource;
use tilecast_core::tiles::postgres::PostgisSource;
use tilecast_core::tiles::wms::WmsSource;
use tilecast_core::tiles::{BoxedSource, TilecastCoreError};

use crate::{TilecastError, TilecastResult};

pub const LISTEN_ADDRESSES_DEFAULT: &str = "0.0.0.0:3000";
pub const KEEP_ALIVE_DEFAULT: u64 = 75;
const JPEG_QUALITY_DEFAULT: u8 = 90;
const GETMAP_TIMEOUT_DEFAULT: u64 = 60;

/// Top-level configuration file shape.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub server: SrvConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Service-wide metadata and behavior knobs.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Quality for every JPEG the server encodes, 1-100.
    pub jpeg_quality: Option<u8>,
    /// What to answer when a tile legitimately does not exist.
    pub missing_tile: Option<MissingTile>,
    /// Turn an unknown WMS layer into an error instead of skipping it.
    pub strict_layers: Option<bool>,
    /// Skip sources that fail to initialize instead of aborting startup.
    pub lenient_init: Option<bool>,
    pub getmap_timeout_seconds: Option<u64>,
}

impl ServiceConfig {
    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality.unwrap_or(JPEG_QUALITY_DEFAULT)
    }

    #[must_use]
    pub fn missing_tile(&self) -> MissingTile {
        self.missing_tile.unwrap_or_default()
    }

    #[must_use]
    pub fn strict_layers(&self) -> bool {
        self.strict_layers.unwrap_or(false)
    }

    #[must_use]
    pub fn lenient_init(&self) -> bool {
        self.lenient_init.unwrap_or(false)
    }

    #[must_use]
    pub fn getmap_timeout(&self) -> Duration {
        Duration::from_secs(self.getmap_timeout_seconds.unwrap_or(GETMAP_TIMEOUT_DEFAULT))
    }
}

/// Response for a tile that does not exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingTile {
    /// `204 No Content`.
    #[default]
    NoContent,
    /// `200` with a 1x1 transparent PNG.
    Blank,
}

#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SrvConfig {
    pub listen_addresses: Option<String>,
    pub keep_alive: Option<u64>,
    pub worker_processes: Option<usize>,
}

/// Reads and parses the JSON configuration file.
pub fn load_config(path: &Path) -> TilecastResult<AppConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| TilecastError::ConfigLoadError(e, path.to_path_buf()))?;
    serde_json::from_str(&text).map_err(|e| TilecastError::ConfigParseError(e, path.to_path_buf()))
}

/// Initializes every configured source eagerly and builds the registry.
///
/// With `lenientInit` a source that fails its backend init is logged and
/// skipped; configuration errors are always fatal.
pub async fn resolve_sources(config: &AppConfig) -> TilecastResult<TileRegistry> {
    let mut seen = HashSet::new();
    for source in &config.sources {
        source.validate()?;
        if !seen.insert(source.id.clone()) {
            return Err(tilecast_core::config::ConfigError::DuplicateSourceId(
                source.id.clone(),
            )
            .into());
        }
    }

    let mut registry = TileRegistry::new();
    for source_config in &config.sources {
        let id = source_config.id.clone();
        match build_source(source_config.clone(), &config.service).await {
            Ok(source) => {
                info!(
                    "Source {id} ({}) is ready, zoom {}..={}",
                    source_config.kind,
                    source.get_config().min_zoom(),
                    source.get_config().max_zoom(),
                );
                registry.insert(source)?;
            }
            Err(e) if config.service.lenient_init() => {
                error!("Skipping source {id}: {e}");
            }
            Err(e) => return Err(e),
        }
    }
    if registry.is_empty() {
        return Err(TilecastError::NoSources);
    }
    Ok(registry)
}

async fn build_source(
    config: SourceConfig,
    service: &ServiceConfig,
) -> TilecastResult<BoxedSource> {
    let cache = config.cache.clone();
    let source: BoxedSource = match config.kind {
        SourceKind::Mbtiles => Box::new(
            MbtilesSource::new(config)
                .await
                .map_err(TilecastCoreError::from)?,
        ),
        SourceKind::File => Box::new(FileSource::new(config).map_err(TilecastCoreError::from)?),
        SourceKind::Xyz | SourceKind::Tms => {
            Box::new(HttpSource::new(config).map_err(TilecastCoreError::from)?)
        }
        SourceKind::Wmts => Box::new(
            WmtsSource::new(config)
                .await
                .map_err(TilecastCoreError::from)?,
        ),
        SourceKind::Wms => Box::new(WmsSource::new(config).map_err(TilecastCoreError::from)?),
        SourceKind::Postgis => Box::new(
            PostgisSource::new(config)
                .await
                .map_err(TilecastCoreError::from)?,
        ),
        SourceKind::Geotiff => Box::new(
            GeoTiffSource::new(config, service.jpeg_quality())
                .map_err(TilecastCoreError::from)?,
        ),
    };
    if let Some(cache) = cache {
        let cached = CachedSource::new(source, &cache.dbfile)
            .await
            .map_err(TilecastCoreError::from)?;
        return Ok(Box::new(cached));
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config_file() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "service": {
                    "title": "City tiles",
                    "abstract": "Demo",
                    "keywords": ["tiles", "wms"],
                    "jpegQuality": 85,
                    "missingTile": "blank",
                    "lenientInit": true
                },
                "server": {"listenAddresses": "127.0.0.1:8080", "workerProcesses": 4},
                "sources": [
                    {"id": "world", "type": "mbtiles", "location": "/data/world.mbtiles"},
                    {"id": "osm", "type": "xyz",
                     "location": "https://tile.example.org/{z}/{x}/{y}.png",
                     "cache": {"type": "mbtiles", "dbfile": "/var/cache/osm.mbtiles"}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.service.title.as_deref(), Some("City tiles"));
        assert_eq!(config.service.jpeg_quality(), 85);
        assert_eq!(config.service.missing_tile(), MissingTile::Blank);
        assert!(config.service.lenient_init());
        assert_eq!(
            config.server.listen_addresses.as_deref(),
            Some("127.0.0.1:8080")
        );
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].kind, SourceKind::Xyz);
        assert!(config.sources[1].cache.is_some());
    }

    #[test]
    fn defaults_apply_to_an_empty_service_block() {
        let config: AppConfig = serde_json::from_str(r#"{"sources": []}"#).unwrap();
        assert_eq!(config.service.jpeg_quality(), 90);
        assert_eq!(config.service.missing_tile(), MissingTile::NoContent);
        assert!(!config.service.strict_layers());
        assert_eq!(config.service.getmap_timeout(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn duplicate_ids_fail_resolution() {
        let config: AppConfig = serde_json::from_str(
            r#"{"sources": [
                {"id": "a", "type": "xyz", "location": "https://x.example/{z}/{x}/{y}.png"},
                {"id": "a", "type": "xyz", "location": "https://y.example/{z}/{x}/{y}.png"}
            ]}"#,
        )
        .unwrap();
        let err = resolve_sources(&config).await.unwrap_err();
        assert!(matches!(err, TilecastError::ConfigError(_)));
    }

    #[tokio::test]
    async fn empty_source_list_yields_no_sources() {
        let config = AppConfig::default();
        assert!(matches!(
            resolve_sources(&config).await.unwrap_err(),
            TilecastError::NoSources
        ));
    }
}
