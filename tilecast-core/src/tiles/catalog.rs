//! Immutable name-to-source registry and the layer catalog derived from it.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use serde::Serialize;
use tilejson::Bounds;

use crate::config::ConfigError;
use crate::tiles::{BoxedSource, Source};

/// Registry of tile sources, populated at startup and immutable thereafter.
#[derive(Clone, Default)]
pub struct TileRegistry {
    sources: HashMap<String, BoxedSource>,
}

impl Debug for TileRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileRegistry")
            .field("sources", &self.ids())
            .finish()
    }
}

impl TileRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source; ids must be unique within the process.
    pub fn insert(&mut self, source: BoxedSource) -> Result<(), ConfigError> {
        let id = source.get_id().to_string();
        if self.sources.contains_key(&id) {
            return Err(ConfigError::DuplicateSourceId(id));
        }
        self.sources.insert(id, source);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&dyn Source> {
        self.sources.get(id).map(Box::as_ref)
    }

    /// Source ids in lexicographic order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Layer metadata for capabilities documents, ordered by id.
    #[must_use]
    pub fn catalog(&self) -> Vec<LayerEntry> {
        self.ids()
            .into_iter()
            .map(|id| LayerEntry::from_source(self.sources[id].as_ref()))
            .collect()
    }
}

/// Per-layer metadata derived from a source's post-init configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerEntry {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content_type: String,
    pub format: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    /// Whether the payload is a raster image, as opposed to vector tiles.
    pub raster: bool,
}

impl LayerEntry {
    fn from_source(source: &dyn Source) -> Self {
        let config = source.get_config();
        let info = source.get_tile_info();
        Self {
            id: config.id.clone(),
            title: config.title.clone().unwrap_or_else(|| config.id.clone()),
            description: config.description.clone(),
            content_type: info.content_type().to_string(),
            format: info.format.extension().to_string(),
            min_zoom: config.min_zoom(),
            max_zoom: config.max_zoom(),
            bounds: config.bounds,
            raster: info.format.is_raster(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use tilecast_tile_utils::{Format, TileCoord, TileData, TileInfo};

    use super::*;
    use crate::config::{SourceConfig, SourceKind};
    use crate::tiles::{Tile, TilecastCoreResult};

    /// Minimal in-memory source shared by this crate's tests.
    #[derive(Clone, Debug)]
    pub(crate) struct StaticSource {
        pub config: SourceConfig,
        pub info: TileInfo,
        pub data: Option<TileData>,
    }

    impl StaticSource {
        pub fn png(id: &str, data: Option<TileData>) -> Self {
            Self {
                config: SourceConfig::new(id, SourceKind::File, "/tiles/{z}/{x}/{y}.png"),
                info: Format::Png.into(),
                data,
            }
        }
    }

    #[async_trait]
    impl Source for StaticSource {
        fn get_id(&self) -> &str {
            &self.config.id
        }

        fn get_config(&self) -> &SourceConfig {
            &self.config
        }

        fn get_tile_info(&self) -> TileInfo {
            self.info
        }

        fn clone_source(&self) -> BoxedSource {
            Box::new(self.clone())
        }

        async fn get_tile(&self, _xyz: TileCoord) -> TilecastCoreResult<Option<Tile>> {
            Ok(self.data.clone().map(|data| Tile::new(data, self.info)))
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = TileRegistry::new();
        registry
            .insert(Box::new(StaticSource::png("world", None)))
            .unwrap();
        let err = registry
            .insert(Box::new(StaticSource::png("world", None)))
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSourceId(id) if id == "world"));
    }

    #[test]
    fn catalog_is_sorted_and_derived() {
        let mut registry = TileRegistry::new();
        registry
            .insert(Box::new(StaticSource::png("beta", None)))
            .unwrap();
        registry
            .insert(Box::new(StaticSource::png("alpha", None)))
            .unwrap();
        let catalog = registry.catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].id, "alpha");
        assert_eq!(catalog[0].title, "alpha");
        assert_eq!(catalog[1].content_type, "image/png");
        assert!(catalog[1].raster);
    }
}
