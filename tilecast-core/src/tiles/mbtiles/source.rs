use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use async_trait::async_trait;
use log::trace;
use sqlx::sqlite::SqlitePool;
use tilecast_tile_utils::{Encoding, Format, TileCoord, TileInfo};

use crate::config::SourceConfig;
use crate::tiles::mbtiles::{Mbtiles, MbtilesError};
use crate::tiles::{BoxedSource, Source, Tile, TilecastCoreResult};

/// Number of pooled read connections per `MBTiles` file.
const READ_POOL_SIZE: u32 = 8;

/// Tile source that reads from a local `MBTiles` file.
#[derive(Clone)]
pub struct MbtilesSource {
    mbtiles: Mbtiles,
    pool: SqlitePool,
    config: SourceConfig,
    tile_info: TileInfo,
}

impl Debug for MbtilesSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MbtilesSource")
            .field("id", &self.config.id)
            .field("path", &self.mbtiles.path())
            .finish()
    }
}

impl MbtilesSource {
    /// Opens the file, reads its `metadata` table, and re-emits the source
    /// configuration with the inferred fields filled in.
    pub async fn new(mut config: SourceConfig) -> Result<Self, MbtilesError> {
        let path = PathBuf::from(&config.location);
        let mbtiles = Mbtiles::new(&path)?;
        let pool = mbtiles.open_readonly(READ_POOL_SIZE).await?;
        let meta = mbtiles.get_metadata(&pool).await?;

        let format_name = config
            .format
            .clone()
            .or(meta.format)
            .unwrap_or_else(|| "png".to_string());
        let format = Format::parse(&format_name).ok_or_else(|| {
            MbtilesError::InvalidMetadata(format!("unknown format {format_name:?}"), path.clone())
        })?;
        // MVT blobs inside MBTiles are stored gzip-compressed and returned
        // verbatim with their content encoding preserved.
        let tile_info = match format {
            Format::Mvt => TileInfo::new(Format::Mvt, Encoding::Gzip),
            other => other.into(),
        };

        if config.title.is_none() {
            config.title = meta.name;
        }
        config.format = Some(format.extension().to_string());
        config.content_type = Some(tile_info.content_type().to_string());
        config.min_zoom = config.min_zoom.or(meta.minzoom);
        config.max_zoom = config.max_zoom.or(meta.maxzoom);
        config.bounds = config.bounds.or(meta.bounds);
        config.srs = Some("EPSG:3857".to_string());

        Ok(Self {
            mbtiles,
            pool,
            config,
            tile_info,
        })
    }
}

#[async_trait]
impl Source for MbtilesSource {
    fn get_id(&self) -> &str {
        &self.config.id
    }

    fn get_config(&self) -> &SourceConfig {
        &self.config
    }

    fn get_tile_info(&self) -> TileInfo {
        self.tile_info
    }

    fn clone_source(&self) -> BoxedSource {
        Box::new(self.clone())
    }

    async fn get_tile(&self, xyz: TileCoord) -> TilecastCoreResult<Option<Tile>> {
        if !self.is_valid_zoom(xyz.z) {
            return Ok(None);
        }
        let tile = self.mbtiles.get_tile(&self.pool, xyz).await?;
        if tile.is_none() {
            trace!("No tile {xyz} in {}", self.config.id);
        }
        Ok(tile.map(|data| Tile::new(data, self.tile_info)))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::SourceKind;

    async fn world_fixture(dir: &TempDir) -> (std::path::PathBuf, Vec<u8>) {
        let path = dir.path().join("world.mbtiles");
        let mbt = Mbtiles::new(&path).unwrap();
        let pool = mbt.open_or_create("world").await.unwrap();
        for (name, value) in [("format", "png"), ("minzoom", "0"), ("maxzoom", "3")] {
            sqlx::query("INSERT OR REPLACE INTO metadata(name, value) VALUES(?, ?)")
                .bind(name)
                .bind(value)
                .execute(&pool)
                .await
                .unwrap();
        }
        let payload = b"\x89PNG\x0D\x0A\x1A\x0Afake-but-stable".to_vec();
        mbt.insert_tile(&pool, TileCoord { z: 0, x: 0, y: 0 }, &payload)
            .await
            .unwrap();
        pool.close().await;
        (path, payload)
    }

    #[tokio::test]
    async fn serves_the_exact_stored_bytes() {
        let dir = TempDir::new().unwrap();
        let (path, payload) = world_fixture(&dir).await;
        let config = SourceConfig::new("world", SourceKind::Mbtiles, path.to_str().unwrap());
        let source = MbtilesSource::new(config).await.unwrap();

        let tile = source
            .get_tile(TileCoord { z: 0, x: 0, y: 0 })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tile.data, payload);
        assert_eq!(tile.info, Format::Png.into());
    }

    #[tokio::test]
    async fn infers_configuration_from_metadata() {
        let dir = TempDir::new().unwrap();
        let (path, _) = world_fixture(&dir).await;
        let config = SourceConfig::new("world", SourceKind::Mbtiles, path.to_str().unwrap());
        let source = MbtilesSource::new(config).await.unwrap();

        let config = source.get_config();
        assert_eq!(config.format.as_deref(), Some("png"));
        assert_eq!(config.content_type.as_deref(), Some("image/png"));
        assert_eq!(config.min_zoom, Some(0));
        assert_eq!(config.max_zoom, Some(3));
        assert_eq!(config.srs.as_deref(), Some("EPSG:3857"));
        assert_eq!(config.title.as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn absent_tile_and_out_of_range_zoom_are_none() {
        let dir = TempDir::new().unwrap();
        let (path, _) = world_fixture(&dir).await;
        let config = SourceConfig::new("world", SourceKind::Mbtiles, path.to_str().unwrap());
        let source = MbtilesSource::new(config).await.unwrap();

        assert_eq!(
            source.get_tile(TileCoord { z: 1, x: 1, y: 1 }).await.unwrap(),
            None
        );
        assert_eq!(
            source.get_tile(TileCoord { z: 9, x: 0, y: 0 }).await.unwrap(),
            None
        );
    }
}
