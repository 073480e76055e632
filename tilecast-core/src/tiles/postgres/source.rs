use async_trait::async_trait;
use tilecast_tile_utils::{Encoding, Format, TileCoord, TileInfo};

use crate::config::{PostgisSourceConfig, SourceConfig, DEFAULT_POSTGRES_POOL_SIZE};
use crate::tiles::postgres::{PostgresError, PostgresPool};
use crate::tiles::{BoxedSource, Source, Tile, TilecastCoreResult};

/// Tile source rendering Mapbox Vector Tiles from a `PostGIS` table.
///
/// One parameterized `ST_AsMVT` query is prepared per source; the layer name
/// inside the tile equals the source id.
#[derive(Clone, Debug)]
pub struct PostgisSource {
    pool: PostgresPool,
    sql: String,
    config: SourceConfig,
    tile_info: TileInfo,
}

impl PostgisSource {
    pub async fn new(mut config: SourceConfig) -> Result<Self, PostgresError> {
        // validated upfront by SourceConfig::validate
        let postgis = config.postgis.clone().unwrap_or_else(|| PostgisSourceConfig {
            table: String::new(),
            geometry: "geom".to_string(),
            fields: Vec::new(),
            pool_size: None,
        });
        let pool_size = postgis.pool_size.unwrap_or(DEFAULT_POSTGRES_POOL_SIZE);
        let pool = PostgresPool::new(&config.id, &config.location, pool_size).await?;
        let sql = mvt_query(&config.id, &postgis);

        config.format = Some(Format::Mvt.extension().to_string());
        config.content_type = Some(Format::Mvt.content_type().to_string());
        config.srs = Some("EPSG:3857".to_string());

        Ok(Self {
            pool,
            sql,
            config,
            tile_info: TileInfo::new(Format::Mvt, Encoding::Uncompressed),
        })
    }
}

/// `ST_TileEnvelope(z, x, y)` takes the slippy coordinate directly and is the
/// `PostGIS` 3.x replacement for the older `TileBBox` helper function.
fn mvt_query(layer: &str, postgis: &PostgisSourceConfig) -> String {
    let mut columns = postgis
        .fields
        .iter()
        .map(|f| format!("\"{f}\""))
        .collect::<Vec<_>>();
    columns.push(format!(
        "ST_AsMVTGeom(\"{geom}\", ST_TileEnvelope($1, $2, $3), 4096, 64, true) AS geom",
        geom = postgis.geometry
    ));
    format!(
        "SELECT ST_AsMVT(t, '{layer}') AS mvt FROM (\
         SELECT {columns} FROM {table} \
         WHERE \"{geom}\" && ST_TileEnvelope($1, $2, $3)) AS t",
        columns = columns.join(", "),
        table = postgis.table,
        geom = postgis.geometry,
    )
}

#[async_trait]
impl Source for PostgisSource {
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
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                &self.sql,
                &[&i32::from(xyz.z), &(xyz.x as i32), &(xyz.y as i32)],
            )
            .await
            .map_err(|e| PostgresError::QueryError(e, "rendering mvt tile"))?;
        // ST_AsMVT over an empty row set still yields a (possibly empty)
        // blob; a missing row or NULL degenerates to the empty tile.
        let mvt: Vec<u8> = row
            .and_then(|r| r.get::<_, Option<Vec<u8>>>("mvt"))
            .unwrap_or_default();
        Ok(Some(Tile::new(mvt, self.tile_info)))
    }
}
