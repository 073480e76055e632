use std::path::{Path, PathBuf};

use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tilecast_tile_utils::{flip_y, TileCoord, TileData};
use tilejson::Bounds;

use crate::tiles::mbtiles::MbtilesError;

/// Handle on an `MBTiles` file. Rows are stored with the TMS Y convention;
/// all public methods take and return slippy (XYZ) coordinates.
#[derive(Clone, Debug)]
pub struct Mbtiles {
    path: PathBuf,
    filepath: String,
}

/// Values read from the `metadata` table at init.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MbtilesMetadata {
    pub name: Option<String>,
    pub format: Option<String>,
    pub bounds: Option<Bounds>,
    pub minzoom: Option<u8>,
    pub maxzoom: Option<u8>,
}

impl Mbtiles {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, MbtilesError> {
        let path = path.as_ref();
        let filepath = path
            .to_str()
            .ok_or_else(|| MbtilesError::UnsupportedCharsInFilepath(path.to_path_buf()))?
            .to_string();
        Ok(Self {
            path: path.to_path_buf(),
            filepath,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only pool for serving tiles, one connection per concurrent reader.
    pub async fn open_readonly(&self, max_connections: u32) -> Result<SqlitePool, MbtilesError> {
        debug!("Opening {} as readonly", self.filepath);
        let opt = SqliteConnectOptions::new()
            .filename(&self.filepath)
            .read_only(true);
        Ok(SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opt)
            .await?)
    }

    /// Single-connection pool used for cache writes. SQLite permits one
    /// writer, so the pool doubles as the write serializer. The file is
    /// created with the `MBTiles` schema when absent.
    pub async fn open_or_create(&self, name: &str) -> Result<SqlitePool, MbtilesError> {
        debug!("Opening or creating {}", self.filepath);
        let opt = SqliteConnectOptions::new()
            .filename(&self.filepath)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opt)
            .await?;
        self.init_schema(&pool, name).await?;
        Ok(pool)
    }

    async fn init_schema(&self, pool: &SqlitePool, name: &str) -> Result<(), MbtilesError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                 name text NOT NULL PRIMARY KEY,
                 value text)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tiles (
                 zoom_level integer NOT NULL,
                 tile_column integer NOT NULL,
                 tile_row integer NOT NULL,
                 tile_data blob,
                 PRIMARY KEY(zoom_level, tile_column, tile_row))",
        )
        .execute(pool)
        .await?;
        self.insert_metadata(pool, "name", name).await
    }

    /// Upserts one `metadata` row.
    pub async fn insert_metadata(
        &self,
        pool: &SqlitePool,
        name: &str,
        value: &str,
    ) -> Result<(), MbtilesError> {
        sqlx::query("INSERT OR REPLACE INTO metadata(name, value) VALUES(?, ?)")
            .bind(name)
            .bind(value)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn get_metadata(&self, pool: &SqlitePool) -> Result<MbtilesMetadata, MbtilesError> {
        let rows = sqlx::query("SELECT name, value FROM metadata")
            .fetch_all(pool)
            .await?;
        let mut meta = MbtilesMetadata::default();
        for row in rows {
            let name: String = row.get(0);
            let value: Option<String> = row.get(1);
            let Some(value) = value else { continue };
            match name.as_str() {
                "name" => meta.name = Some(value),
                "format" => meta.format = Some(value),
                "bounds" => {
                    meta.bounds = Some(value.parse::<Bounds>().map_err(|e| {
                        MbtilesError::InvalidMetadata(
                            format!("bad bounds {value:?}: {e}"),
                            self.path.clone(),
                        )
                    })?);
                }
                "minzoom" => {
                    meta.minzoom = Some(parse_zoom(&value, &self.path)?);
                }
                "maxzoom" => {
                    meta.maxzoom = Some(parse_zoom(&value, &self.path)?);
                }
                _ => {}
            }
        }
        Ok(meta)
    }

    /// Fetches the raw tile blob for a slippy coordinate, flipping the row to
    /// the stored TMS convention.
    pub async fn get_tile(
        &self,
        pool: &SqlitePool,
        xyz: TileCoord,
    ) -> Result<Option<TileData>, MbtilesError> {
        let row = sqlx::query(
            "SELECT tile_data FROM tiles
             WHERE zoom_level = ? AND tile_column = ? AND tile_row = ?",
        )
        .bind(i64::from(xyz.z))
        .bind(i64::from(xyz.x))
        .bind(i64::from(flip_y(xyz.y, xyz.z)))
        .fetch_optional(pool)
        .await?;
        Ok(row.and_then(|r| r.get::<Option<Vec<u8>>, _>(0)))
    }

    /// Upserts a tile blob at a slippy coordinate.
    pub async fn insert_tile(
        &self,
        pool: &SqlitePool,
        xyz: TileCoord,
        data: &[u8],
    ) -> Result<(), MbtilesError> {
        sqlx::query(
            "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data)
             VALUES (?, ?, ?, ?)",
        )
        .bind(i64::from(xyz.z))
        .bind(i64::from(xyz.x))
        .bind(i64::from(flip_y(xyz.y, xyz.z)))
        .bind(data)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn tile_count(&self, pool: &SqlitePool) -> Result<u64, MbtilesError> {
        let row = sqlx::query("SELECT count(*) FROM tiles")
            .fetch_one(pool)
            .await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }
}

fn parse_zoom(value: &str, path: &Path) -> Result<u8, MbtilesError> {
    value.trim().parse::<u8>().map_err(|e| {
        MbtilesError::InvalidMetadata(format!("bad zoom {value:?}: {e}"), path.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn scratch_file(dir: &TempDir) -> (Mbtiles, SqlitePool) {
        let mbt = Mbtiles::new(dir.path().join("scratch.mbtiles")).unwrap();
        let pool = mbt.open_or_create("scratch").await.unwrap();
        (mbt, pool)
    }

    #[tokio::test]
    async fn creates_schema_and_round_trips_a_tile() {
        let dir = TempDir::new().unwrap();
        let (mbt, pool) = scratch_file(&dir).await;
        let xyz = TileCoord { z: 2, x: 1, y: 0 };

        assert_eq!(mbt.get_tile(&pool, xyz).await.unwrap(), None);
        mbt.insert_tile(&pool, xyz, b"payload").await.unwrap();
        assert_eq!(
            mbt.get_tile(&pool, xyz).await.unwrap(),
            Some(b"payload".to_vec())
        );
        assert_eq!(mbt.tile_count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rows_are_stored_with_tms_numbering() {
        let dir = TempDir::new().unwrap();
        let (mbt, pool) = scratch_file(&dir).await;
        // Slippy row 0 at zoom 1 must land in TMS row 1.
        mbt.insert_tile(&pool, TileCoord { z: 1, x: 0, y: 0 }, b"north")
            .await
            .unwrap();
        let row = sqlx::query("SELECT tile_row FROM tiles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>(0), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_rows() {
        let dir = TempDir::new().unwrap();
        let (mbt, pool) = scratch_file(&dir).await;
        let xyz = TileCoord { z: 0, x: 0, y: 0 };
        mbt.insert_tile(&pool, xyz, b"old").await.unwrap();
        mbt.insert_tile(&pool, xyz, b"new").await.unwrap();
        assert_eq!(mbt.get_tile(&pool, xyz).await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(mbt.tile_count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn metadata_parses_bounds_and_zooms() {
        let dir = TempDir::new().unwrap();
        let (mbt, pool) = scratch_file(&dir).await;
        for (name, value) in [
            ("format", "png"),
            ("bounds", "-180,-85,180,85"),
            ("minzoom", "0"),
            ("maxzoom", "5"),
        ] {
            sqlx::query("INSERT OR REPLACE INTO metadata(name, value) VALUES(?, ?)")
                .bind(name)
                .bind(value)
                .execute(&pool)
                .await
                .unwrap();
        }
        let meta = mbt.get_metadata(&pool).await.unwrap();
        assert_eq!(meta.name.as_deref(), Some("scratch"));
        assert_eq!(meta.format.as_deref(), Some("png"));
        assert_eq!(meta.minzoom, Some(0));
        assert_eq!(meta.maxzoom, Some(5));
        let bounds = meta.bounds.unwrap();
        assert_eq!(bounds.left, -180.0);
        assert_eq!(bounds.top, 85.0);
    }
}
