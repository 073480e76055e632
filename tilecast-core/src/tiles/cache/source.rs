use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use log::{debug, trace};
use sqlx::sqlite::SqlitePool;
use tilecast_tile_utils::{TileCoord, TileInfo};

use crate::config::SourceConfig;
use crate::tiles::cache::CacheError;
use crate::tiles::mbtiles::{Mbtiles, MbtilesError};
use crate::tiles::{BoxedSource, Source, Tile, TilecastCoreResult};

type PendingTile = Shared<BoxFuture<'static, Result<Option<Tile>, CacheError>>>;

/// Read-through `MBTiles` cache around another source.
///
/// Hits are answered from the cache file. On a miss at most one inner fetch
/// per tile coordinate is in flight; concurrent requesters for the same key
/// await the same future and share its outcome. Successful fetches are
/// upserted through a single-connection pool, which serializes SQLite
/// writes; `Ok(None)` and errors propagate without being cached.
#[derive(Clone)]
pub struct CachedSource {
    inner: BoxedSource,
    mbtiles: Mbtiles,
    pool: SqlitePool,
    inflight: Arc<DashMap<TileCoord, PendingTile>>,
}

impl Debug for CachedSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSource")
            .field("inner", &self.inner)
            .field("cache", &self.mbtiles.path())
            .finish()
    }
}

impl CachedSource {
    /// Opens (or lazily creates, with the `MBTiles` schema) the cache file.
    pub async fn new(inner: BoxedSource, dbfile: &std::path::Path) -> Result<Self, MbtilesError> {
        let mbtiles = Mbtiles::new(dbfile)?;
        let pool = mbtiles.open_or_create(inner.get_id()).await?;
        debug!(
            "Caching source {} in {}",
            inner.get_id(),
            dbfile.display()
        );
        Ok(Self {
            inner,
            mbtiles,
            pool,
            inflight: Arc::new(DashMap::new()),
        })
    }

    /// The cache file holds only the payload; the info is re-derived from
    /// the magic bytes, falling back to the inner handle's default.
    fn revive(&self, data: Vec<u8>) -> Tile {
        let info = TileInfo::detect(&data).unwrap_or_else(|| self.inner.get_tile_info());
        Tile::new(data, info)
    }

    async fn cached(&self, xyz: TileCoord) -> Result<Option<Tile>, CacheError> {
        let data = self
            .mbtiles
            .get_tile(&self.pool, xyz)
            .await
            .map_err(|e| CacheError::Db(Arc::new(e), self.inner.get_id().to_string()))?;
        Ok(data.map(|data| self.revive(data)))
    }

    /// Builds the shared fetch-and-store future for one cache miss.
    fn fetch_slot(&self, xyz: TileCoord) -> PendingTile {
        let inner = self.inner.clone();
        let mbtiles = self.mbtiles.clone();
        let pool = self.pool.clone();
        let id = self.inner.get_id().to_string();
        let fallback_info = self.inner.get_tile_info();
        async move {
            // A racing requester may have populated the cache between the
            // miss and this slot starting.
            let cached = mbtiles
                .get_tile(&pool, xyz)
                .await
                .map_err(|e| CacheError::Db(Arc::new(e), id.clone()))?;
            if let Some(data) = cached {
                let info = TileInfo::detect(&data).unwrap_or(fallback_info);
                return Ok(Some(Tile::new(data, info)));
            }
            let fetched = inner
                .get_tile(xyz)
                .await
                .map_err(|e| CacheError::Upstream(Arc::new(e)))?;
            if let Some(tile) = &fetched {
                mbtiles
                    .insert_tile(&pool, xyz, &tile.data)
                    .await
                    .map_err(|e| CacheError::Db(Arc::new(e), id.clone()))?;
                trace!("Cached tile {xyz} of {id}");
            }
            Ok(fetched)
        }
        .boxed()
        .shared()
    }
}

#[async_trait]
impl Source for CachedSource {
    fn get_id(&self) -> &str {
        self.inner.get_id()
    }

    fn get_config(&self) -> &SourceConfig {
        self.inner.get_config()
    }

    fn get_tile_info(&self) -> TileInfo {
        self.inner.get_tile_info()
    }

    fn clone_source(&self) -> BoxedSource {
        Box::new(self.clone())
    }

    async fn get_tile(&self, xyz: TileCoord) -> TilecastCoreResult<Option<Tile>> {
        if let Some(tile) = self.cached(xyz).await? {
            return Ok(Some(tile));
        }
        let slot = self
            .inflight
            .entry(xyz)
            .or_insert_with(|| self.fetch_slot(xyz))
            .clone();
        let outcome = slot.await;
        self.inflight.remove(&xyz);
        Ok(outcome?)
    }
}
