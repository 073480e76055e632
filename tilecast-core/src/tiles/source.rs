use std::fmt::Debug;

use async_trait::async_trait;
use tilecast_tile_utils::{TileCoord, TileInfo};

use crate::config::SourceConfig;
use crate::tiles::geotiff::GeoTiffSource;
use crate::tiles::{Tile, TilecastCoreResult};

/// Core trait for tile backends.
///
/// `Ok(None)` is the explicit "no tile exists" answer (including a zoom level
/// outside the source's range) and is distinct from an error. Implementations
/// must tolerate concurrent `get_tile` calls on the same handle.
#[async_trait]
pub trait Source: Send + Sync + Debug {
    /// Unique source identifier used in URLs.
    fn get_id(&self) -> &str;

    /// The configuration record, re-emitted after init with inferred fields
    /// (format, content type, zoom range, geographical bounds, srs) filled.
    fn get_config(&self) -> &SourceConfig;

    /// Payload format and encoding this source serves by default. Individual
    /// tiles may carry a different [`Tile::info`] when the backend reports
    /// one per response.
    fn get_tile_info(&self) -> TileInfo;

    /// Creates a boxed clone for trait object storage.
    fn clone_source(&self) -> BoxedSource;

    /// Validates zoom level against the configured min/max range.
    fn is_valid_zoom(&self, zoom: u8) -> bool {
        self.get_config().is_valid_zoom(zoom)
    }

    /// The in-process raster path used by the WMS compositor, available only
    /// for GeoTIFF-backed sources.
    fn as_raster(&self) -> Option<&GeoTiffSource> {
        None
    }

    /// Retrieves the encoded tile at `xyz` (slippy row numbering).
    async fn get_tile(&self, xyz: TileCoord) -> TilecastCoreResult<Option<Tile>>;
}

/// Boxed tile source trait object for storage in collections.
pub type BoxedSource = Box<dyn Source>;

impl Clone for BoxedSource {
    fn clone(&self) -> Self {
        self.clone_source()
    }
}
