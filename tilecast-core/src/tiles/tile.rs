use tilecast_tile_utils::{TileData, TileInfo};

/// A tile payload together with the format and encoding it is served as.
///
/// Most backends serve every tile with the handle-level
/// [`TileInfo`](tilecast_tile_utils::TileInfo); HTTP-backed sources may
/// override it per response from the upstream's `Content-Type` header.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub data: TileData,
    pub info: TileInfo,
}

impl Tile {
    #[must_use]
    pub fn new(data: TileData, info: TileInfo) -> Self {
        Self { data, info }
    }
}
