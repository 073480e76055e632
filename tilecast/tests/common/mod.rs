use std::path::Path;

use image::{Rgba, RgbaImage};
use tilecast_core::config::{SourceConfig, SourceKind};
use tilecast_core::render::image_ops;
use tilecast_core::tiles::catalog::TileRegistry;
use tilecast_core::tiles::mbtiles::{Mbtiles, MbtilesSource};
use tilecast_tile_utils::TileCoord;

/// A 256x256 PNG with distinct quadrant colors, so axis mix-ups show up.
pub fn quadrant_tile() -> Vec<u8> {
    let mut image = RgbaImage::new(256, 256);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        *pixel = match (x < 128, y < 128) {
            (true, true) => Rgba([200, 40, 40, 255]),
            (false, true) => Rgba([40, 200, 40, 255]),
            (true, false) => Rgba([40, 40, 200, 255]),
            (false, false) => Rgba([200, 200, 40, 255]),
        };
    }
    image_ops::encode_png(&image).unwrap()
}

/// Writes an MBTiles file holding the given slippy-addressed tiles.
pub async fn write_mbtiles(path: &Path, max_zoom: u8, tiles: &[(TileCoord, Vec<u8>)]) {
    let mbt = Mbtiles::new(path).unwrap();
    let pool = mbt.open_or_create("fixture").await.unwrap();
    for (name, value) in [
        ("format", "png".to_string()),
        ("minzoom", "0".to_string()),
        ("maxzoom", max_zoom.to_string()),
        ("bounds", "-180,-85,180,85".to_string()),
    ] {
        mbt.insert_metadata(&pool, name, &value).await.unwrap();
    }
    for (xyz, data) in tiles {
        mbt.insert_tile(&pool, *xyz, data).await.unwrap();
    }
    pool.close().await;
}

/// Registry with a single MBTiles source named `world`.
pub async fn world_registry(path: &Path, max_zoom: u8, tiles: &[(TileCoord, Vec<u8>)]) -> TileRegistry {
    write_mbtiles(path, max_zoom, tiles).await;
    let config = SourceConfig::new("world", SourceKind::Mbtiles, path.to_str().unwrap());
    let source = MbtilesSource::new(config).await.unwrap();
    let mut registry = TileRegistry::new();
    registry.insert(Box::new(source)).unwrap();
    registry
}
