//! Spherical (Web) Mercator arithmetic on the fixed 256px XYZ tile grid.

use std::f64::consts::PI;

use crate::TileCoord;

/// WGS84 equatorial radius in meters, as used by EPSG:3857.
pub const EARTH_RADIUS: f64 = 6_378_137.0;
/// `2 * PI * EARTH_RADIUS`, the extent of the projection along each axis.
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * PI * EARTH_RADIUS;
/// Latitude at which the square Web Mercator world is cut off.
pub const MAX_LATITUDE: f64 = 85.051_128_78;
/// Deepest addressable zoom level.
pub const MAX_ZOOM: u8 = 24;
/// Edge length of every tile, in pixels.
pub const TILE_SIZE: u32 = 256;

/// Tolerance, in tile units, for points sitting exactly on a tile edge.
const TILE_EDGE_EPSILON: f64 = 1e-6;

/// Number of tiles along one axis at zoom `z`.
#[must_use]
pub fn tile_count(zoom: u8) -> u32 {
    1 << u32::from(zoom)
}

/// Converts between the XYZ (north-origin) and TMS (south-origin) row
/// numbering. The function is its own inverse.
#[must_use]
pub fn flip_y(y: u32, zoom: u8) -> u32 {
    tile_count(zoom) - 1 - y
}

/// Projects WGS84 degrees to EPSG:3857 meters.
/// Latitude must be within `[-MAX_LATITUDE, MAX_LATITUDE]` for a finite result.
#[must_use]
pub fn wgs84_to_webmercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * ((PI / 4.0) + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Inverse of [`wgs84_to_webmercator`].
#[must_use]
pub fn webmercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Projected `[min_x, min_y, max_x, max_y]` bounds of an XYZ tile.
#[must_use]
pub fn tile_bbox(xyz: TileCoord) -> [f64; 4] {
    let span = EARTH_CIRCUMFERENCE / f64::from(tile_count(xyz.z));
    let half = EARTH_CIRCUMFERENCE / 2.0;
    let min_x = f64::from(xyz.x) * span - half;
    let max_y = half - f64::from(xyz.y) * span;
    [min_x, max_y - span, min_x + span, max_y]
}

/// Inclusive rectangle of XYZ tile indices at one zoom level.
///
/// Column indices are kept as `i64` and may fall outside `[0, 2^z)` when the
/// bbox crosses the antimeridian; callers wrap them with
/// `x.rem_euclid(tile_count(z))`. Rows are always clamped to the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl TileRange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            ((self.max_x - self.min_x + 1) * (self.max_y - self.min_y + 1)) as u64
        }
    }

    /// Iterates row-major over `(x, y)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        let range = *self;
        (range.min_y..=range.max_y)
            .flat_map(move |y| (range.min_x..=range.max_x).map(move |x| (x, y)))
    }
}

/// XYZ tiles whose extents intersect the projected `[min_x, min_y, max_x,
/// max_y]` bbox at `zoom`.
///
/// A point exactly on a tile edge belongs to the tile whose interior borders
/// it to the east/north, so a bbox equal to one tile's bounds yields exactly
/// that tile and degenerate line overlaps are not included.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn bbox_to_tile_range(bbox: [f64; 4], zoom: u8) -> TileRange {
    let span = EARTH_CIRCUMFERENCE / f64::from(tile_count(zoom));
    let half = EARTH_CIRCUMFERENCE / 2.0;
    let rows = i64::from(tile_count(zoom));

    let min_x = ((bbox[0] + half) / span + TILE_EDGE_EPSILON).floor() as i64;
    let max_x = ((bbox[2] + half) / span - TILE_EDGE_EPSILON).floor() as i64;
    let min_y = ((half - bbox[3]) / span + TILE_EDGE_EPSILON).floor() as i64;
    let max_y = ((half - bbox[1]) / span - TILE_EDGE_EPSILON).floor() as i64;

    TileRange {
        zoom,
        min_x,
        min_y: min_y.clamp(0, rows - 1),
        max_x,
        max_y: max_y.clamp(0, rows - 1),
    }
}
