//! Tile arithmetic and payload format detection shared by all tilecast crates.

mod mercator;

use std::fmt::{Display, Formatter};

pub use mercator::{
    bbox_to_tile_range, flip_y, tile_bbox, tile_count, webmercator_to_wgs84, wgs84_to_webmercator,
    TileRange, EARTH_CIRCUMFERENCE, EARTH_RADIUS, MAX_LATITUDE, MAX_ZOOM, TILE_SIZE,
};

/// Raw encoded tile payload.
pub type TileData = Vec<u8>;

/// Tile address in the XYZ (slippy) scheme: row 0 is the northernmost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl Display for TileCoord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Gif,
    Jpeg,
    Json,
    Mvt,
    Png,
    Tiff,
    Webp,
}

impl Format {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.to_ascii_lowercase().as_str() {
            "pbf" | "mvt" => Self::Mvt,
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::Webp,
            "tif" | "tiff" => Self::Tiff,
            "json" => Self::Json,
            _ => None?,
        })
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match *self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Tiff => "image/tiff",
            Self::Json => "application/json",
            Self::Mvt => "application/x-protobuf",
        }
    }

    /// Canonical file extension used in tile URLs.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match *self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
            Self::Json => "json",
            Self::Mvt => "pbf",
        }
    }

    #[must_use]
    pub fn is_raster(&self) -> bool {
        matches!(
            *self,
            Self::Png | Self::Jpeg | Self::Gif | Self::Webp | Self::Tiff
        )
    }

    /// Whether an alpha channel survives a round trip through this format.
    #[must_use]
    pub fn supports_transparency(&self) -> bool {
        matches!(*self, Self::Png | Self::Webp | Self::Gif | Self::Tiff)
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Transfer encoding of a tile payload. Only gzip occurs in the wild for
/// MVT blobs stored inside MBTiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Uncompressed,
    Gzip,
}

impl Encoding {
    #[must_use]
    pub fn content_encoding(&self) -> Option<&'static str> {
        match *self {
            Self::Uncompressed => None,
            Self::Gzip => Some("gzip"),
        }
    }
}

/// Format plus encoding, enough to produce correct HTTP response headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileInfo {
    pub format: Format,
    pub encoding: Encoding,
}

impl TileInfo {
    #[must_use]
    pub fn new(format: Format, encoding: Encoding) -> Self {
        Self { format, encoding }
    }

    /// Detects format and encoding from the payload's leading magic bytes.
    /// Compressed prefixes are assumed to wrap MVT content.
    #[must_use]
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }
        Some(match data {
            v if &v[0..2] == b"\x1f\x8b" => Self::new(Format::Mvt, Encoding::Gzip),
            v if &v[0..8] == b"\x89PNG\x0D\x0A\x1A\x0A" => Format::Png.into(),
            v if &v[0..3] == b"\xFF\xD8\xFF" => Format::Jpeg.into(),
            v if &v[0..6] == b"GIF89a" => Format::Gif.into(),
            v if &v[0..4] == b"RIFF" && &v[8..12] == b"WEBP" => Format::Webp.into(),
            v if &v[0..4] == b"II\x2A\x00" || &v[0..4] == b"MM\x00\x2A" => Format::Tiff.into(),
            v if v[0] == b'{' => Format::Json.into(),
            _ => None?,
        })
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    #[must_use]
    pub fn content_encoding(&self) -> Option<&'static str> {
        self.encoding.content_encoding()
    }
}

impl From<Format> for TileInfo {
    fn from(format: Format) -> Self {
        Self::new(format, Encoding::Uncompressed)
    }
}

impl Display for TileInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.encoding {
            Encoding::Uncompressed => write!(f, "{}", self.format),
            Encoding::Gzip => write!(f, "{} (gzip)", self.format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0D";
    const GZIP_HEADER: &[u8] = b"\x1f\x8b\x08\x00\x00\x00\x00\x00\x00\x03";

    #[test]
    fn detects_png() {
        assert_eq!(
            TileInfo::detect(PNG_HEADER),
            Some(TileInfo::new(Format::Png, Encoding::Uncompressed))
        );
    }

    #[test]
    fn detects_gzipped_mvt() {
        let mut data = GZIP_HEADER.to_vec();
        data.extend_from_slice(b"\x00\x00");
        let info = TileInfo::detect(&data).unwrap();
        assert_eq!(info.format, Format::Mvt);
        assert_eq!(info.content_encoding(), Some("gzip"));
    }

    #[test]
    fn short_payload_is_unknown() {
        assert_eq!(TileInfo::detect(b"\x89PNG"), None);
    }

    #[test]
    fn parse_aliases() {
        assert_eq!(Format::parse("JPG"), Some(Format::Jpeg));
        assert_eq!(Format::parse("pbf"), Some(Format::Mvt));
        assert_eq!(Format::parse("tif"), Some(Format::Tiff));
        assert_eq!(Format::parse("dds"), None);
    }
}
