//! WMS `GetMap` composition: stitching source tiles into an arbitrary
//! bounding-box image, plus the shared raster encode/decode helpers.

mod getmap;
pub mod image_ops;

pub use getmap::{zoom_for, GetMapRenderer, GetMapRequest, MAX_IMAGE_SIZE};

use tilecast_tile_utils::TileCoord;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("GetMap request has no layers")]
    EmptyLayers,

    #[error("GetMap bbox {0:?} is not a valid EPSG:3857 extent")]
    InvalidBbox([f64; 4]),

    #[error("GetMap size {0}x{1} is outside the supported range")]
    InvalidSize(u32, u32),

    #[error("Layer {0:?} is not configured")]
    UnknownLayer(String),

    #[error("GetMap for layer {1:?} would need {0} tiles")]
    TooManyTiles(u64, String),

    #[error("Cannot decode tile {1} of layer {2}: {0}")]
    TileDecodeError(#[source] image::ImageError, TileCoord, String),

    #[error("Cannot parse background color {0:?}")]
    InvalidBackgroundColor(String),

    #[error("PNG encoding failed: {0}")]
    PngEncodeError(#[from] png::EncodingError),

    #[error("JPEG encoding failed: {0}")]
    JpegEncodeError(#[source] image::ImageError),

    #[error("TIFF encoding failed: {0}")]
    TiffEncodeError(#[from] tiff::TiffError),
}
