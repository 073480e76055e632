//! Source that synthesizes Web Mercator tiles from a single tiled GeoTIFF.

mod image;
mod model;
mod source;

use std::path::PathBuf;

pub use model::{GeoKeys, ModelInfo, RasterProperties};
pub use source::GeoTiffSource;

use tiff::TiffError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum GeoTiffError {
    #[error("IO error {0}: {1}")]
    IoError(#[source] std::io::Error, PathBuf),

    #[error("Couldn't decode {1} as tiff file: {0}")]
    InvalidTiffFile(#[source] TiffError, PathBuf),

    #[error("Couldn't find tags {1:?} in tiff file {2}: {0}")]
    TagsNotFound(#[source] TiffError, Vec<u16>, PathBuf),

    /// The file is a well-formed TIFF but violates one of the accepted
    /// GeoTIFF layouts; `key` names the offending tag or GeoKey.
    #[error("GeoTIFF {path} is not usable, {key}: {reason}")]
    InvalidFormat {
        path: PathBuf,
        key: &'static str,
        reason: String,
    },

    #[error("The color type {0:?} and bit depth of the tiff file {1} is not supported")]
    UnsupportedColorType(tiff::ColorType, PathBuf),

    #[error("Failed to read chunk {1} from tiff file {2}: {0}")]
    ReadChunkFailed(#[source] TiffError, u32, PathBuf),

    #[error(transparent)]
    EncodingFailed(#[from] crate::render::RenderError),
}

impl GeoTiffError {
    pub(crate) fn invalid_format(
        path: &std::path::Path,
        key: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFormat {
            path: path.to_path_buf(),
            key,
            reason: reason.into(),
        }
    }
}
