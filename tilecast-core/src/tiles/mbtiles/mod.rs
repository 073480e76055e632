//! `MBTiles` 1.3 file access and the source backed by it.

mod file;
mod source;

use std::path::PathBuf;

pub use file::{Mbtiles, MbtilesMetadata};
pub use source::MbtilesSource;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum MbtilesError {
    #[error("IO error {0}: {1}")]
    IoError(#[source] std::io::Error, PathBuf),

    #[error("Unsupported characters in filepath {0}")]
    UnsupportedCharsInFilepath(PathBuf),

    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error("Invalid metadata in {1}: {0}")]
    InvalidMetadata(String, PathBuf),

    #[error("No tiles found in {0}")]
    NoTilesFound(PathBuf),
}
