use std::io;
use std::path::PathBuf;

use tilecast_core::tiles::TilecastCoreError;

/// A convenience [`Result`] for the tilecast server crate.
pub type TilecastResult<T> = Result<T, TilecastError>;

#[derive(thiserror::Error, Debug)]
pub enum TilecastError {
    #[error("Unable to bind to {1}: {0}")]
    BindingError(#[source] io::Error, String),

    #[error("Cannot read config file {1}: {0}")]
    ConfigLoadError(#[source] io::Error, PathBuf),

    #[error("Cannot parse config file {1}: {0}")]
    ConfigParseError(#[source] serde_json::Error, PathBuf),

    #[error(transparent)]
    ConfigError(#[from] tilecast_core::config::ConfigError),

    #[error(transparent)]
    CoreError(#[from] TilecastCoreError),

    #[error("No usable tile sources were configured")]
    NoSources,

    #[error(transparent)]
    IoError(#[from] io::Error),
}
