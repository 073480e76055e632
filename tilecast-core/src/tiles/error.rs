/// Errors that can occur during tile resolution and rendering.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum TilecastCoreError {
    #[error(transparent)]
    ConfigError(#[from] crate::config::ConfigError),

    #[error(transparent)]
    MbtilesError(#[from] super::mbtiles::MbtilesError),

    #[error(transparent)]
    FileError(#[from] super::file::FileError),

    #[error(transparent)]
    HttpError(#[from] super::http::HttpError),

    #[error(transparent)]
    WmsError(#[from] super::wms::WmsError),

    #[error(transparent)]
    PostgresError(#[from] super::postgres::PostgresError),

    #[error(transparent)]
    GeoTiffError(#[from] super::geotiff::GeoTiffError),

    #[error(transparent)]
    CacheError(#[from] super::cache::CacheError),

    #[error(transparent)]
    RenderError(#[from] crate::render::RenderError),

    /// Errors coming from `Source` implementations outside this crate.
    #[error(transparent)]
    OtherError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A convenience [`Result`] for tiles coming from `tilecast-core`.
pub type TilecastCoreResult<T> = Result<T, TilecastCoreError>;
