//! Read-through `MBTiles` cache wrapping a remote source.

mod source;

use std::sync::Arc;

pub use source::CachedSource;

/// Cache failures must be cloneable so that every requester sharing one
/// in-flight fetch receives the same outcome.
#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone)]
pub enum CacheError {
    #[error("Cache database {1} failed: {0}")]
    Db(#[source] Arc<super::mbtiles::MbtilesError>, String),

    #[error(transparent)]
    Upstream(Arc<super::TilecastCoreError>),
}
