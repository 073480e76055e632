//! Source backed by a remote WMS server, fetched one `GetMap` per tile.

mod source;

pub use source::WmsSource;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum WmsError {
    #[error("Source {0} has an invalid WMS base URL {1:?}: {2}")]
    InvalidBaseUrl(String, String, #[source] url::ParseError),

    #[error("Request to {1} failed: {0}")]
    RequestFailed(#[source] reqwest::Error, String),

    #[error("Unexpected HTTP status {0} from {1}")]
    UnexpectedStatus(reqwest::StatusCode, String),

    #[error("WMS server returned a service exception for {1}: {0}")]
    ServiceException(String, String),

    #[error(transparent)]
    ClientError(#[from] crate::tiles::http::HttpError),
}
