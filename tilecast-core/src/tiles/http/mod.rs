//! Sources that fetch tiles from remote XYZ/TMS and WMTS endpoints.

mod source;
mod wmts;

use std::time::Duration;

use tilecast_tile_utils::{Encoding, Format, TileInfo};

pub use source::HttpSource;
pub use wmts::WmtsSource;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum HttpError {
    #[error(transparent)]
    TemplateError(#[from] crate::tiles::TemplateError),

    #[error("Failed to build HTTP client for source {1}: {0}")]
    ClientBuildError(#[source] reqwest::Error, String),

    #[error("Request to {1} failed: {0}")]
    RequestFailed(#[source] reqwest::Error, String),

    #[error("Unexpected HTTP status {0} from {1}")]
    UnexpectedStatus(reqwest::StatusCode, String),

    #[error("Cannot fetch WMTS capabilities from {1}: {0}")]
    CapabilitiesUnreachable(#[source] reqwest::Error, String),

    #[error("Invalid WMTS capabilities document from {1}: {0}")]
    InvalidCapabilities(String, String),

    #[error("WMTS capabilities at {1} do not advertise {0}")]
    CapabilitiesMismatch(String, String),
}

/// Pooled HTTP client shared by all requests of one source.
pub(crate) fn build_client(id: &str, timeout_secs: u64) -> Result<reqwest::Client, HttpError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent(concat!("tilecast/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| HttpError::ClientBuildError(e, id.to_string()))
}

/// Issues a GET for one tile URL. 404 is the documented "missing tile"
/// signal; any other non-2xx status is an error.
///
/// Returns the body together with the tile info derived from the response's
/// `Content-Type` header, `None` when the header is absent or not a tile
/// media type.
pub(crate) async fn fetch_tile(
    client: &reqwest::Client,
    url: &str,
) -> Result<Option<(Vec<u8>, Option<TileInfo>)>, HttpError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| HttpError::RequestFailed(e, url.to_string()))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(HttpError::UnexpectedStatus(
            response.status(),
            url.to_string(),
        ));
    }
    let header_info = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(tile_info_from_content_type);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| HttpError::RequestFailed(e, url.to_string()))?;
    Ok(Some((bytes.to_vec(), header_info)))
}

/// Maps a `Content-Type` value onto a tile info, ignoring any parameters
/// after the media type.
pub(crate) fn tile_info_from_content_type(value: &str) -> Option<TileInfo> {
    let media_type = value.split(';').next().unwrap_or(value).trim();
    Some(match media_type.to_ascii_lowercase().as_str() {
        "image/png" => Format::Png.into(),
        "image/jpeg" => Format::Jpeg.into(),
        "image/webp" => Format::Webp.into(),
        "image/gif" => Format::Gif.into(),
        "image/tiff" => Format::Tiff.into(),
        "application/x-protobuf" | "application/vnd.mapbox-vector-tile" => {
            TileInfo::new(Format::Mvt, Encoding::Gzip)
        }
        _ => None?,
    })
}
