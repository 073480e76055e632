use async_trait::async_trait;
use tilecast_tile_utils::{tile_bbox, Format, TileCoord, TileInfo};
use url::Url;

use crate::config::SourceConfig;
use crate::tiles::http::build_client;
use crate::tiles::wms::WmsError;
use crate::tiles::{BoxedSource, Source, Tile, TilecastCoreResult};

/// Tile source that synthesizes one WMS 1.1.1 `GetMap` request per tile.
///
/// The `location` is the service base URL; query parameters already present
/// (typically `layers=`) are preserved, and the protocol parameters are
/// appended per request for the tile's EPSG:3857 bounding box.
#[derive(Clone, Debug)]
pub struct WmsSource {
    client: reqwest::Client,
    base: Url,
    config: SourceConfig,
    tile_info: TileInfo,
}

impl WmsSource {
    pub fn new(mut config: SourceConfig) -> Result<Self, WmsError> {
        let base = Url::parse(&config.location)
            .map_err(|e| WmsError::InvalidBaseUrl(config.id.clone(), config.location.clone(), e))?;
        let client = build_client(&config.id, config.timeout_seconds())?;

        let format = config
            .format
            .as_deref()
            .and_then(Format::parse)
            .unwrap_or(Format::Png);
        let tile_info: TileInfo = format.into();
        config.format = Some(format.extension().to_string());
        config.content_type = Some(tile_info.content_type().to_string());
        config.srs = Some("EPSG:3857".to_string());

        Ok(Self {
            client,
            base,
            config,
            tile_info,
        })
    }

    fn getmap_url(&self, xyz: TileCoord) -> Url {
        let bbox = tile_bbox(xyz);
        let mut url = self.base.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("SERVICE", "WMS")
                .append_pair("VERSION", "1.1.1")
                .append_pair("REQUEST", "GetMap")
                .append_pair("SRS", "EPSG:3857")
                .append_pair(
                    "BBOX",
                    &format!("{},{},{},{}", bbox[0], bbox[1], bbox[2], bbox[3]),
                )
                .append_pair("WIDTH", "256")
                .append_pair("HEIGHT", "256")
                .append_pair("FORMAT", self.tile_info.content_type())
                .append_pair("STYLES", "");
            if self.tile_info.format.supports_transparency() {
                query.append_pair("TRANSPARENT", "TRUE");
            }
        }
        url
    }
}

/// A 2xx body that is XML instead of image bytes is a service exception.
fn is_xml_body(content_type: Option<&str>, body: &[u8]) -> bool {
    if content_type.is_some_and(|ct| ct.contains("xml")) {
        return true;
    }
    body.iter()
        .position(|b| !b.is_ascii_whitespace())
        .is_some_and(|i| body[i] == b'<')
}

#[async_trait]
impl Source for WmsSource {
    fn get_id(&self) -> &str {
        &self.config.id
    }

    fn get_config(&self) -> &SourceConfig {
        &self.config
    }

    fn get_tile_info(&self) -> TileInfo {
        self.tile_info
    }

    fn clone_source(&self) -> BoxedSource {
        Box::new(self.clone())
    }

    async fn get_tile(&self, xyz: TileCoord) -> TilecastCoreResult<Option<Tile>> {
        if !self.is_valid_zoom(xyz.z) {
            return Ok(None);
        }
        let url = self.getmap_url(xyz);
        let url_str = url.to_string();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WmsError::RequestFailed(e, url_str.clone()))?;
        if !response.status().is_success() {
            return Err(WmsError::UnexpectedStatus(response.status(), url_str).into());
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| WmsError::RequestFailed(e, url_str.clone()))?;
        if is_xml_body(content_type.as_deref(), &body) {
            let snippet = String::from_utf8_lossy(&body[..body.len().min(512)]).into_owned();
            return Err(WmsError::ServiceException(snippet, url_str).into());
        }
        // The GetMap FORMAT parameter dictates the payload; the header only
        // serves the exception check above.
        Ok(Some(Tile::new(body.to_vec(), self.tile_info)))
    }
}
