use async_trait::async_trait;
use log::{debug, trace};
use tilecast_tile_utils::{Encoding, Format, TileCoord, TileInfo};

use crate::config::{SourceConfig, WmtsSourceConfig};
use crate::tiles::http::{build_client, fetch_tile, HttpError};
use crate::tiles::{BoxedSource, Source, Tile, TileUrlTemplate, TilecastCoreResult};

/// Tile source fetching from a remote WMTS endpoint, KVP or REST.
///
/// The `location` is a URL template with `{TileMatrix}`/`{TileRow}`/
/// `{TileCol}` placeholders. When a capabilities URL is configured it is
/// fetched once at init to validate the advertised layer, style, and tile
/// matrix set. As for [`HttpSource`](crate::tiles::http::HttpSource), the
/// content type follows the response header unless `format` is configured.
#[derive(Clone, Debug)]
pub struct WmtsSource {
    client: reqwest::Client,
    template: TileUrlTemplate,
    pinned_format: bool,
    config: SourceConfig,
    tile_info: TileInfo,
}

impl WmtsSource {
    pub async fn new(mut config: SourceConfig) -> Result<Self, HttpError> {
        let template = TileUrlTemplate::wmts(&config.location)?;
        let client = build_client(&config.id, config.timeout_seconds())?;

        let wmts = config.wmts.clone().unwrap_or_default();
        if let Some(capabilities_url) = &wmts.capabilities_url {
            let response = client
                .get(capabilities_url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| HttpError::CapabilitiesUnreachable(e, capabilities_url.clone()))?;
            let body = response
                .text()
                .await
                .map_err(|e| HttpError::CapabilitiesUnreachable(e, capabilities_url.clone()))?;
            validate_capabilities(&body, capabilities_url, &wmts)?;
            debug!(
                "WMTS capabilities at {capabilities_url} validated for source {}",
                config.id
            );
        }

        let configured = config.format.as_deref().and_then(Format::parse);
        let pinned_format = configured.is_some();
        let format = configured.unwrap_or(Format::Png);
        let tile_info = match format {
            Format::Mvt => TileInfo::new(Format::Mvt, Encoding::Gzip),
            other => other.into(),
        };
        config.format = Some(format.extension().to_string());
        config.content_type = Some(tile_info.content_type().to_string());
        config.srs = Some("EPSG:3857".to_string());

        Ok(Self {
            client,
            template,
            pinned_format,
            config,
            tile_info,
        })
    }
}

/// Checks that the capabilities document advertises the configured layer,
/// and, when given, its style and tile matrix set.
fn validate_capabilities(
    xml: &str,
    url: &str,
    wmts: &WmtsSourceConfig,
) -> Result<(), HttpError> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| HttpError::InvalidCapabilities(e.to_string(), url.to_string()))?;

    let Some(layer_id) = &wmts.layer else {
        return Ok(());
    };
    let layer = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "Layer")
        .find(|n| identifier_of(n) == Some(layer_id.as_str()))
        .ok_or_else(|| {
            HttpError::CapabilitiesMismatch(format!("layer {layer_id:?}"), url.to_string())
        })?;

    if let Some(style) = &wmts.style {
        let found = layer
            .children()
            .filter(|n| n.tag_name().name() == "Style")
            .any(|n| identifier_of(&n) == Some(style.as_str()));
        if !found {
            return Err(HttpError::CapabilitiesMismatch(
                format!("style {style:?} of layer {layer_id:?}"),
                url.to_string(),
            ));
        }
    }

    if let Some(set) = &wmts.tile_matrix_set {
        let linked = layer
            .descendants()
            .filter(|n| n.tag_name().name() == "TileMatrixSet")
            .any(|n| n.text().map(str::trim) == Some(set.as_str()));
        if !linked {
            return Err(HttpError::CapabilitiesMismatch(
                format!("tile matrix set {set:?} of layer {layer_id:?}"),
                url.to_string(),
            ));
        }
    }

    Ok(())
}

fn identifier_of<'a>(node: &roxmltree::Node<'a, '_>) -> Option<&'a str> {
    node.children()
        .find(|n| n.tag_name().name() == "Identifier")
        .and_then(|n| n.text())
        .map(str::trim)
}

#[async_trait]
impl Source for WmtsSource {
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
        let url = self.template.fill(xyz.z, xyz.x, xyz.y);
        let Some((data, header_info)) = fetch_tile(&self.client, &url).await? else {
            trace!("Upstream 404 for {xyz} in {}", self.config.id);
            return Ok(None);
        };
        let info = if self.pinned_format {
            self.tile_info
        } else {
            header_info.unwrap_or(self.tile_info)
        };
        Ok(Some(Tile::new(data, info)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Capabilities xmlns="http://www.opengis.net/wmts/1.0"
              xmlns:ows="http://www.opengis.net/ows/1.1">
  <Contents>
    <Layer>
      <ows:Identifier>roads</ows:Identifier>
      <Style><ows:Identifier>default</ows:Identifier></Style>
      <TileMatrixSetLink><TileMatrixSet>GoogleMapsCompatible</TileMatrixSet></TileMatrixSetLink>
    </Layer>
    <TileMatrixSet><ows:Identifier>GoogleMapsCompatible</ows:Identifier></TileMatrixSet>
  </Contents>
</Capabilities>"#;

    fn wmts_config(layer: &str, style: Option<&str>, set: Option<&str>) -> WmtsSourceConfig {
        WmtsSourceConfig {
            capabilities_url: None,
            layer: Some(layer.to_string()),
            style: style.map(ToString::to_string),
            tile_matrix_set: set.map(ToString::to_string),
        }
    }

    #[test]
    fn accepts_advertised_layer_style_and_set() {
        let wmts = wmts_config("roads", Some("default"), Some("GoogleMapsCompatible"));
        validate_capabilities(CAPABILITIES, "http://caps", &wmts).unwrap();
    }

    #[test]
    fn rejects_unknown_layer() {
        let wmts = wmts_config("buildings", None, None);
        let err = validate_capabilities(CAPABILITIES, "http://caps", &wmts).unwrap_err();
        assert!(matches!(err, HttpError::CapabilitiesMismatch(what, _) if what.contains("layer")));
    }

    #[test]
    fn rejects_unknown_style() {
        let wmts = wmts_config("roads", Some("night"), None);
        let err = validate_capabilities(CAPABILITIES, "http://caps", &wmts).unwrap_err();
        assert!(matches!(err, HttpError::CapabilitiesMismatch(what, _) if what.contains("style")));
    }

    #[test]
    fn rejects_malformed_xml() {
        let wmts = wmts_config("roads", None, None);
        let err = validate_capabilities("<no", "http://caps", &wmts).unwrap_err();
        assert!(matches!(err, HttpError::InvalidCapabilities(..)));
    }
}
