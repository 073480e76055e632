use async_trait::async_trait;
use log::trace;
use tilecast_tile_utils::{flip_y, Encoding, Format, TileCoord, TileInfo};

use crate::config::SourceConfig;
use crate::tiles::http::{build_client, fetch_tile, HttpError};
use crate::tiles::{BoxedSource, Source, Tile, TileUrlTemplate, TilecastCoreResult};

/// Tile source fetching from a remote `{z}/{x}/{y}` URL template.
///
/// Covers both the `xyz` and `tms` source kinds; the latter only differs in
/// the row numbering of the upstream server.
///
/// Each tile's content type is taken from the response's `Content-Type`
/// header. Configuring an explicit `format` pins it instead, for servers
/// whose headers cannot be trusted.
#[derive(Clone, Debug)]
pub struct HttpSource {
    client: reqwest::Client,
    template: TileUrlTemplate,
    tms_rows: bool,
    pinned_format: bool,
    config: SourceConfig,
    tile_info: TileInfo,
}

impl HttpSource {
    pub fn new(mut config: SourceConfig) -> Result<Self, HttpError> {
        let template = TileUrlTemplate::xyz(&config.location)?;
        let client = build_client(&config.id, config.timeout_seconds())?;

        let configured = config.format.as_deref().and_then(Format::parse);
        let pinned_format = configured.is_some();
        let format = configured.unwrap_or(Format::Png);
        let tile_info = match format {
            Format::Mvt => TileInfo::new(Format::Mvt, Encoding::Gzip),
            other => other.into(),
        };

        let tms_rows = config.uses_tms_rows();
        config.format = Some(format.extension().to_string());
        config.content_type = Some(tile_info.content_type().to_string());
        config.srs = Some("EPSG:3857".to_string());

        Ok(Self {
            client,
            template,
            tms_rows,
            pinned_format,
            config,
            tile_info,
        })
    }
}

#[async_trait]
impl Source for HttpSource {
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
        let row = if self.tms_rows {
            flip_y(xyz.y, xyz.z)
        } else {
            xyz.y
        };
        let url = self.template.fill(xyz.z, xyz.x, row);
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
    use crate::config::SourceKind;

    #[test]
    fn init_fills_inferred_fields() {
        let mut config = SourceConfig::new(
            "osm",
            SourceKind::Xyz,
            "https://tile.example.org/{z}/{x}/{y}.png",
        );
        config.format = Some("png".to_string());
        let source = HttpSource::new(config).unwrap();
        let config = source.get_config();
        assert_eq!(config.content_type.as_deref(), Some("image/png"));
        assert_eq!(config.srs.as_deref(), Some("EPSG:3857"));
        assert!(!source.tms_rows);
    }

    #[test]
    fn configured_format_pins_the_content_type() {
        let mut config = SourceConfig::new(
            "osm",
            SourceKind::Xyz,
            "https://tile.example.org/{z}/{x}/{y}.png",
        );
        config.format = Some("jpg".to_string());
        assert!(HttpSource::new(config).unwrap().pinned_format);

        let config = SourceConfig::new(
            "osm",
            SourceKind::Xyz,
            "https://tile.example.org/{z}/{x}/{y}.png",
        );
        assert!(!HttpSource::new(config).unwrap().pinned_format);
    }

    #[test]
    fn tms_kind_flips_rows() {
        let config = SourceConfig::new(
            "old-style",
            SourceKind::Tms,
            "https://tms.example.org/{z}/{x}/{y}.jpg",
        );
        let source = HttpSource::new(config).unwrap();
        assert!(source.tms_rows);
    }

    #[test]
    fn template_without_placeholders_is_rejected() {
        let config = SourceConfig::new("bad", SourceKind::Xyz, "https://example.org/tiles");
        assert!(matches!(
            HttpSource::new(config),
            Err(HttpError::TemplateError(_))
        ));
    }
}
