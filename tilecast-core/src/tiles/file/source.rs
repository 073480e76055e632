use std::io::ErrorKind;

use async_trait::async_trait;
use log::trace;
use tilecast_tile_utils::{flip_y, Encoding, Format, TileCoord, TileInfo};

use crate::config::SourceConfig;
use crate::tiles::file::FileError;
use crate::tiles::{BoxedSource, Source, Tile, TileUrlTemplate, TilecastCoreResult};

/// Tile source reading a `{z}/{x}/{y}` path template on the local filesystem.
#[derive(Clone, Debug)]
pub struct FileSource {
    template: TileUrlTemplate,
    tms_rows: bool,
    config: SourceConfig,
    tile_info: TileInfo,
}

impl FileSource {
    pub fn new(mut config: SourceConfig) -> Result<Self, FileError> {
        let template = TileUrlTemplate::xyz(&config.location)?;
        let format = config
            .format
            .as_deref()
            .and_then(Format::parse)
            .unwrap_or_else(|| format_from_extension(&config.location));
        let tile_info = match format {
            Format::Mvt => TileInfo::new(Format::Mvt, Encoding::Gzip),
            other => other.into(),
        };

        let tms_rows = config.uses_tms_rows();
        config.format = Some(format.extension().to_string());
        config.content_type = Some(tile_info.content_type().to_string());
        config.srs = Some("EPSG:3857".to_string());

        Ok(Self {
            template,
            tms_rows,
            config,
            tile_info,
        })
    }
}

/// Best-effort format guess from the template's file extension.
fn format_from_extension(location: &str) -> Format {
    location
        .rsplit('.')
        .next()
        .and_then(Format::parse)
        .unwrap_or(Format::Png)
}

#[async_trait]
impl Source for FileSource {
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
        let path = self.template.fill(xyz.z, xyz.x, row);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Tile::new(data, self.tile_info))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("No tile file {path} for {xyz} in {}", self.config.id);
                Ok(None)
            }
            Err(e) => Err(FileError::IoError(e, path).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::SourceKind;

    fn config(dir: &TempDir, tms: Option<bool>) -> SourceConfig {
        let template = format!("{}/{{z}}/{{x}}/{{y}}.png", dir.path().display());
        let mut config = SourceConfig::new("trees", SourceKind::File, template);
        config.tms = tms;
        config
    }

    #[tokio::test]
    async fn reads_tiles_and_reports_missing_ones() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("1/0")).unwrap();
        std::fs::write(dir.path().join("1/0/1.png"), b"south-west").unwrap();

        let source = FileSource::new(config(&dir, None)).unwrap();
        let tile = source
            .get_tile(TileCoord { z: 1, x: 0, y: 1 })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tile.data, b"south-west".to_vec());
        assert_eq!(
            source.get_tile(TileCoord { z: 1, x: 1, y: 1 }).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn tms_flag_flips_the_row() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("1/0")).unwrap();
        std::fs::write(dir.path().join("1/0/0.png"), b"tms-row-zero").unwrap();

        let source = FileSource::new(config(&dir, Some(true))).unwrap();
        // Slippy row 1 at zoom 1 is TMS row 0.
        let tile = source
            .get_tile(TileCoord { z: 1, x: 0, y: 1 })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tile.data, b"tms-row-zero".to_vec());
    }

    #[test]
    fn infers_format_from_extension() {
        let dir = TempDir::new().unwrap();
        let source = FileSource::new(config(&dir, None)).unwrap();
        assert_eq!(source.get_tile_info().format, Format::Png);
        assert_eq!(source.get_config().content_type.as_deref(), Some("image/png"));
    }
}
