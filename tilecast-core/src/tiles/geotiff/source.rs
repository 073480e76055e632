use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbaImage;
use log::debug;
use tiff::decoder::{ChunkType, Decoder};
use tiff::tags::{PlanarConfiguration, Tag};
use tilecast_tile_utils::{tile_bbox, Format, TileCoord, TileInfo, TILE_SIZE};

use crate::config::SourceConfig;
use crate::render::image_ops;
use crate::tiles::geotiff::image::extract_region;
use crate::tiles::geotiff::model::verify_geo_keys;
use crate::tiles::geotiff::{GeoTiffError, ModelInfo, RasterProperties};
use crate::tiles::{BoxedSource, Source, Tile, TilecastCoreResult};

/// Zoom levels served below the native resolution when the configuration
/// does not say otherwise.
const DEFAULT_ZOOM_DEPTH: u8 = 6;

/// Tile source that synthesizes 256x256 EPSG:3857 tiles from a single tiled
/// GeoTIFF (EPSG:3857 or EPSG:4326 with degree units).
///
/// The TIFF decoder holds internal read state, so the file is opened per
/// call rather than shared across request threads.
#[derive(Clone)]
pub struct GeoTiffSource {
    path: PathBuf,
    props: RasterProperties,
    config: SourceConfig,
    tile_info: TileInfo,
    jpeg_quality: u8,
}

impl Debug for GeoTiffSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffSource")
            .field("id", &self.config.id)
            .field("path", &self.path)
            .field("native_zoom", &self.props.native_zoom)
            .finish()
    }
}

impl GeoTiffSource {
    pub fn new(mut config: SourceConfig, jpeg_quality: u8) -> Result<Self, GeoTiffError> {
        let path = PathBuf::from(&config.location);
        let mut decoder = open_decoder(&path)?;
        let model = ModelInfo::decode(&mut decoder);
        let props = verify_requirements(&mut decoder, &model, &path)?;

        let format = match config.format.as_deref().and_then(Format::parse) {
            Some(Format::Jpeg) => Format::Jpeg,
            _ => Format::Png,
        };
        let tile_info: TileInfo = format.into();

        let max_zoom = config.max_zoom.unwrap_or(props.native_zoom);
        let min_zoom = config
            .min_zoom
            .unwrap_or_else(|| max_zoom.saturating_sub(DEFAULT_ZOOM_DEPTH));
        config.min_zoom = Some(min_zoom);
        config.max_zoom = Some(max_zoom);
        config.format = Some(format.extension().to_string());
        config.content_type = Some(tile_info.content_type().to_string());
        config.bounds = Some(props.geographical_bounds);
        config.srs = Some("EPSG:3857".to_string());

        debug!(
            "GeoTIFF {} serves zoom {min_zoom}..={max_zoom}, native {}, {}x{} px",
            config.id, props.native_zoom, props.image_width, props.image_height
        );

        Ok(Self {
            path,
            props,
            config,
            tile_info,
            jpeg_quality,
        })
    }

    #[must_use]
    pub fn properties(&self) -> &RasterProperties {
        &self.props
    }

    /// Renders the raster region covered by `bbox` (EPSG:3857) into an image
    /// of exactly `width`x`height`, used in-process by the WMS compositor.
    pub fn get_image_part(
        &self,
        width: u32,
        height: u32,
        bbox: [f64; 4],
    ) -> Result<Option<RgbaImage>, GeoTiffError> {
        let mut decoder = open_decoder(&self.path)?;
        extract_region(&mut decoder, &self.props, bbox, width, height, &self.path)
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<File>, GeoTiffError> {
    let file = File::open(path).map_err(|e| GeoTiffError::IoError(e, path.to_path_buf()))?;
    Ok(Decoder::new(file)
        .map_err(|e| GeoTiffError::InvalidTiffFile(e, path.to_path_buf()))?
        .with_limits(tiff::decoder::Limits::default()))
}

/// Gates the file on the accepted layout and computes the raster geometry.
fn verify_requirements(
    decoder: &mut Decoder<File>,
    model: &ModelInfo,
    path: &Path,
) -> Result<RasterProperties, GeoTiffError> {
    if decoder.get_chunk_type() != ChunkType::Tile {
        return Err(GeoTiffError::invalid_format(
            path,
            "TileWidth",
            "only tiled layouts are supported, this file is striped",
        ));
    }

    let planar = decoder
        .get_tag_unsigned(Tag::PlanarConfiguration)
        .unwrap_or_else(|_| PlanarConfiguration::Chunky.to_u16());
    if planar != PlanarConfiguration::Chunky.to_u16() {
        return Err(GeoTiffError::invalid_format(
            path,
            "PlanarConfiguration",
            format!("expected contiguous (1), got {planar}"),
        ));
    }

    decoder
        .colortype()
        .map_err(|e| GeoTiffError::InvalidTiffFile(e, path.to_path_buf()))
        .and_then(|color_type| match color_type {
            tiff::ColorType::RGB(8) | tiff::ColorType::RGBA(8) => Ok(()),
            other => Err(GeoTiffError::UnsupportedColorType(other, path.to_path_buf())),
        })?;

    if model.transformation.is_some() {
        return Err(GeoTiffError::invalid_format(
            path,
            "ModelTransformation",
            "affine transforms are not supported, use pixel scale plus tie point",
        ));
    }
    match model.pixel_scale.as_deref() {
        Some(scale) if scale.len() == 3 => {}
        other => {
            return Err(GeoTiffError::invalid_format(
                path,
                "ModelPixelScale",
                format!("expected 3 values, got {:?}", other.map(<[f64]>::len)),
            ));
        }
    }
    match model.tie_points.as_deref() {
        Some(points) if points.len() == 6 => {
            // A single tie point anchoring raster (0,0,0) to model space.
            if points[0] != 0.0 || points[1] != 0.0 || points[2] != 0.0 || points[5] != 0.0 {
                return Err(GeoTiffError::invalid_format(
                    path,
                    "ModelTiePoint",
                    format!("tie point must anchor the raster origin, got {points:?}"),
                ));
            }
        }
        other => {
            return Err(GeoTiffError::invalid_format(
                path,
                "ModelTiePoint",
                format!("expected 6 values, got {:?}", other.map(<[f64]>::len)),
            ));
        }
    }
    verify_geo_keys(&model.geo_keys, path)?;

    let dimensions = decoder.dimensions().map_err(|e| {
        GeoTiffError::TagsNotFound(
            e,
            vec![Tag::ImageWidth.to_u16(), Tag::ImageLength.to_u16()],
            path.to_path_buf(),
        )
    })?;
    let tile_dimensions = decoder.chunk_dimensions();
    RasterProperties::compute(model, dimensions, tile_dimensions, path)
}

#[async_trait]
impl Source for GeoTiffSource {
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

    fn as_raster(&self) -> Option<&GeoTiffSource> {
        Some(self)
    }

    async fn get_tile(&self, xyz: TileCoord) -> TilecastCoreResult<Option<Tile>> {
        if !self.is_valid_zoom(xyz.z) {
            return Ok(None);
        }
        let bbox = tile_bbox(xyz);
        let mut decoder = open_decoder(&self.path)?;
        let Some(image) = extract_region(
            &mut decoder,
            &self.props,
            bbox,
            TILE_SIZE,
            TILE_SIZE,
            &self.path,
        )?
        else {
            return Ok(None);
        };
        let encoded = match self.tile_info.format {
            Format::Jpeg => image_ops::encode_jpeg(&image, self.jpeg_quality)
                .map_err(GeoTiffError::EncodingFailed)?,
            _ => image_ops::encode_png(&image).map_err(GeoTiffError::EncodingFailed)?,
        };
        Ok(Some(Tile::new(encoded, self.tile_info)))
    }
}
