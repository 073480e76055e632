use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use log::{debug, warn};
use tilecast_tile_utils::{
    bbox_to_tile_range, tile_count, Format, TileCoord, EARTH_CIRCUMFERENCE, MAX_ZOOM, TILE_SIZE,
};

use crate::render::{image_ops, RenderError};
use crate::tiles::catalog::TileRegistry;
use crate::tiles::TilecastCoreResult;

/// Hard cap on the number of tiles fetched for a single layer of one GetMap.
const MAX_GETMAP_TILES: u64 = 4096;

/// Largest accepted output edge, in pixels.
pub const MAX_IMAGE_SIZE: u32 = 32_768;

/// A validated `GetMap` request in EPSG:3857.
#[derive(Clone, Debug)]
pub struct GetMapRequest {
    pub width: u32,
    pub height: u32,
    /// `[min_x, min_y, max_x, max_y]` in meters; may cross the antimeridian.
    pub bbox: [f64; 4],
    /// Back-to-front drawing order.
    pub layers: Vec<String>,
    pub format: Format,
    pub transparent: bool,
    pub bgcolor: Rgba<u8>,
}

/// Stitches source tiles into a single image of the requested extent.
pub struct GetMapRenderer<'a> {
    registry: &'a TileRegistry,
    jpeg_quality: u8,
    /// When set, an unknown layer id aborts the request instead of being
    /// skipped with a warning.
    strict_layers: bool,
}

impl<'a> GetMapRenderer<'a> {
    #[must_use]
    pub fn new(registry: &'a TileRegistry, jpeg_quality: u8, strict_layers: bool) -> Self {
        Self {
            registry,
            jpeg_quality,
            strict_layers,
        }
    }

    pub async fn render(&self, request: &GetMapRequest) -> TilecastCoreResult<Vec<u8>> {
        validate(request)?;

        let background = if request.transparent && request.format.supports_transparency() {
            request.bgcolor
        } else {
            let mut opaque = request.bgcolor;
            opaque.0[3] = 255;
            opaque
        };
        let mut canvas = RgbaImage::from_pixel(request.width, request.height, background);

        for name in &request.layers {
            let Some(source) = self.registry.get(name) else {
                if self.strict_layers {
                    return Err(RenderError::UnknownLayer(name.clone()).into());
                }
                warn!("GetMap layer {name:?} is not configured, skipping");
                continue;
            };
            if let Some(raster) = source.as_raster() {
                let part =
                    raster.get_image_part(request.width, request.height, request.bbox)?;
                if let Some(part) = part {
                    imageops::overlay(&mut canvas, &part, 0, 0);
                }
                continue;
            }
            let info = source.get_tile_info();
            if !info.format.is_raster() {
                warn!(
                    "GetMap layer {name:?} serves {} tiles which cannot be rasterized, skipping",
                    info.format
                );
                continue;
            }
            self.draw_tiled_layer(&mut canvas, request, name, source).await?;
        }

        let encoded = match request.format {
            Format::Jpeg => image_ops::encode_jpeg(&canvas, self.jpeg_quality)?,
            Format::Tiff => image_ops::encode_tiff(&canvas)?,
            _ => image_ops::encode_png(&canvas)?,
        };
        Ok(encoded)
    }

    async fn draw_tiled_layer(
        &self,
        canvas: &mut RgbaImage,
        request: &GetMapRequest,
        name: &str,
        source: &dyn crate::tiles::Source,
    ) -> TilecastCoreResult<()> {
        let config = source.get_config();
        let zoom = zoom_for(
            request.width,
            request.bbox[2] - request.bbox[0],
            config.min_zoom(),
            config.max_zoom(),
        );
        let range = bbox_to_tile_range(request.bbox, zoom);
        if range.count() > MAX_GETMAP_TILES {
            return Err(RenderError::TooManyTiles(range.count(), name.to_string()).into());
        }
        debug!(
            "GetMap layer {name:?}: zoom {zoom}, {} tiles for bbox {:?}",
            range.count(),
            request.bbox
        );

        let grid = i64::from(tile_count(zoom));
        let span = EARTH_CIRCUMFERENCE / f64::from(tile_count(zoom));
        let half = EARTH_CIRCUMFERENCE / 2.0;
        let scale_x = f64::from(request.width) / (request.bbox[2] - request.bbox[0]);
        let scale_y = f64::from(request.height) / (request.bbox[3] - request.bbox[1]);

        for (tx, ty) in range.iter() {
            // Wrap the column for fetching so a bbox crossing the
            // antimeridian produces a continuous image.
            let xyz = TileCoord {
                z: zoom,
                x: (tx.rem_euclid(grid)) as u32,
                y: ty as u32,
            };
            let Some(tile) = source.get_tile(xyz).await? else {
                continue;
            };
            let tile_image = image_ops::decode_raster(&tile.data)
                .map_err(|e| RenderError::TileDecodeError(e, xyz, name.to_string()))?;

            // Position by the unwrapped column so wrapped tiles land east of
            // the dateline.
            let tile_min_x = tx as f64 * span - half;
            let tile_max_y = half - ty as f64 * span;
            let x0 = ((tile_min_x - request.bbox[0]) * scale_x).round() as i64;
            let x1 = ((tile_min_x + span - request.bbox[0]) * scale_x).round() as i64;
            let y0 = ((request.bbox[3] - tile_max_y) * scale_y).round() as i64;
            let y1 = ((request.bbox[3] - tile_max_y + span) * scale_y).round() as i64;
            let width = (x1 - x0).max(1) as u32;
            let height = (y1 - y0).max(1) as u32;

            if tile_image.dimensions() == (width, height) {
                imageops::overlay(canvas, &tile_image, x0, y0);
            } else {
                let scaled = imageops::resize(&tile_image, width, height, FilterType::Triangle);
                imageops::overlay(canvas, &scaled, x0, y0);
            }
        }
        Ok(())
    }
}

fn validate(request: &GetMapRequest) -> Result<(), RenderError> {
    if request.layers.is_empty() {
        return Err(RenderError::EmptyLayers);
    }
    if request.width == 0
        || request.height == 0
        || request.width > MAX_IMAGE_SIZE
        || request.height > MAX_IMAGE_SIZE
    {
        return Err(RenderError::InvalidSize(request.width, request.height));
    }
    let bbox = request.bbox;
    if !bbox.iter().all(|v| v.is_finite()) || bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
        return Err(RenderError::InvalidBbox(bbox));
    }
    Ok(())
}

/// Zoom level at which one source tile maps to roughly one output pixel
/// along the horizontal axis, clamped to the source's zoom range.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn zoom_for(width: u32, bbox_width: f64, min_zoom: u8, max_zoom: u8) -> u8 {
    let ideal = (f64::from(width) * EARTH_CIRCUMFERENCE
        / (bbox_width * f64::from(TILE_SIZE)))
    .log2();
    let zoom = ideal.round().clamp(0.0, f64::from(MAX_ZOOM)) as u8;
    zoom.clamp(min_zoom, max_zoom)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tilecast_tile_utils::MAX_ZOOM;

    use super::*;
    use crate::tiles::catalog::tests::StaticSource;
    use crate::tiles::TilecastCoreError;

    const WORLD: [f64; 4] = [
        -EARTH_CIRCUMFERENCE / 2.0,
        -EARTH_CIRCUMFERENCE / 2.0,
        EARTH_CIRCUMFERENCE / 2.0,
        EARTH_CIRCUMFERENCE / 2.0,
    ];

    #[rstest]
    // One world tile fills a 256px output at zoom 0.
    #[case(256, EARTH_CIRCUMFERENCE, 0)]
    // Doubling the output size needs one zoom level more.
    #[case(512, EARTH_CIRCUMFERENCE, 1)]
    // A quarter of the world on 256px needs zoom 2.
    #[case(256, EARTH_CIRCUMFERENCE / 4.0, 2)]
    fn zoom_follows_the_log2_rule(#[case] width: u32, #[case] bbox_width: f64, #[case] zoom: u8) {
        assert_eq!(zoom_for(width, bbox_width, 0, MAX_ZOOM), zoom);
    }

    #[test]
    fn zoom_is_clamped_to_the_source_range() {
        assert_eq!(zoom_for(256, EARTH_CIRCUMFERENCE, 3, 10), 3);
        assert_eq!(zoom_for(32_768, EARTH_CIRCUMFERENCE / 1024.0, 0, 5), 5);
    }

    fn world_tile(pixel: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(256, 256, Rgba(pixel));
        image_ops::encode_png(&image).unwrap()
    }

    fn request(layers: &[&str]) -> GetMapRequest {
        GetMapRequest {
            width: 256,
            height: 256,
            bbox: WORLD,
            layers: layers.iter().map(ToString::to_string).collect(),
            format: Format::Png,
            transparent: true,
            bgcolor: Rgba([0, 0, 0, 0]),
        }
    }

    fn registry_with(sources: Vec<StaticSource>) -> TileRegistry {
        let mut registry = TileRegistry::new();
        for source in sources {
            registry.insert(Box::new(source)).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn world_request_reproduces_the_world_tile() {
        let tile = world_tile([200, 30, 30, 255]);
        let registry = registry_with(vec![StaticSource {
            data: Some(tile.clone()),
            ..StaticSource::png("world", None)
        }]);
        let renderer = GetMapRenderer::new(&registry, 90, false);

        let out = renderer.render(&request(&["world"])).await.unwrap();
        let rendered = image_ops::decode_raster(&out).unwrap();
        let original = image_ops::decode_raster(&tile).unwrap();
        assert_eq!(rendered, original);
    }

    #[tokio::test]
    async fn identical_requests_are_byte_identical() {
        let registry = registry_with(vec![StaticSource {
            data: Some(world_tile([5, 120, 60, 255])),
            ..StaticSource::png("world", None)
        }]);
        let renderer = GetMapRenderer::new(&registry, 90, false);

        let first = renderer.render(&request(&["world"])).await.unwrap();
        let second = renderer.render(&request(&["world"])).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn transparent_top_layer_leaves_the_bottom_visible() {
        let bottom = world_tile([10, 10, 200, 255]);
        let registry = registry_with(vec![
            StaticSource {
                data: Some(bottom.clone()),
                ..StaticSource::png("base", None)
            },
            StaticSource {
                data: Some(world_tile([0, 0, 0, 0])),
                ..StaticSource::png("overlay", None)
            },
        ]);
        let renderer = GetMapRenderer::new(&registry, 90, false);

        let stacked = renderer.render(&request(&["base", "overlay"])).await.unwrap();
        let alone = renderer.render(&request(&["base"])).await.unwrap();
        assert_eq!(stacked, alone);
    }

    #[tokio::test]
    async fn missing_tiles_leave_the_background() {
        let registry = registry_with(vec![StaticSource::png("empty", None)]);
        let renderer = GetMapRenderer::new(&registry, 90, false);
        let mut req = request(&["empty"]);
        req.transparent = false;
        req.bgcolor = Rgba([250, 250, 250, 255]);

        let out = renderer.render(&req).await.unwrap();
        let rendered = image_ops::decode_raster(&out).unwrap();
        assert_eq!(rendered.get_pixel(128, 128).0, [250, 250, 250, 255]);
    }

    #[tokio::test]
    async fn unknown_layers_are_skipped_unless_strict() {
        let registry = registry_with(vec![StaticSource {
            data: Some(world_tile([1, 2, 3, 255])),
            ..StaticSource::png("known", None)
        }]);

        let lenient = GetMapRenderer::new(&registry, 90, false);
        lenient
            .render(&request(&["known", "missing"]))
            .await
            .unwrap();

        let strict = GetMapRenderer::new(&registry, 90, true);
        let err = strict
            .render(&request(&["known", "missing"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TilecastCoreError::RenderError(RenderError::UnknownLayer(name)) if name == "missing"
        ));
    }

    #[rstest]
    #[case(&[], 256, 256, WORLD)]
    #[case(&["world"], 0, 256, WORLD)]
    #[case(&["world"], 256, 40_000, WORLD)]
    #[case(&["world"], 256, 256, [0.0, 0.0, -1.0, 1.0])]
    #[case(&["world"], 256, 256, [0.0, f64::NAN, 1.0, 1.0])]
    fn invalid_requests_are_rejected(
        #[case] layers: &[&str],
        #[case] width: u32,
        #[case] height: u32,
        #[case] bbox: [f64; 4],
    ) {
        let req = GetMapRequest {
            width,
            height,
            bbox,
            ..request(layers)
        };
        assert!(validate(&req).is_err());
    }
}
