use std::fs::File;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use crate::tiles::geotiff::{GeoTiffError, RasterProperties};

/// Reads the part of the raster covered by `bbox` (EPSG:3857) and scales it
/// into an `out_width`x`out_height` RGBA image with bilinear filtering.
///
/// Returns `None` when the bbox misses the raster entirely. Areas of the
/// output not covered by the raster stay fully transparent.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn extract_region(
    decoder: &mut Decoder<File>,
    props: &RasterProperties,
    bbox: [f64; 4],
    out_width: u32,
    out_height: u32,
    path: &Path,
) -> Result<Option<RgbaImage>, GeoTiffError> {
    if !props.intersects(bbox) {
        return Ok(None);
    }
    let pb = props.projected_bounds;
    let window = [
        bbox[0].max(pb[0]),
        bbox[1].max(pb[1]),
        bbox[2].min(pb[2]),
        bbox[3].min(pb[3]),
    ];

    // Window corners in source pixel space; row 0 is the raster's north edge.
    let left = ((window[0] - pb[0]) / props.pixel_width).floor().max(0.0) as u32;
    let top = ((pb[3] - window[3]) / props.pixel_height).floor().max(0.0) as u32;
    let right = (((window[2] - pb[0]) / props.pixel_width).ceil() as u32)
        .clamp(left + 1, props.image_width);
    let bottom = (((pb[3] - window[1]) / props.pixel_height).ceil() as u32)
        .clamp(top + 1, props.image_height);
    let left = left.min(right - 1);
    let top = top.min(bottom - 1);

    // Source tiles covering the pixel window, composited north-up onto a
    // scratch canvas aligned to the tile grid.
    let (tile_w, tile_h) = (props.tile_width, props.tile_height);
    let first_col = left / tile_w;
    let last_col = (right - 1) / tile_w;
    let first_row = top / tile_h;
    let last_row = (bottom - 1) / tile_h;
    let mut scratch = RgbaImage::new(
        (last_col - first_col + 1) * tile_w,
        (last_row - first_row + 1) * tile_h,
    );

    let color_type = decoder
        .colortype()
        .map_err(|e| GeoTiffError::InvalidTiffFile(e, path.to_path_buf()))?;
    let components = match color_type {
        ColorType::RGB(8) => 3,
        ColorType::RGBA(8) => 4,
        other => return Err(GeoTiffError::UnsupportedColorType(other, path.to_path_buf())),
    };

    for row in first_row..=last_row {
        for col in first_col..=last_col {
            let chunk_index = row * props.tiles_across() + col;
            let (data_w, data_h) = decoder.chunk_data_dimensions(chunk_index);
            let chunk = decoder
                .read_chunk(chunk_index)
                .map_err(|e| GeoTiffError::ReadChunkFailed(e, chunk_index, path.to_path_buf()))?;
            let DecodingResult::U8(data) = chunk else {
                return Err(GeoTiffError::UnsupportedColorType(
                    color_type,
                    path.to_path_buf(),
                ));
            };
            draw_chunk(
                &data,
                components,
                (data_w, data_h),
                &mut scratch,
                ((col - first_col) * tile_w, (row - first_row) * tile_h),
            );
        }
    }

    // Cut the pixel window out of the scratch canvas.
    let cropped = imageops::crop_imm(
        &scratch,
        left - first_col * tile_w,
        top - first_row * tile_h,
        right - left,
        bottom - top,
    )
    .to_image();

    // Place the window into output pixel space; when the bbox extends past
    // the raster this covers only part of the output.
    let span_x = bbox[2] - bbox[0];
    let span_y = bbox[3] - bbox[1];
    let dest_x0 = ((window[0] - bbox[0]) / span_x * f64::from(out_width)).round() as i64;
    let dest_x1 = ((window[2] - bbox[0]) / span_x * f64::from(out_width)).round() as i64;
    let dest_y0 = ((bbox[3] - window[3]) / span_y * f64::from(out_height)).round() as i64;
    let dest_y1 = ((bbox[3] - window[1]) / span_y * f64::from(out_height)).round() as i64;
    let dest_w = (dest_x1 - dest_x0).max(1) as u32;
    let dest_h = (dest_y1 - dest_y0).max(1) as u32;

    let resized = imageops::resize(&cropped, dest_w, dest_h, FilterType::Triangle);
    let mut output = RgbaImage::new(out_width, out_height);
    imageops::overlay(&mut output, &resized, dest_x0, dest_y0);
    Ok(Some(output))
}

/// Copies one decoded chunk onto the scratch canvas, expanding RGB to RGBA
/// with an opaque alpha. Edge chunks come cropped from the decoder, so the
/// chunk's own data dimensions bound the copy.
fn draw_chunk(
    data: &[u8],
    components: usize,
    (data_w, data_h): (u32, u32),
    target: &mut RgbaImage,
    (offset_x, offset_y): (u32, u32),
) {
    for row in 0..data_h {
        for col in 0..data_w {
            let idx = (row * data_w + col) as usize * components;
            let pixel = image::Rgba([
                data[idx],
                data[idx + 1],
                data[idx + 2],
                if components == 4 { data[idx + 3] } else { 255 },
            ]);
            target.put_pixel(offset_x + col, offset_y + row, pixel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_chunks_become_opaque_rgba() {
        let data = vec![10u8, 20, 30, 40, 50, 60];
        let mut target = RgbaImage::new(4, 4);
        draw_chunk(&data, 3, (2, 1), &mut target, (1, 2));
        assert_eq!(target.get_pixel(1, 2).0, [10, 20, 30, 255]);
        assert_eq!(target.get_pixel(2, 2).0, [40, 50, 60, 255]);
        assert_eq!(target.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn rgba_chunks_keep_their_alpha() {
        let data = vec![1u8, 2, 3, 128];
        let mut target = RgbaImage::new(1, 1);
        draw_chunk(&data, 4, (1, 1), &mut target, (0, 0));
        assert_eq!(target.get_pixel(0, 0).0, [1, 2, 3, 128]);
    }
}
