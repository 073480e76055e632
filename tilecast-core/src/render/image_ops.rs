//! Raster encode/decode helpers shared by the compositor and the GeoTIFF
//! tile path.

use std::io::{BufWriter, Cursor};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage};

use crate::render::RenderError;

/// Decodes PNG/JPEG/WEBP bytes into straight-alpha RGBA8.
pub fn decode_raster(data: &[u8]) -> Result<RgbaImage, image::ImageError> {
    Ok(image::load_from_memory(data)?.to_rgba8())
}

/// Lossless RGBA PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut buffer = Vec::new();
    {
        let mut encoder = png::Encoder::new(
            BufWriter::new(&mut buffer),
            image.width(),
            image.height(),
        );
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(image.as_raw())?;
    }
    Ok(buffer)
}

/// JPEG with the given quality (1-100). The alpha channel is discarded.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, RenderError> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(RenderError::JpegEncodeError)?;
    Ok(buffer)
}

/// Uncompressed little-endian RGBA TIFF.
pub fn encode_tiff(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = tiff::encoder::TiffEncoder::new(&mut buffer)?;
        encoder.write_image::<tiff::encoder::colortype::RGBA8>(
            image.width(),
            image.height(),
            image.as_raw(),
        )?;
    }
    Ok(buffer.into_inner())
}

/// 1x1 fully transparent PNG served for missing tiles when configured.
pub fn blank_tile() -> Vec<u8> {
    encode_png(&RgbaImage::new(1, 1)).expect("1x1 png encodes")
}

/// Parses a WMS `BGCOLOR` value: `#RRGGBB`, `0xAARRGGBB`, `0xRRGGBB`, or the
/// names `white`/`black`. Without an explicit alpha the background is fully
/// transparent when `transparent` is set, opaque otherwise.
pub fn parse_background(value: &str, transparent: bool) -> Result<Rgba<u8>, RenderError> {
    let default_alpha = if transparent { 0 } else { 255 };
    let rgb_with_alpha = |rgb: u32, alpha: u8| {
        Rgba([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, alpha])
    };
    let bad = || RenderError::InvalidBackgroundColor(value.to_string());

    match value.to_ascii_lowercase().as_str() {
        "white" => return Ok(rgb_with_alpha(0x00FF_FFFF, default_alpha)),
        "black" => return Ok(rgb_with_alpha(0, default_alpha)),
        _ => {}
    }
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() != 6 {
            return Err(bad());
        }
        let rgb = u32::from_str_radix(hex, 16).map_err(|_| bad())?;
        return Ok(rgb_with_alpha(rgb, default_alpha));
    }
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        return match hex.len() {
            6 => {
                let rgb = u32::from_str_radix(hex, 16).map_err(|_| bad())?;
                Ok(rgb_with_alpha(rgb, default_alpha))
            }
            8 => {
                let argb = u32::from_str_radix(hex, 16).map_err(|_| bad())?;
                Ok(rgb_with_alpha(argb & 0x00FF_FFFF, (argb >> 24) as u8))
            }
            _ => Err(bad()),
        };
    }
    Err(bad())
}
