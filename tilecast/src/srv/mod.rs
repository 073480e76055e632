//! Protocol endpoints mapping TMS/WMTS/WMS URLs onto the core pipeline.

pub mod server;

mod tms;
mod wms;
mod wmts;
mod xyz;

use actix_web::error::ErrorBadRequest;
use actix_web::{HttpResponse, Result as ActixResult};
use log::error;
use tilecast_core::render::image_ops;
use tilecast_core::tiles::Source;
use tilecast_tile_utils::{tile_count, TileCoord, MAX_ZOOM};

pub use server::{new_server, router};

use crate::config::MissingTile;

pub(crate) fn map_internal_error<T: std::fmt::Display>(e: T) -> actix_web::Error {
    error!("{e}");
    actix_web::error::ErrorInternalServerError(e.to_string())
}

/// Rejects out-of-grid tile addresses before they reach a backend.
pub(crate) fn check_tile_coord(z: u8, x: u32, y: u32) -> ActixResult<()> {
    if z > MAX_ZOOM || x >= tile_count(z) || y >= tile_count(z) {
        return Err(ErrorBadRequest(format!(
            "Tile coordinate {z}/{x}/{y} is outside the tile grid"
        )));
    }
    Ok(())
}

/// Shared single-tile response path for the XYZ, TMS, and WMTS endpoints.
/// The headers follow the tile's own info, which HTTP-backed sources derive
/// from the upstream response.
pub(crate) async fn tile_response(
    source: &dyn Source,
    xyz: TileCoord,
    missing: MissingTile,
) -> ActixResult<HttpResponse> {
    let tile = source.get_tile(xyz).await.map_err(map_internal_error)?;
    Ok(match tile {
        Some(tile) => {
            let mut response = HttpResponse::Ok();
            response.content_type(tile.info.content_type());
            if let Some(encoding) = tile.info.content_encoding() {
                response.insert_header((actix_web::http::header::CONTENT_ENCODING, encoding));
            }
            response.body(tile.data)
        }
        None => match missing {
            MissingTile::NoContent => HttpResponse::NoContent().finish(),
            MissingTile::Blank => HttpResponse::Ok()
                .content_type("image/png")
                .body(image_ops::blank_tile()),
        },
    })
}

/// KVP protocol parameters are case-insensitive in their keys.
pub(crate) fn lowercase_keys(
    query: &std::collections::HashMap<String, String>,
) -> std::collections::HashMap<String, String> {
    query
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect()
}

/// Projected EPSG:3857 bounds of a layer, falling back to the world extent
/// when no geographical bounds are known.
pub(crate) fn projected_bounds_of(entry: &tilecast_core::tiles::catalog::LayerEntry) -> [f64; 4] {
    use tilecast_tile_utils::{wgs84_to_webmercator, EARTH_CIRCUMFERENCE, MAX_LATITUDE};

    let half = EARTH_CIRCUMFERENCE / 2.0;
    let Some(bounds) = entry.bounds else {
        return [-half, -half, half, half];
    };
    let (min_x, min_y) =
        wgs84_to_webmercator(bounds.left, bounds.bottom.clamp(-MAX_LATITUDE, MAX_LATITUDE));
    let (max_x, max_y) =
        wgs84_to_webmercator(bounds.right, bounds.top.clamp(-MAX_LATITUDE, MAX_LATITUDE));
    [min_x, min_y, max_x, max_y]
}

/// Escapes the five XML special characters for capabilities documents.
pub(crate) fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_coords_are_checked_against_the_grid() {
        check_tile_coord(0, 0, 0).unwrap();
        check_tile_coord(3, 7, 7).unwrap();
        assert!(check_tile_coord(3, 8, 0).is_err());
        assert!(check_tile_coord(0, 0, 1).is_err());
        assert!(check_tile_coord(25, 0, 0).is_err());
    }

    #[test]
    fn xml_special_characters_are_escaped() {
        assert_eq!(
            xml_escape(r#"Tom & Jerry's <"map">"#),
            "Tom &amp; Jerry&apos;s &lt;&quot;map&quot;&gt;"
        );
    }
}
