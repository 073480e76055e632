use std::fmt::Write as _;

use actix_web::error::ErrorNotFound;
use actix_web::web::{Data, Path};
use actix_web::{route, HttpResponse, Result as ActixResult};
use serde::Deserialize;
use tilecast_core::tiles::catalog::{LayerEntry, TileRegistry};
use tilecast_tile_utils::{flip_y, tile_count, TileCoord, EARTH_CIRCUMFERENCE, TILE_SIZE};

use crate::config::ServiceConfig;
use crate::srv::{check_tile_coord, projected_bounds_of, tile_response, xml_escape};

/// TMS service-level document listing the configured tile maps.
#[route("/tms/1.0.0", method = "GET", method = "HEAD")]
#[allow(clippy::unused_async)]
pub(crate) async fn get_tms_service(
    registry: Data<TileRegistry>,
    service: Data<ServiceConfig>,
) -> HttpResponse {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<TileMapService version=\"1.0.0\">\n");
    let _ = writeln!(
        xml,
        "  <Title>{}</Title>",
        xml_escape(service.title.as_deref().unwrap_or("tilecast"))
    );
    if let Some(description) = &service.description {
        let _ = writeln!(xml, "  <Abstract>{}</Abstract>", xml_escape(description));
    }
    xml.push_str("  <TileMaps>\n");
    for entry in registry.catalog() {
        let _ = writeln!(
            xml,
            "    <TileMap title=\"{}\" srs=\"EPSG:3857\" profile=\"global-mercator\" \
             href=\"/tms/1.0.0/{}\"/>",
            xml_escape(&entry.title),
            xml_escape(&entry.id),
        );
    }
    xml.push_str("  </TileMaps>\n</TileMapService>\n");
    HttpResponse::Ok().content_type("text/xml").body(xml)
}

/// TMS layer document: bounding box, origin, tile format, and tile sets.
#[route("/tms/1.0.0/{layer}", method = "GET", method = "HEAD")]
#[allow(clippy::unused_async)]
pub(crate) async fn get_tms_layer(
    path: Path<String>,
    registry: Data<TileRegistry>,
) -> ActixResult<HttpResponse> {
    let layer = path.into_inner();
    let entry = registry
        .catalog()
        .into_iter()
        .find(|e| e.id == layer)
        .ok_or_else(|| ErrorNotFound(format!("Unknown layer {layer:?}")))?;
    Ok(HttpResponse::Ok()
        .content_type("text/xml")
        .body(layer_document(&entry)))
}

fn layer_document(entry: &LayerEntry) -> String {
    let half = EARTH_CIRCUMFERENCE / 2.0;
    let bbox = projected_bounds_of(entry);
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<TileMap version=\"1.0.0\" tilemapservice=\"/tms/1.0.0\">\n");
    let _ = writeln!(xml, "  <Title>{}</Title>", xml_escape(&entry.title));
    if let Some(description) = &entry.description {
        let _ = writeln!(xml, "  <Abstract>{}</Abstract>", xml_escape(description));
    }
    xml.push_str("  <SRS>EPSG:3857</SRS>\n");
    let _ = writeln!(
        xml,
        "  <BoundingBox minx=\"{}\" miny=\"{}\" maxx=\"{}\" maxy=\"{}\"/>",
        bbox[0], bbox[1], bbox[2], bbox[3]
    );
    let _ = writeln!(xml, "  <Origin x=\"{}\" y=\"{}\"/>", -half, -half);
    let _ = writeln!(
        xml,
        "  <TileFormat width=\"{TILE_SIZE}\" height=\"{TILE_SIZE}\" \
         mime-type=\"{}\" extension=\"{}\"/>",
        entry.content_type, entry.format
    );
    xml.push_str("  <TileSets profile=\"global-mercator\">\n");
    for zoom in entry.min_zoom..=entry.max_zoom {
        let units_per_pixel =
            EARTH_CIRCUMFERENCE / f64::from(TILE_SIZE) / f64::from(tile_count(zoom));
        let _ = writeln!(
            xml,
            "    <TileSet href=\"/tms/1.0.0/{}/{zoom}\" units-per-pixel=\"{units_per_pixel}\" \
             order=\"{zoom}\"/>",
            xml_escape(&entry.id),
        );
    }
    xml.push_str("  </TileSets>\n</TileMap>\n");
    xml
}

#[derive(Deserialize, Clone)]
pub(crate) struct TmsTileRequest {
    layer: String,
    z: u8,
    x: u32,
    y: u32,
    #[allow(dead_code)]
    ext: String,
}

/// Single tile with TMS row numbering (row 0 at the south pole).
#[route("/tms/1.0.0/{layer}/{z}/{x}/{y}.{ext}", method = "GET", method = "HEAD")]
pub(crate) async fn get_tms_tile(
    path: Path<TmsTileRequest>,
    registry: Data<TileRegistry>,
    service: Data<ServiceConfig>,
) -> ActixResult<HttpResponse> {
    let source = registry
        .get(&path.layer)
        .ok_or_else(|| ErrorNotFound(format!("Unknown layer {:?}", path.layer)))?;
    check_tile_coord(path.z, path.x, path.y)?;
    tile_response(
        source,
        TileCoord {
            z: path.z,
            x: path.x,
            y: flip_y(path.y, path.z),
        },
        service.missing_tile(),
    )
    .await
}
