use std::collections::HashMap;
use std::fmt::Write as _;

use actix_web::error::{ErrorBadRequest, ErrorNotFound};
use actix_web::web::{Data, Path, Query};
use actix_web::{route, HttpResponse, Result as ActixResult};
use serde::Deserialize;
use tilecast_core::tiles::catalog::TileRegistry;
use tilecast_tile_utils::{tile_count, TileCoord, EARTH_CIRCUMFERENCE, MAX_ZOOM, TILE_SIZE};

use crate::config::ServiceConfig;
use crate::srv::{check_tile_coord, lowercase_keys, tile_response, xml_escape};

/// Meters per pixel assumed by the OGC scale denominator definition.
const OGC_PIXEL_SIZE: f64 = 0.000_28;
const TILE_MATRIX_SET: &str = "GoogleMapsCompatible";

/// WMTS KVP endpoint dispatching on `request`.
#[route("/wmts", method = "GET", method = "HEAD")]
pub(crate) async fn get_wmts_kvp(
    query: Query<HashMap<String, String>>,
    registry: Data<TileRegistry>,
    service: Data<ServiceConfig>,
) -> ActixResult<HttpResponse> {
    let params = lowercase_keys(&query);
    match params.get("request").map(String::as_str) {
        Some(r) if r.eq_ignore_ascii_case("GetCapabilities") => Ok(HttpResponse::Ok()
            .content_type("text/xml")
            .body(capabilities(&registry, &service))),
        Some(r) if r.eq_ignore_ascii_case("GetTile") => {
            let layer = required(&params, "layer")?;
            let z: u8 = required(&params, "tilematrix")?
                .parse()
                .map_err(|_| ErrorBadRequest("Invalid tilematrix parameter"))?;
            let y = parse_coord(&params, "tilerow")?;
            let x = parse_coord(&params, "tilecol")?;
            serve_tile(&registry, &service, layer, z, x, y).await
        }
        Some(other) => Err(ErrorBadRequest(format!(
            "Unsupported WMTS request {other:?}"
        ))),
        None => Err(ErrorBadRequest("Missing request parameter")),
    }
}

#[derive(Deserialize, Clone)]
pub(crate) struct RestTileRequest {
    layer: String,
    #[allow(dead_code)]
    style: String,
    #[allow(dead_code)]
    tilematrixset: String,
    z: u8,
    y: u32,
    x: u32,
    #[allow(dead_code)]
    ext: String,
}

/// WMTS REST tile endpoint. Note the row-before-column order of the path.
#[route(
    "/wmts/tile/1.0.0/{layer}/{style}/{tilematrixset}/{z}/{y}/{x}.{ext}",
    method = "GET",
    method = "HEAD"
)]
pub(crate) async fn get_wmts_rest_tile(
    path: Path<RestTileRequest>,
    registry: Data<TileRegistry>,
    service: Data<ServiceConfig>,
) -> ActixResult<HttpResponse> {
    serve_tile(&registry, &service, &path.layer, path.z, path.x, path.y).await
}

async fn serve_tile(
    registry: &TileRegistry,
    service: &ServiceConfig,
    layer: &str,
    z: u8,
    x: u32,
    y: u32,
) -> ActixResult<HttpResponse> {
    let source = registry
        .get(layer)
        .ok_or_else(|| ErrorNotFound(format!("Unknown layer {layer:?}")))?;
    check_tile_coord(z, x, y)?;
    tile_response(source, TileCoord { z, x, y }, service.missing_tile()).await
}

fn required<'a>(
    params: &'a HashMap<String, String>,
    name: &str,
) -> ActixResult<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ErrorBadRequest(format!("Missing {name} parameter")))
}

fn parse_coord(params: &HashMap<String, String>, name: &str) -> ActixResult<u32> {
    required(params, name)?
        .parse()
        .map_err(|_| ErrorBadRequest(format!("Invalid {name} parameter")))
}

fn capabilities(registry: &TileRegistry, service: &ServiceConfig) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <Capabilities xmlns=\"http://www.opengis.net/wmts/1.0\"\n\
         \x20             xmlns:ows=\"http://www.opengis.net/ows/1.1\"\n\
         \x20             xmlns:xlink=\"http://www.w3.org/1999/xlink\" version=\"1.0.0\">\n",
    );
    let _ = writeln!(
        xml,
        "  <ows:ServiceIdentification>\n    <ows:Title>{}</ows:Title>\n\
         \x20   <ows:ServiceType>OGC WMTS</ows:ServiceType>\n\
         \x20   <ows:ServiceTypeVersion>1.0.0</ows:ServiceTypeVersion>\n\
         \x20 </ows:ServiceIdentification>",
        xml_escape(service.title.as_deref().unwrap_or("tilecast"))
    );
    xml.push_str("  <Contents>\n");
    for entry in registry.catalog() {
        let bounds = entry.bounds.unwrap_or(tilejson_world());
        let _ = writeln!(
            xml,
            "    <Layer>\n      <ows:Identifier>{id}</ows:Identifier>\n\
             \x20     <ows:Title>{title}</ows:Title>\n\
             \x20     <ows:WGS84BoundingBox>\n\
             \x20       <ows:LowerCorner>{west} {south}</ows:LowerCorner>\n\
             \x20       <ows:UpperCorner>{east} {north}</ows:UpperCorner>\n\
             \x20     </ows:WGS84BoundingBox>\n\
             \x20     <Style isDefault=\"true\"><ows:Identifier>default</ows:Identifier></Style>\n\
             \x20     <Format>{format}</Format>\n\
             \x20     <TileMatrixSetLink><TileMatrixSet>{TILE_MATRIX_SET}</TileMatrixSet></TileMatrixSetLink>\n\
             \x20     <ResourceURL format=\"{format}\" resourceType=\"tile\" \
             template=\"/wmts/tile/1.0.0/{id}/default/{TILE_MATRIX_SET}/{{TileMatrix}}/{{TileRow}}/{{TileCol}}.{ext}\"/>\n\
             \x20   </Layer>",
            id = xml_escape(&entry.id),
            title = xml_escape(&entry.title),
            west = bounds.left,
            south = bounds.bottom,
            east = bounds.right,
            north = bounds.top,
            format = entry.content_type,
            ext = entry.format,
        );
    }
    xml.push_str(&tile_matrix_set());
    xml.push_str("  </Contents>\n</Capabilities>\n");
    xml
}

fn tilejson_world() -> tilejson::Bounds {
    tilejson::Bounds::new(-180.0, -85.051_128_78, 180.0, 85.051_128_78)
}

/// The `GoogleMapsCompatible` well-known tile matrix set, zoom 0 to 24.
fn tile_matrix_set() -> String {
    let half = EARTH_CIRCUMFERENCE / 2.0;
    let mut xml = String::new();
    let _ = writeln!(
        xml,
        "    <TileMatrixSet>\n      <ows:Identifier>{TILE_MATRIX_SET}</ows:Identifier>\n\
         \x20     <ows:SupportedCRS>urn:ogc:def:crs:EPSG::3857</ows:SupportedCRS>"
    );
    for zoom in 0..=MAX_ZOOM {
        let matrix_size = tile_count(zoom);
        let resolution = EARTH_CIRCUMFERENCE / f64::from(TILE_SIZE) / f64::from(matrix_size);
        let scale_denominator = resolution / OGC_PIXEL_SIZE;
        let _ = writeln!(
            xml,
            "      <TileMatrix>\n        <ows:Identifier>{zoom}</ows:Identifier>\n\
             \x20       <ScaleDenominator>{scale_denominator}</ScaleDenominator>\n\
             \x20       <TopLeftCorner>{top_left_x} {top_left_y}</TopLeftCorner>\n\
             \x20       <TileWidth>{TILE_SIZE}</TileWidth>\n\
             \x20       <TileHeight>{TILE_SIZE}</TileHeight>\n\
             \x20       <MatrixWidth>{matrix_size}</MatrixWidth>\n\
             \x20       <MatrixHeight>{matrix_size}</MatrixHeight>\n\
             \x20     </TileMatrix>",
            top_left_x = -half,
            top_left_y = half,
        );
    }
    xml.push_str("    </TileMatrixSet>\n");
    xml
}
