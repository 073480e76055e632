use std::collections::HashMap;
use std::fmt::Write as _;

use actix_web::web::{Data, Query};
use actix_web::{route, HttpResponse, Result as ActixResult};
use log::error;
use tilecast_core::render::image_ops::parse_background;
use tilecast_core::render::{GetMapRenderer, GetMapRequest, RenderError, MAX_IMAGE_SIZE};
use tilecast_core::tiles::catalog::TileRegistry;
use tilecast_core::tiles::TilecastCoreError;
use tilecast_tile_utils::{wgs84_to_webmercator, Format, MAX_LATITUDE};

use crate::config::ServiceConfig;
use crate::srv::{lowercase_keys, projected_bounds_of, xml_escape};

const SUPPORTED_VERSIONS: [&str; 2] = ["1.1.1", "1.3.0"];

/// WMS KVP endpoint dispatching on `request`. Protocol errors are answered
/// with status 200 and an OGC `ServiceExceptionReport` body, as WMS demands.
#[route("/wms", method = "GET", method = "HEAD")]
pub(crate) async fn get_wms(
    query: Query<HashMap<String, String>>,
    registry: Data<TileRegistry>,
    service: Data<ServiceConfig>,
) -> ActixResult<HttpResponse> {
    let params = lowercase_keys(&query);
    let version = params
        .get("version")
        .cloned()
        .unwrap_or_else(|| "1.3.0".to_string());

    let response = match params.get("request").map(String::as_str) {
        Some(r) if r.eq_ignore_ascii_case("GetCapabilities") => HttpResponse::Ok()
            .content_type(capabilities_content_type(&version))
            .body(capabilities(&version, &registry, &service)),
        Some(r) if r.eq_ignore_ascii_case("GetMap") => {
            match get_map(&params, &version, &registry, &service).await {
                Ok(response) => response,
                Err(fault) => ogc_exception(&version, &fault),
            }
        }
        Some(other) => ogc_exception(
            &version,
            &WmsFault::new(
                "OperationNotSupported",
                format!("Unsupported WMS request {other:?}"),
            ),
        ),
        None => ogc_exception(&version, &WmsFault::new("", "Missing request parameter")),
    };
    Ok(response)
}

/// A protocol-level failure destined for a service exception report.
#[derive(Debug)]
struct WmsFault {
    code: &'static str,
    message: String,
}

impl WmsFault {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

async fn get_map(
    params: &HashMap<String, String>,
    version: &str,
    registry: &TileRegistry,
    service: &ServiceConfig,
) -> Result<HttpResponse, WmsFault> {
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(WmsFault::new(
            "InvalidParameterValue",
            format!("Unsupported WMS version {version:?}"),
        ));
    }
    if let Some(s) = params.get("service") {
        if !s.eq_ignore_ascii_case("WMS") {
            return Err(WmsFault::new(
                "InvalidParameterValue",
                format!("service must be WMS, got {s:?}"),
            ));
        }
    }

    let layers: Vec<String> = params
        .get("layers")
        .map(|v| v.split(',').map(str::trim).map(ToString::to_string).collect())
        .unwrap_or_default();
    if layers.is_empty() {
        return Err(WmsFault::new("LayerNotDefined", "Missing layers parameter"));
    }

    let format = match params.get("format").map(String::as_str) {
        Some("image/png") => Format::Png,
        Some("image/jpeg") => Format::Jpeg,
        Some("image/tiff") => Format::Tiff,
        other => {
            return Err(WmsFault::new(
                "InvalidFormat",
                format!("Unsupported format {other:?}"),
            ));
        }
    };

    let width = parse_size(params, "width")?;
    let height = parse_size(params, "height")?;
    let bbox = resolve_bbox(params, version)?;

    let transparent = params
        .get("transparent")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let bgcolor = parse_background(
        params.get("bgcolor").map_or("0xFFFFFF", String::as_str),
        transparent,
    )
    .map_err(|e| WmsFault::new("InvalidParameterValue", e.to_string()))?;

    let request = GetMapRequest {
        width,
        height,
        bbox,
        layers,
        format,
        transparent,
        bgcolor,
    };
    let renderer = GetMapRenderer::new(registry, service.jpeg_quality(), service.strict_layers());
    let rendered = tokio::time::timeout(service.getmap_timeout(), renderer.render(&request))
        .await
        .map_err(|_| WmsFault::new("", "GetMap timed out"))?;
    match rendered {
        Ok(bytes) => Ok(HttpResponse::Ok()
            .content_type(format.content_type())
            .body(bytes)),
        Err(TilecastCoreError::RenderError(RenderError::UnknownLayer(layer))) => Err(
            WmsFault::new("LayerNotDefined", format!("Layer {layer:?} is not configured")),
        ),
        Err(TilecastCoreError::RenderError(e @ (RenderError::EmptyLayers
        | RenderError::InvalidBbox(_)
        | RenderError::InvalidSize(..)
        | RenderError::TooManyTiles(..)))) => {
            Err(WmsFault::new("InvalidParameterValue", e.to_string()))
        }
        Err(e) => {
            error!("GetMap failed: {e}");
            Err(WmsFault::new("", format!("GetMap failed: {e}")))
        }
    }
}

fn parse_size(params: &HashMap<String, String>, name: &str) -> Result<u32, WmsFault> {
    let value: u32 = params
        .get(name)
        .ok_or_else(|| WmsFault::new("MissingDimensionValue", format!("Missing {name}")))?
        .parse()
        .map_err(|_| WmsFault::new("InvalidDimensionValue", format!("Invalid {name}")))?;
    if value == 0 || value > MAX_IMAGE_SIZE {
        return Err(WmsFault::new(
            "InvalidDimensionValue",
            format!("{name} must be within 1..={MAX_IMAGE_SIZE}"),
        ));
    }
    Ok(value)
}

/// Parses `BBOX` plus the version-specific `SRS`/`CRS` parameter into an
/// EPSG:3857 extent.
///
/// WMS 1.3.0 with the geographic EPSG:4326 CRS orders the bbox as
/// `miny,minx,maxy,maxx`; the axes are swapped here before projecting, so
/// the core only ever sees x/y order.
fn resolve_bbox(params: &HashMap<String, String>, version: &str) -> Result<[f64; 4], WmsFault> {
    let crs_param = if version == "1.3.0" { "crs" } else { "srs" };
    let crs = params
        .get(crs_param)
        .ok_or_else(|| WmsFault::new("InvalidSRS", format!("Missing {crs_param} parameter")))?;

    let raw = params
        .get("bbox")
        .ok_or_else(|| WmsFault::new("", "Missing bbox parameter"))?;
    let values: Vec<f64> = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| WmsFault::new("", format!("Invalid bbox {raw:?}")))?;
    let [a, b, c, d] = values[..] else {
        return Err(WmsFault::new("", format!("bbox needs 4 values, got {raw:?}")));
    };
    if ![a, b, c, d].iter().all(|v| v.is_finite()) {
        return Err(WmsFault::new("", format!("Invalid bbox {raw:?}")));
    }

    let crs = crs.to_ascii_uppercase();
    let bbox = match crs.as_str() {
        "EPSG:3857" | "EPSG:900913" => [a, b, c, d],
        // CRS:84 keeps lon/lat axis order even in 1.3.0.
        "EPSG:4326" | "CRS:84" => {
            let (min_lon, min_lat, max_lon, max_lat) = if version == "1.3.0" && crs != "CRS:84" {
                (b, a, d, c)
            } else {
                (a, b, c, d)
            };
            let (min_x, min_y) =
                wgs84_to_webmercator(min_lon, min_lat.clamp(-MAX_LATITUDE, MAX_LATITUDE));
            let (max_x, max_y) =
                wgs84_to_webmercator(max_lon, max_lat.clamp(-MAX_LATITUDE, MAX_LATITUDE));
            [min_x, min_y, max_x, max_y]
        }
        other => {
            return Err(WmsFault::new(
                "InvalidSRS",
                format!("Unsupported {crs_param} {other:?}"),
            ));
        }
    };
    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
        return Err(WmsFault::new("", format!("Degenerate bbox {raw:?}")));
    }
    Ok(bbox)
}

fn capabilities_content_type(version: &str) -> &'static str {
    if version == "1.1.1" {
        "application/vnd.ogc.wms_xml"
    } else {
        "text/xml"
    }
}

fn ogc_exception(version: &str, fault: &WmsFault) -> HttpResponse {
    let code_attr = if fault.code.is_empty() {
        String::new()
    } else {
        format!(" code=\"{}\"", fault.code)
    };
    let (content_type, body) = if version == "1.1.1" {
        (
            "application/vnd.ogc.se_xml",
            format!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
                 <ServiceExceptionReport version=\"1.1.1\">\n\
                 \x20 <ServiceException{code_attr}>{}</ServiceException>\n\
                 </ServiceExceptionReport>\n",
                xml_escape(&fault.message)
            ),
        )
    } else {
        (
            "text/xml",
            format!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
                 <ServiceExceptionReport version=\"1.3.0\" \
                 xmlns=\"http://www.opengis.net/ogc\">\n\
                 \x20 <ServiceException{code_attr}>{}</ServiceException>\n\
                 </ServiceExceptionReport>\n",
                xml_escape(&fault.message)
            ),
        )
    };
    HttpResponse::Ok().content_type(content_type).body(body)
}

fn capabilities(version: &str, registry: &TileRegistry, service: &ServiceConfig) -> String {
    let legacy = version == "1.1.1";
    let crs_tag = if legacy { "SRS" } else { "CRS" };
    let title = xml_escape(service.title.as_deref().unwrap_or("tilecast"));

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    if legacy {
        xml.push_str("<WMT_MS_Capabilities version=\"1.1.1\">\n");
    } else {
        xml.push_str(
            "<WMS_Capabilities version=\"1.3.0\" xmlns=\"http://www.opengis.net/wms\">\n",
        );
    }
    let _ = writeln!(xml, "  <Service>\n    <Name>WMS</Name>\n    <Title>{title}</Title>");
    if let Some(description) = &service.description {
        let _ = writeln!(xml, "    <Abstract>{}</Abstract>", xml_escape(description));
    }
    if !service.keywords.is_empty() {
        xml.push_str("    <KeywordList>\n");
        for keyword in &service.keywords {
            let _ = writeln!(xml, "      <Keyword>{}</Keyword>", xml_escape(keyword));
        }
        xml.push_str("    </KeywordList>\n");
    }
    xml.push_str("  </Service>\n  <Capability>\n    <Request>\n");
    let _ = writeln!(
        xml,
        "      <GetCapabilities><Format>{}</Format></GetCapabilities>",
        capabilities_content_type(version)
    );
    xml.push_str(
        "      <GetMap>\n        <Format>image/png</Format>\n        \
         <Format>image/jpeg</Format>\n        <Format>image/tiff</Format>\n      </GetMap>\n",
    );
    xml.push_str("    </Request>\n");
    if legacy {
        xml.push_str("    <Exception><Format>application/vnd.ogc.se_xml</Format></Exception>\n");
    } else {
        xml.push_str("    <Exception><Format>XML</Format></Exception>\n");
    }
    let _ = writeln!(
        xml,
        "    <Layer>\n      <Title>{title}</Title>\n      <{crs_tag}>EPSG:3857</{crs_tag}>\n\
         \x20     <{crs_tag}>EPSG:4326</{crs_tag}>"
    );
    // Vector layers cannot be rasterized into a GetMap, so only raster
    // sources are advertised.
    for entry in registry.catalog().into_iter().filter(|e| e.raster) {
        let bounds = entry
            .bounds
            .unwrap_or_else(|| tilejson::Bounds::new(-180.0, -MAX_LATITUDE, 180.0, MAX_LATITUDE));
        let projected = projected_bounds_of(&entry);
        let _ = writeln!(
            xml,
            "      <Layer queryable=\"0\">\n        <Name>{id}</Name>\n\
             \x20       <Title>{layer_title}</Title>",
            id = xml_escape(&entry.id),
            layer_title = xml_escape(&entry.title),
        );
        if let Some(description) = &entry.description {
            let _ = writeln!(xml, "        <Abstract>{}</Abstract>", xml_escape(description));
        }
        let _ = writeln!(xml, "        <{crs_tag}>EPSG:3857</{crs_tag}>");
        if legacy {
            let _ = writeln!(
                xml,
                "        <LatLonBoundingBox minx=\"{}\" miny=\"{}\" maxx=\"{}\" maxy=\"{}\"/>",
                bounds.left, bounds.bottom, bounds.right, bounds.top
            );
            let _ = writeln!(
                xml,
                "        <BoundingBox SRS=\"EPSG:3857\" minx=\"{}\" miny=\"{}\" \
                 maxx=\"{}\" maxy=\"{}\"/>",
                projected[0], projected[1], projected[2], projected[3]
            );
        } else {
            let _ = writeln!(
                xml,
                "        <EX_GeographicBoundingBox>\n          \
                 <westBoundLongitude>{}</westBoundLongitude>\n          \
                 <eastBoundLongitude>{}</eastBoundLongitude>\n          \
                 <southBoundLatitude>{}</southBoundLatitude>\n          \
                 <northBoundLatitude>{}</northBoundLatitude>\n        \
                 </EX_GeographicBoundingBox>",
                bounds.left, bounds.right, bounds.bottom, bounds.top
            );
            let _ = writeln!(
                xml,
                "        <BoundingBox CRS=\"EPSG:3857\" minx=\"{}\" miny=\"{}\" \
                 maxx=\"{}\" maxy=\"{}\"/>",
                projected[0], projected[1], projected[2], projected[3]
            );
        }
        xml.push_str("      </Layer>\n");
    }
    xml.push_str("    </Layer>\n  </Capability>\n");
    if legacy {
        xml.push_str("</WMT_MS_Capabilities>\n");
    } else {
        xml.push_str("</WMS_Capabilities>\n");
    }
    xml
}
