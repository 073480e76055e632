use actix_web::error::ErrorNotFound;
use actix_web::web::{Data, Path};
use actix_web::{route, HttpResponse, Result as ActixResult};
use serde::Deserialize;
use tilecast_core::tiles::catalog::TileRegistry;
use tilecast_tile_utils::TileCoord;

use crate::config::ServiceConfig;
use crate::srv::{check_tile_coord, tile_response};

#[derive(Deserialize, Clone)]
pub(crate) struct TileRequest {
    layer: String,
    z: u8,
    x: u32,
    y: u32,
    #[allow(dead_code)]
    ext: String,
}

/// Single tile with slippy row numbering.
#[route("/xyz/{layer}/{z}/{x}/{y}.{ext}", method = "GET", method = "HEAD")]
pub(crate) async fn get_xyz_tile(
    path: Path<TileRequest>,
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
            y: path.y,
        },
        service.missing_tile(),
    )
    .await
}
