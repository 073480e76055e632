use std::time::Duration;

use actix_web::dev::Server;
use actix_web::http::header::CACHE_CONTROL;
use actix_web::middleware::{Logger, NormalizePath, TrailingSlash};
use actix_web::web::Data;
use actix_web::{route, web, App, HttpResponse, HttpServer, Responder};

use tilecast_core::tiles::catalog::TileRegistry;

use crate::config::{AppConfig, ServiceConfig, KEEP_ALIVE_DEFAULT, LISTEN_ADDRESSES_DEFAULT};
use crate::srv::{tms, wms, wmts, xyz};
use crate::{TilecastError, TilecastResult};

/// Return 200 OK if healthy. Used for readiness and liveness probes.
#[route("/health", method = "GET", method = "HEAD")]
#[allow(clippy::unused_async)]
async fn get_health() -> impl Responder {
    HttpResponse::Ok()
        .insert_header((CACHE_CONTROL, "no-cache"))
        .message_body("OK")
}

/// Layer catalog as JSON, mostly for diagnostics.
#[route("/catalog", method = "GET", method = "HEAD")]
#[allow(clippy::unused_async)]
async fn get_catalog(registry: Data<TileRegistry>) -> impl Responder {
    HttpResponse::Ok().json(registry.catalog())
}

pub fn router(cfg: &mut web::ServiceConfig) {
    cfg.service(get_health)
        .service(get_catalog)
        .service(xyz::get_xyz_tile)
        .service(tms::get_tms_service)
        .service(tms::get_tms_layer)
        .service(tms::get_tms_tile)
        .service(wmts::get_wmts_kvp)
        .service(wmts::get_wmts_rest_tile)
        .service(wms::get_wms);
}

/// Builds the HTTP server; the caller drives the returned [`Server`] future.
pub fn new_server(
    config: &AppConfig,
    registry: TileRegistry,
) -> TilecastResult<(Server, String)> {
    let listen_addresses = config
        .server
        .listen_addresses
        .clone()
        .unwrap_or_else(|| LISTEN_ADDRESSES_DEFAULT.to_string());
    let keep_alive = Duration::from_secs(config.server.keep_alive.unwrap_or(KEEP_ALIVE_DEFAULT));
    let worker_processes = config
        .server
        .worker_processes
        .unwrap_or_else(num_workers_default);
    let service: ServiceConfig = config.service.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(registry.clone()))
            .app_data(Data::new(service.clone()))
            .wrap(Logger::default())
            .wrap(NormalizePath::new(TrailingSlash::MergeOnly))
            .configure(router)
    })
    .bind(&listen_addresses)
    .map_err(|e| TilecastError::BindingError(e, listen_addresses.clone()))?
    .keep_alive(keep_alive)
    .workers(worker_processes)
    .shutdown_timeout(1)
    .run();

    Ok((server, listen_addresses))
}

fn num_workers_default() -> usize {
    std::thread::available_parallelism().map_or(4, usize::from)
}
