//! End-to-end tile serving over the XYZ, TMS, and WMTS endpoints.

mod common;

use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{test, App};
use tempfile::TempDir;
use tilecast::config::{MissingTile, ServiceConfig};
use tilecast::srv::router;
use tilecast_tile_utils::TileCoord;

use common::{quadrant_tile, world_registry};

macro_rules! test_app {
    ($registry:expr, $service:expr) => {
        test::init_service(
            App::new()
                .app_data(Data::new($registry))
                .app_data(Data::new($service))
                .configure(router),
        )
        .await
    };
}

fn service() -> ServiceConfig {
    ServiceConfig {
        title: Some("Test service".to_string()),
        ..ServiceConfig::default()
    }
}

#[actix_web::test]
async fn xyz_endpoint_serves_the_exact_stored_bytes() {
    let dir = TempDir::new().unwrap();
    let tile = quadrant_tile();
    let registry = world_registry(
        &dir.path().join("world.mbtiles"),
        0,
        &[(TileCoord { z: 0, x: 0, y: 0 }, tile.clone())],
    )
    .await;
    let app = test_app!(registry, service());

    let request = test::TestRequest::get().uri("/xyz/world/0/0/0.png").to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/png"
    );
    let body = test::read_body(response).await;
    assert_eq!(body.as_ref(), tile.as_slice());
}

#[actix_web::test]
async fn missing_tiles_default_to_no_content() {
    let dir = TempDir::new().unwrap();
    let registry = world_registry(&dir.path().join("world.mbtiles"), 2, &[]).await;
    let app = test_app!(registry, service());

    let request = test::TestRequest::get().uri("/xyz/world/1/0/0.png").to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn missing_tiles_can_be_served_as_blank_png() {
    let dir = TempDir::new().unwrap();
    let registry = world_registry(&dir.path().join("world.mbtiles"), 2, &[]).await;
    let blank_service = ServiceConfig {
        missing_tile: Some(MissingTile::Blank),
        ..service()
    };
    let app = test_app!(registry, blank_service);

    let request = test::TestRequest::get().uri("/xyz/world/1/0/0.png").to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = test::read_body(response).await;
    let image = tilecast_core::render::image_ops::decode_raster(&body).unwrap();
    assert_eq!(image.dimensions(), (1, 1));
    assert_eq!(image.get_pixel(0, 0).0[3], 0);
}

#[actix_web::test]
async fn unknown_layer_is_404_and_bad_coords_are_400() {
    let dir = TempDir::new().unwrap();
    let registry = world_registry(&dir.path().join("world.mbtiles"), 0, &[]).await;
    let app = test_app!(registry, service());

    let request = test::TestRequest::get().uri("/xyz/nope/0/0/0.png").to_request();
    assert_eq!(
        test::call_service(&app, request).await.status(),
        StatusCode::NOT_FOUND
    );
    let request = test::TestRequest::get().uri("/xyz/world/0/0/1.png").to_request();
    assert_eq!(
        test::call_service(&app, request).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[actix_web::test]
async fn tms_rows_are_flipped_against_xyz() {
    let dir = TempDir::new().unwrap();
    let north = quadrant_tile();
    let registry = world_registry(
        &dir.path().join("world.mbtiles"),
        1,
        &[(TileCoord { z: 1, x: 0, y: 0 }, north.clone())],
    )
    .await;
    let app = test_app!(registry, service());

    // The slippy row 0 tile sits at TMS row 1.
    let request = test::TestRequest::get()
        .uri("/tms/1.0.0/world/1/0/1.png")
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(test::read_body(response).await.as_ref(), north.as_slice());

    // The same TMS address as XYZ is empty.
    let request = test::TestRequest::get()
        .uri("/tms/1.0.0/world/1/0/0.png")
        .to_request();
    assert_eq!(
        test::call_service(&app, request).await.status(),
        StatusCode::NO_CONTENT
    );
}

#[actix_web::test]
async fn wmts_kvp_and_rest_serve_the_same_tile() {
    let dir = TempDir::new().unwrap();
    let tile = quadrant_tile();
    let registry = world_registry(
        &dir.path().join("world.mbtiles"),
        0,
        &[(TileCoord { z: 0, x: 0, y: 0 }, tile.clone())],
    )
    .await;
    let app = test_app!(registry, service());

    let request = test::TestRequest::get()
        .uri("/wmts?Request=GetTile&Layer=world&TileMatrix=0&TileRow=0&TileCol=0")
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let kvp_body = test::read_body(response).await;

    let request = test::TestRequest::get()
        .uri("/wmts/tile/1.0.0/world/default/GoogleMapsCompatible/0/0/0.png")
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rest_body = test::read_body(response).await;

    assert_eq!(kvp_body, rest_body);
    assert_eq!(kvp_body.as_ref(), tile.as_slice());
}

#[actix_web::test]
async fn capabilities_documents_list_the_layer() {
    let dir = TempDir::new().unwrap();
    let registry = world_registry(&dir.path().join("world.mbtiles"), 3, &[]).await;
    let app = test_app!(registry, service());

    for uri in [
        "/tms/1.0.0",
        "/tms/1.0.0/world",
        "/wmts?request=GetCapabilities&service=WMTS",
    ] {
        let request = test::TestRequest::get().uri(uri).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK, "for {uri}");
        let body = String::from_utf8(test::read_body(response).await.to_vec()).unwrap();
        assert!(body.contains("world"), "layer missing in {uri}");
    }
}
