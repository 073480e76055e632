//! Core tile resolution and rendering pipeline of the tilecast server.
//!
//! The crate is split into:
//! - [`config`] for the typed description of a tile source,
//! - [`tiles`] for the [`Source`](tiles::Source) trait, its backends
//!   (`mbtiles`, `file`, `http`, `wms`, `postgres`, `geotiff`), the
//!   read-through cache, and the registry,
//! - [`render`] for the WMS `GetMap` compositor and image helpers.

pub mod config;
pub mod render;
pub mod tiles;
