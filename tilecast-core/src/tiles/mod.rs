//! Tile sources and their shared contract.
//!
//! Every backend implements [`Source`]; handles are created once per
//! configured source, initialized eagerly at startup, and looked up by id in
//! the immutable [`TileRegistry`](catalog::TileRegistry).

pub mod cache;
pub mod catalog;
pub mod file;
pub mod geotiff;
pub mod http;
pub mod mbtiles;
pub mod postgres;
pub mod wms;

mod error;
mod source;
mod template;
mod tile;

pub use error::{TilecastCoreError, TilecastCoreResult};
pub use source::{BoxedSource, Source};
pub use template::{TileUrlTemplate, TemplateError};
pub use tile::Tile;
