//! `PostGIS`-backed vector tile source.

mod pool;
mod source;

pub use pool::PostgresPool;
pub use source::PostgisSource;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum PostgresError {
    #[error("Source {0} has an invalid connection string: {1}")]
    BadConnectionString(String, #[source] deadpool_postgres::tokio_postgres::Error),

    #[error("Cannot build postgres connection pool for {1}: {0}")]
    PoolBuildError(#[source] deadpool_postgres::BuildError, String),

    #[error("Cannot get connection from pool for {1}: {0}")]
    PoolConnError(#[source] deadpool_postgres::PoolError, String),

    #[error("Postgres error while {1}: {0}")]
    QueryError(#[source] deadpool_postgres::tokio_postgres::Error, &'static str),

    #[error("PostGIS version {0} of source {1} is too old, ST_TileEnvelope needs 3.0+")]
    PostgisTooOld(String, String),
}
