use deadpool_postgres::tokio_postgres::{Config as PgConfig, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use log::info;

use crate::tiles::postgres::PostgresError;

/// `PostgreSQL` connection pool with `PostGIS` support.
///
/// `ST_TileEnvelope` was added in `PostGIS` 3.0.0, so older installations
/// are rejected at init.
#[derive(Clone, Debug)]
pub struct PostgresPool {
    id: String,
    pool: Pool,
}

impl PostgresPool {
    pub async fn new(
        id: &str,
        connection_string: &str,
        pool_size: usize,
    ) -> Result<Self, PostgresError> {
        let pg_cfg: PgConfig = connection_string
            .parse()
            .map_err(|e| PostgresError::BadConnectionString(id.to_string(), e))?;
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_cfg, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(pool_size)
            .build()
            .map_err(|e| PostgresError::PoolBuildError(e, id.to_string()))?;

        let res = Self {
            id: id.to_string(),
            pool,
        };
        let conn = res.get().await?;
        let postgis_version = get_postgis_version(&conn).await?;
        let major: u32 = postgis_version
            .split('.')
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if major < 3 {
            return Err(PostgresError::PostgisTooOld(
                postgis_version,
                res.id.clone(),
            ));
        }
        info!("Connected to PostGIS {postgis_version} for source {id}");
        Ok(res)
    }

    /// Retrieves a connection or waits for one to become available.
    pub async fn get(&self) -> Result<Object, PostgresError> {
        self.pool
            .get()
            .await
            .map_err(|e| PostgresError::PoolConnError(e, self.id.clone()))
    }
}

/// [PostGIS version](https://postgis.net/docs/PostGIS_Lib_Version.html)
async fn get_postgis_version(conn: &Object) -> Result<String, PostgresError> {
    conn.query_one("SELECT PostGIS_Lib_Version() AS version", &[])
        .await
        .map(|row| row.get("version"))
        .map_err(|e| PostgresError::QueryError(e, "querying postgis version"))
}
