pub mod db_pool;
pub mod executor;
pub mod schema;
pub mod seed;

use crate::config::DatabaseConfig;
use db_pool::DuckDBConnectionManager;
use r2d2::Pool;
use thiserror::Error;
use tracing::info;

pub type DbPool = Pool<DuckDBConnectionManager>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0}")]
    Engine(#[from] duckdb::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("result conversion error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("result conversion error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Opens the pool and, when configured, loads the sample dataset.
pub fn open_pool(config: &DatabaseConfig) -> Result<DbPool, DbError> {
    info!("Opening DuckDB database: {}", config.connection_string);
    let manager = DuckDBConnectionManager::new(config.connection_string.clone())?;
    let pool = Pool::builder()
        .max_size(config.pool_size.max(1) as u32)
        .build(manager)?;

    if config.seed_sample_data {
        let conn = pool.get()?;
        seed::seed_sample_data(&conn)?;
    }

    Ok(pool)
}

#[cfg(test)]
pub(crate) fn test_pool() -> DbPool {
    open_pool(&DatabaseConfig {
        connection_string: ":memory:".to_string(),
        pool_size: 2,
        seed_sample_data: true,
    })
    .expect("in-memory pool")
}
