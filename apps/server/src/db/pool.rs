//! Connection pool construction

use crate::config::DatabaseConfig;
use crate::{Error, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

/// Build a pool with per-connection statement and lock timeouts applied.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let options = connect_options(config, &config.url)?;

    let pool = PgPoolOptions::new()
        .min_connections(config.pool_min_size)
        .max_connections(config.pool_max_size)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
        .connect_with(options)
        .await
        .map_err(Error::StoreUnavailable)?;

    tracing::info!(
        max_connections = config.pool_max_size,
        "Database pool established"
    );
    Ok(pool)
}

pub fn connect_options(config: &DatabaseConfig, url: &str) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(url)
        .map_err(|e| Error::Config(format!("Invalid database URL: {}", e)))?;

    Ok(options.options([
        (
            "statement_timeout",
            format!("{}s", config.statement_timeout_seconds),
        ),
        ("lock_timeout", format!("{}s", config.lock_timeout_seconds)),
    ]))
}
