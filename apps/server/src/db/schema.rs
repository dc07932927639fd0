//! Schema versioning and readiness

use super::traits::SchemaGatekeeper;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};

/// Embedded catalog migrations. The highest applied version is the schema version.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Reads the schema version from `_sqlx_migrations`, optionally applying
/// the embedded migrations first.
pub struct PostgresSchemaGatekeeper {
    pool: PgPool,
    run_migrations: bool,
    // 0 encodes "base schema only"; migration versions start at 1.
    version: AtomicI64,
}

impl PostgresSchemaGatekeeper {
    pub fn new(pool: PgPool, run_migrations: bool) -> Self {
        Self {
            pool,
            run_migrations,
            version: AtomicI64::new(0),
        }
    }

    async fn read_version(&self) -> Result<Option<i64>> {
        let table = sqlx::query_scalar::<_, Option<String>>(
            "SELECT to_regclass('_sqlx_migrations')::text",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::StoreUnavailable)?;

        if table.is_none() {
            return Ok(None);
        }

        sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(version) FROM _sqlx_migrations WHERE success",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::StoreUnavailable)
    }
}

#[async_trait]
impl SchemaGatekeeper for PostgresSchemaGatekeeper {
    async fn ensure_ready(&self) -> Result<()> {
        if self.run_migrations {
            tracing::info!("Applying catalog schema migrations");
            MIGRATOR.run(&self.pool).await?;
        }

        let version = self.read_version().await?;
        tracing::info!(schema_version = ?version, "Catalog schema version resolved");
        self.version
            .store(version.unwrap_or_default(), Ordering::Release);
        Ok(())
    }

    fn current_version(&self) -> Option<i64> {
        match self.version.load(Ordering::Acquire) {
            0 => None,
            v => Some(v),
        }
    }
}

/// Gatekeeper reporting a preset version. Used for tests and for
/// deployments whose schema is managed outside this process.
pub struct FixedSchemaGatekeeper {
    version: Option<i64>,
    failure: Option<String>,
}

impl FixedSchemaGatekeeper {
    pub fn new(version: Option<i64>) -> Self {
        Self {
            version,
            failure: None,
        }
    }

    /// A gatekeeper whose `ensure_ready` always fails with a schema error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            version: None,
            failure: Some(message.into()),
        }
    }
}

#[async_trait]
impl SchemaGatekeeper for FixedSchemaGatekeeper {
    async fn ensure_ready(&self) -> Result<()> {
        match &self.failure {
            Some(message) => Err(Error::Schema(message.clone())),
            None => Ok(()),
        }
    }

    fn current_version(&self) -> Option<i64> {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_migrations_are_versioned_from_one() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn fixed_gatekeeper_reports_preset_state() {
        let ready = FixedSchemaGatekeeper::new(Some(2));
        ready.ensure_ready().await.unwrap();
        assert_eq!(ready.current_version(), Some(2));

        let failing = FixedSchemaGatekeeper::failing("upgrade running");
        assert!(matches!(
            failing.ensure_ready().await,
            Err(Error::Schema(_))
        ));
    }
}
