pub mod shared;

use anyhow::Context as _;
use ferrum_catalog::{startup, Config, StartOutcome, SurrogateKeyCatalog};
use futures::FutureExt as _;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection as _, PgPool};
use std::path::PathBuf;
use url::Url;
use uuid::Uuid;

/// A PostgreSQL schema private to one test.
pub struct TestDb {
    pub config: Config,
    pub pool: PgPool,
    schema: String,
    admin_database_url: String,
    scratch_dir: PathBuf,
}

impl TestDb {
    /// Returns `None` when `database.test_database_url` is not configured.
    pub async fn new_with_config(
        configure: impl FnOnce(&mut Config),
    ) -> anyhow::Result<Option<Self>> {
        let shared = shared::shared().await?;
        let Some(base_config) = shared.base_config.clone() else {
            return Ok(None);
        };
        let mut config = base_config;

        let admin_database_url = config.database.url.clone();
        let schema = format!("test_{}", Uuid::new_v4().simple());
        let mut admin_conn = sqlx::PgConnection::connect(&admin_database_url)
            .await
            .context("connect admin db for schema create")?;
        sqlx::query(&format!(r#"CREATE SCHEMA "{}""#, schema))
            .execute(&mut admin_conn)
            .await
            .context("create test schema")?;

        config.database.url = with_search_path(&admin_database_url, &schema)?;
        config.database.pool_min_size = 0;
        // Several pools per test stand in for separate server processes.
        config.database.pool_max_size = 4;
        config.database.lock_timeout_seconds = 5;

        let scratch_dir = std::env::temp_dir().join(&schema);
        std::fs::create_dir_all(&scratch_dir).context("create scratch dir")?;

        configure(&mut config);

        let pool = Self::connect(&config).await?;

        Ok(Some(Self {
            config,
            pool,
            schema,
            admin_database_url,
            scratch_dir,
        }))
    }

    pub async fn new() -> anyhow::Result<Option<Self>> {
        Self::new_with_config(|_| {}).await
    }

    async fn connect(config: &Config) -> anyhow::Result<PgPool> {
        let options =
            ferrum_catalog::db::pool::connect_options(&config.database, &config.database.url)?;
        PgPoolOptions::new()
            .max_connections(config.database.pool_max_size)
            .connect_with(options)
            .await
            .context("connect test pool")
    }

    /// A catalog with its own pool, as a separate server process would have.
    pub async fn catalog(&self) -> anyhow::Result<SurrogateKeyCatalog> {
        let pool = Self::connect(&self.config).await?;
        Ok(startup::build_catalog(pool, &self.config)?)
    }

    pub async fn started_catalog(&self) -> anyhow::Result<SurrogateKeyCatalog> {
        let catalog = self.catalog().await?;
        match catalog.start().await? {
            StartOutcome::Ready(_) => Ok(catalog),
            other => anyhow::bail!("catalog did not start: {:?}", other),
        }
    }

    /// Directory removed together with the schema.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.scratch_dir.join(name)
    }

    pub async fn count(&self, table: &str) -> anyhow::Result<i64> {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("count rows in {table}"))
    }

    pub async fn cleanup(self) -> anyhow::Result<()> {
        self.pool.close().await;
        let _ = std::fs::remove_dir_all(&self.scratch_dir);

        let mut admin_conn = sqlx::PgConnection::connect(&self.admin_database_url)
            .await
            .context("connect admin db for schema drop")?;
        sqlx::query(&format!(r#"DROP SCHEMA "{}" CASCADE"#, self.schema))
            .execute(&mut admin_conn)
            .await
            .context("drop test schema")?;

        Ok(())
    }
}

pub async fn with_test_db<F>(f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(
        &'a TestDb,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'a>,
    >,
{
    with_test_db_with_config(|_| {}, f).await
}

pub async fn with_test_db_with_config<C, F>(configure: C, f: F) -> anyhow::Result<()>
where
    C: FnOnce(&mut Config),
    F: for<'a> FnOnce(
        &'a TestDb,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'a>,
    >,
{
    let Some(db) = TestDb::new_with_config(configure).await? else {
        eprintln!("skipping: database.test_database_url is not configured");
        return Ok(());
    };

    let result = std::panic::AssertUnwindSafe(f(&db)).catch_unwind().await;
    let cleanup_result = db.cleanup().await;

    if let Err(e) = cleanup_result {
        eprintln!("test schema cleanup failed: {e:?}");
    }

    match result {
        Ok(r) => r,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn with_search_path(database_url: &str, schema: &str) -> anyhow::Result<String> {
    let mut url = Url::parse(database_url).context("parse database URL")?;
    url.query_pairs_mut()
        .append_pair("options", &format!("-c search_path={}", schema));
    Ok(url.to_string())
}
