use anyhow::Context as _;
use ferrum_catalog::Config;
use std::sync::Arc;
use tokio::sync::OnceCell;

static SHARED: OnceCell<Arc<SharedTestResources>> = OnceCell::const_new();

pub struct SharedTestResources {
    /// `None` when no test database is configured.
    pub base_config: Option<Config>,
}

pub async fn shared() -> anyhow::Result<Arc<SharedTestResources>> {
    SHARED
        .get_or_try_init(|| async {
            init_tracing();

            let mut config = Config::load().context("load Config for tests")?;
            let Some(url) = config.database.test_database_url.clone() else {
                return Ok(Arc::new(SharedTestResources { base_config: None }));
            };
            config.database.url = url;
            config.database.run_migrations = true;

            // A short list keeps reconcile cheap; each test gets a fresh schema.
            config.catalog.resource_types = ["Patient", "Observation", "Encounter"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            config.catalog.search_parameters_path = None;
            config.catalog.search_parameter_status_path = None;

            Ok(Arc::new(SharedTestResources {
                base_config: Some(config),
            }))
        })
        .await
        .cloned()
}

fn init_tracing() {
    use std::sync::OnceLock;
    use tracing_subscriber::prelude::*;
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "ferrum_catalog=info,sqlx=warn".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
