//! Wiring of the catalog and its collaborators from configuration

use crate::catalog::SurrogateKeyCatalog;
use crate::config::Config;
use crate::db::{self, PostgresSchemaGatekeeper, PostgresVocabularyStore};
use crate::vocabulary::{
    DefinitionStatusLoader, FileStatusLoader, SearchParameterStatusLoader, StaticVocabularySource,
    VocabularySource,
};
use crate::Result;
use sqlx::PgPool;
use std::sync::Arc;

/// Connect to the configured database and assemble an unstarted catalog.
pub async fn connect_catalog(config: &Config) -> Result<(PgPool, SurrogateKeyCatalog)> {
    let pool = db::connect(&config.database).await?;
    let catalog = build_catalog(pool.clone(), config)?;
    Ok((pool, catalog))
}

/// Assemble a catalog over an existing pool. Call `start()` before use.
pub fn build_catalog(pool: PgPool, config: &Config) -> Result<SurrogateKeyCatalog> {
    let store = PostgresVocabularyStore::new(pool.clone())
        .with_max_create_retries(config.catalog.max_create_retries);
    let gatekeeper = PostgresSchemaGatekeeper::new(pool, config.database.run_migrations);

    let source: Arc<dyn VocabularySource> =
        Arc::new(StaticVocabularySource::from_config(&config.catalog)?);

    let status_loader: Arc<dyn SearchParameterStatusLoader> =
        match &config.catalog.search_parameter_status_path {
            Some(path) => Arc::new(FileStatusLoader::new(path.clone())),
            None => Arc::new(DefinitionStatusLoader::new(source.clone())),
        };

    Ok(SurrogateKeyCatalog::new(
        Arc::new(store),
        Arc::new(gatekeeper),
        source,
        status_loader,
        config.catalog.clone(),
    ))
}
