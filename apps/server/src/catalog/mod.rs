//! Surrogate key catalog
//!
//! Maps the open-ended strings referenced by stored resources and search
//! predicates (resource types, search parameter URIs, claim names,
//! compartment types, coding systems, quantity codes) to compact integer ids.
//!
//! The relational tables are the source of truth. After `start()` the four
//! fixed vocabularies are served entirely from immutable in-memory maps; the
//! two unbounded vocabularies are served from a cache that grows on demand
//! through [`VocabularyStore::get_or_create`].

pub mod ids;
pub mod status;
pub mod tables;

pub use ids::{
    ClaimTypeId, CompartmentTypeId, QuantityCodeId, ResourceTypeId, SearchParamId, SystemId,
    UnboundedVocabulary, Vocabulary,
};
pub use status::{StatusSyncOutcome, StatusSyncReport};
pub use tables::{normalize_value, CatalogTables, VocabularySizes};

use crate::config::CatalogConfig;
use crate::db::{SchemaGatekeeper, VocabularyStore};
use crate::metrics;
use crate::vocabulary::{SearchParameterStatusLoader, VocabularySource};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use url::Url;

/// Lifecycle phase of a catalog instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CatalogPhase {
    Uninitialized = 0,
    Bootstrapping = 1,
    Ready = 2,
}

impl CatalogPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Bootstrapping,
            2 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }
}

/// Result of a successful bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapSummary {
    pub schema_version: i64,
    pub sizes: VocabularySizes,
    pub status_sync: StatusSyncOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Ready(BootstrapSummary),
    /// The schema is below the catalog minimum. The catalog stays
    /// uninitialized and `start()` may be called again later.
    SchemaPending { current_version: Option<i64> },
    /// A previous `start()` already completed.
    AlreadyStarted,
}

/// Resets the phase to `Uninitialized` unless the bootstrap completed,
/// covering both errors and a dropped `start()` future.
struct PhaseGuard<'a> {
    phase: &'a AtomicU8,
    completed: bool,
}

impl PhaseGuard<'_> {
    fn complete(mut self) {
        self.phase
            .store(CatalogPhase::Ready as u8, Ordering::Release);
        self.completed = true;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.phase
                .store(CatalogPhase::Uninitialized as u8, Ordering::Release);
        }
    }
}

pub struct SurrogateKeyCatalog {
    store: Arc<dyn VocabularyStore>,
    gatekeeper: Arc<dyn SchemaGatekeeper>,
    source: Arc<dyn VocabularySource>,
    status_loader: Arc<dyn SearchParameterStatusLoader>,
    config: CatalogConfig,
    phase: AtomicU8,
    tables: OnceLock<CatalogTables>,
}

impl SurrogateKeyCatalog {
    pub fn new(
        store: Arc<dyn VocabularyStore>,
        gatekeeper: Arc<dyn SchemaGatekeeper>,
        source: Arc<dyn VocabularySource>,
        status_loader: Arc<dyn SearchParameterStatusLoader>,
        config: CatalogConfig,
    ) -> Self {
        Self {
            store,
            gatekeeper,
            source,
            status_loader,
            config,
            phase: AtomicU8::new(CatalogPhase::Uninitialized as u8),
            tables: OnceLock::new(),
        }
    }

    pub fn phase(&self) -> CatalogPhase {
        CatalogPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.tables.get().is_some()
    }

    /// Bootstrap the catalog.
    ///
    /// Runs the schema gate, reconciles the fixed vocabularies with the
    /// vocabulary source, loads all six tables and, when the schema supports
    /// it, pushes search parameter statuses. The built tables are published
    /// only once everything else is done.
    ///
    /// Calling `start()` while another call on the same instance is still
    /// running fails with [`Error::BootstrapInProgress`]. After a successful
    /// start, further calls return [`StartOutcome::AlreadyStarted`]. A failed
    /// start leaves the catalog uninitialized and may be retried.
    pub async fn start(&self) -> Result<StartOutcome> {
        match self.phase.compare_exchange(
            CatalogPhase::Uninitialized as u8,
            CatalogPhase::Bootstrapping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(current) if current == CatalogPhase::Ready as u8 => {
                return Ok(StartOutcome::AlreadyStarted)
            }
            Err(_) => return Err(Error::BootstrapInProgress),
        }

        let guard = PhaseGuard {
            phase: &self.phase,
            completed: false,
        };

        let outcome = self.bootstrap().await?;
        if matches!(outcome, StartOutcome::Ready(_)) {
            guard.complete();
        }
        Ok(outcome)
    }

    async fn bootstrap(&self) -> Result<StartOutcome> {
        let started = Instant::now();

        self.gatekeeper.ensure_ready().await?;

        let schema_version = match self.gatekeeper.current_version() {
            Some(version) if version >= self.config.min_schema_version => version,
            current => {
                tracing::info!(
                    schema_version = ?current,
                    min_schema_version = self.config.min_schema_version,
                    "Schema below catalog minimum, leaving catalog uninitialized"
                );
                return Ok(StartOutcome::SchemaPending {
                    current_version: current,
                });
            }
        };

        tracing::info!(schema_version, "Initializing surrogate key catalog");

        let desired = self.source.snapshot().await?;
        let stored = self.store.reconcile(&desired).await?;
        let tables = CatalogTables::build(stored)?;

        let status_sync = if self.config.status_sync_enabled
            && schema_version >= self.config.status_sync_min_schema_version
        {
            match self.sync_statuses(&tables).await {
                Ok(report) => {
                    tracing::info!(
                        updated = report.updated,
                        unknown = report.unknown,
                        synced_at = %report.synced_at,
                        "Search parameter statuses synchronized"
                    );
                    StatusSyncOutcome::Synced(report)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Search parameter status sync failed");
                    StatusSyncOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            }
        } else {
            StatusSyncOutcome::Skipped
        };
        metrics::CATALOG_STATUS_SYNC_TOTAL
            .with_label_values(&[status_sync.label()])
            .inc();

        let sizes = tables.sizes();
        self.tables.set(tables).map_err(|_| {
            Error::Internal("Surrogate key catalog tables were already published".to_string())
        })?;

        record_sizes(&sizes);
        metrics::CATALOG_BOOTSTRAP_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        tracing::info!(
            resource_types = sizes.resource_types,
            search_params = sizes.search_params,
            claim_types = sizes.claim_types,
            compartment_types = sizes.compartment_types,
            systems = sizes.systems,
            quantity_codes = sizes.quantity_codes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Surrogate key catalog ready"
        );

        Ok(StartOutcome::Ready(BootstrapSummary {
            schema_version,
            sizes,
            status_sync,
        }))
    }

    async fn sync_statuses(&self, tables: &CatalogTables) -> Result<StatusSyncReport> {
        let statuses = self
            .status_loader
            .statuses()
            .await
            .map_err(into_status_sync_failure)?;

        let (known, unknown): (Vec<_>, Vec<_>) = statuses
            .into_iter()
            .partition(|s| tables.search_params.id(&s.uri).is_some());

        for status in &unknown {
            tracing::debug!(uri = %status.uri, "Ignoring status for unregistered search parameter");
        }

        let update = self
            .store
            .sync_search_parameter_statuses(&known)
            .await
            .map_err(into_status_sync_failure)?;

        Ok(StatusSyncReport {
            updated: update.updated,
            unknown: unknown.len(),
            synced_at: update.synced_at,
        })
    }

    fn tables(&self) -> Result<&CatalogTables> {
        self.tables.get().ok_or_else(|| {
            tracing::error!("The surrogate key catalog has not been initialized");
            Error::NotStarted
        })
    }

    /// Entry counts per vocabulary as currently held in memory.
    pub fn sizes(&self) -> Result<VocabularySizes> {
        Ok(self.tables()?.sizes())
    }

    // ==================== Fixed vocabularies ====================

    pub fn resource_type_id(&self, name: &str) -> Result<ResourceTypeId> {
        self.try_resource_type_id(name)?
            .ok_or_else(|| unknown_key(Vocabulary::ResourceType, name))
    }

    pub fn try_resource_type_id(&self, name: &str) -> Result<Option<ResourceTypeId>> {
        Ok(self.tables()?.resource_types.id(name))
    }

    pub fn resource_type_name(&self, id: ResourceTypeId) -> Result<&str> {
        self.tables()?
            .resource_types
            .key(id)
            .map(String::as_str)
            .ok_or(Error::UnknownId {
                vocabulary: Vocabulary::ResourceType,
                id: id.into(),
            })
    }

    pub fn search_param_id(&self, uri: &Url) -> Result<SearchParamId> {
        self.try_search_param_id(uri)?
            .ok_or_else(|| unknown_key(Vocabulary::SearchParam, uri.as_str()))
    }

    pub fn try_search_param_id(&self, uri: &Url) -> Result<Option<SearchParamId>> {
        Ok(self.tables()?.search_params.id(uri))
    }

    pub fn claim_type_id(&self, name: &str) -> Result<ClaimTypeId> {
        self.try_claim_type_id(name)?
            .ok_or_else(|| unknown_key(Vocabulary::ClaimType, name))
    }

    pub fn try_claim_type_id(&self, name: &str) -> Result<Option<ClaimTypeId>> {
        Ok(self.tables()?.claim_types.id(name))
    }

    pub fn compartment_type_id(&self, name: &str) -> Result<CompartmentTypeId> {
        self.try_compartment_type_id(name)?
            .ok_or_else(|| unknown_key(Vocabulary::CompartmentType, name))
    }

    pub fn try_compartment_type_id(&self, name: &str) -> Result<Option<CompartmentTypeId>> {
        Ok(self.tables()?.compartment_types.id(name))
    }

    // ==================== Unbounded vocabularies ====================

    /// Id of a coding system, registering it on first use.
    pub async fn system_id(&self, system: &str) -> Result<SystemId> {
        self.resolve_unbounded(UnboundedVocabulary::System, system)
            .await
            .map(SystemId)
    }

    /// Cached id of a coding system; never touches the store.
    pub fn try_system_id(&self, system: &str) -> Result<Option<SystemId>> {
        Ok(self.tables()?.systems.get(system).map(SystemId))
    }

    /// Id of a quantity code, registering it on first use.
    pub async fn quantity_code_id(&self, code: &str) -> Result<QuantityCodeId> {
        self.resolve_unbounded(UnboundedVocabulary::QuantityCode, code)
            .await
            .map(QuantityCodeId)
    }

    /// Cached id of a quantity code; never touches the store.
    pub fn try_quantity_code_id(&self, code: &str) -> Result<Option<QuantityCodeId>> {
        Ok(self.tables()?.quantity_codes.get(code).map(QuantityCodeId))
    }

    async fn resolve_unbounded(&self, vocabulary: UnboundedVocabulary, value: &str) -> Result<i32> {
        let cache = self.tables()?.unbounded(vocabulary);
        if let Some(id) = cache.get(value) {
            return Ok(id);
        }

        tracing::info!(table = vocabulary.table_name(), "Cache miss for string id");

        let _timer = metrics::CATALOG_CREATE_DURATION_SECONDS
            .with_label_values(&[vocabulary.vocabulary().as_str()])
            .start_timer();

        let id = self
            .store
            .get_or_create(vocabulary, value)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    table = vocabulary.table_name(),
                    error = %e,
                    "Failed to resolve string id"
                );
            })?;

        cache.insert(value, id);
        Ok(id)
    }
}

fn unknown_key(vocabulary: Vocabulary, key: &str) -> Error {
    Error::UnknownKey {
        vocabulary,
        key: key.to_string(),
    }
}

fn into_status_sync_failure(err: Error) -> Error {
    match err {
        Error::StatusSyncFailed(message) => Error::StatusSyncFailed(message),
        other => Error::StatusSyncFailed(other.to_string()),
    }
}

fn record_sizes(sizes: &VocabularySizes) {
    let gauge = &metrics::CATALOG_VOCABULARY_SIZE;
    for (vocabulary, size) in [
        (Vocabulary::ResourceType, sizes.resource_types),
        (Vocabulary::SearchParam, sizes.search_params),
        (Vocabulary::ClaimType, sizes.claim_types),
        (Vocabulary::CompartmentType, sizes.compartment_types),
        (Vocabulary::System, sizes.systems),
        (Vocabulary::QuantityCode, sizes.quantity_codes),
    ] {
        gauge
            .with_label_values(&[vocabulary.as_str()])
            .set(size as i64);
    }
}
