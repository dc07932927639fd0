//! Core traits for vocabulary storage backends

use crate::{
    catalog::UnboundedVocabulary,
    vocabulary::{SearchParameterStatus, VocabularySnapshot},
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Complete id mappings of all six vocabulary tables, read in one transaction.
///
/// Rows are `(id, key)` pairs in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredVocabularies {
    pub resource_types: Vec<(i16, String)>,
    pub search_params: Vec<(i16, String)>,
    pub claim_types: Vec<(u8, String)>,
    pub compartment_types: Vec<(u8, String)>,
    pub systems: Vec<(i32, String)>,
    pub quantity_codes: Vec<(i32, String)>,
}

/// Result of a bulk status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Rows of `search_param` that received a status.
    pub updated: u64,
    /// Timestamp captured once at the database and written to every updated row.
    pub synced_at: DateTime<Utc>,
}

/// Storage operations behind the surrogate key catalog.
///
/// The PostgreSQL implementation is the production backend. Correctness
/// across processes must come from the store itself (locks, isolation and
/// unique constraints), never from state held in the calling process.
#[async_trait]
pub trait VocabularyStore: Send + Sync {
    /// Insert the desired members missing from each fixed table, then read
    /// back the full contents of all six tables.
    ///
    /// Runs as a single transaction. Each fixed table is locked exclusively
    /// before its set-difference insert so that concurrent bootstraps from
    /// other processes cannot register the same name twice. Existing rows are
    /// never removed or renumbered.
    async fn reconcile(&self, desired: &VocabularySnapshot) -> Result<StoredVocabularies>;

    /// Resolve the id of `value`, inserting a row when it does not exist yet.
    ///
    /// Concurrent callers racing on the same new value, in this process or
    /// another, must all observe the same id and leave exactly one row.
    async fn get_or_create(&self, vocabulary: UnboundedVocabulary, value: &str) -> Result<i32>;

    /// Write status columns for the given search parameters, keyed by URI.
    ///
    /// Only existing rows are updated.
    async fn sync_search_parameter_statuses(
        &self,
        statuses: &[SearchParameterStatus],
    ) -> Result<StatusUpdate>;
}

/// Makes sure the schema is usable before the catalog bootstraps.
#[async_trait]
pub trait SchemaGatekeeper: Send + Sync {
    /// Block until the schema is ready, failing when it cannot be made so.
    async fn ensure_ready(&self) -> Result<()>;

    /// Current schema version; `None` while only the base schema exists.
    fn current_version(&self) -> Option<i64>;
}
