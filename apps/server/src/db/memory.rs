//! In-process vocabulary store
//!
//! Holds all six tables behind one async mutex, which plays the part of the
//! database's locking. Used by unit tests and by tools that need a catalog
//! without a database.

use super::traits::{StatusUpdate, StoredVocabularies, VocabularyStore};
use crate::catalog::{normalize_value, UnboundedVocabulary};
use crate::vocabulary::{SearchParameterStatus, SearchParameterStatusKind, VocabularySnapshot};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredStatus {
    pub status: SearchParameterStatusKind,
    pub is_partially_supported: bool,
    pub last_updated: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    rows: StoredVocabularies,
    statuses: HashMap<String, StoredStatus>,
}

#[derive(Default)]
pub struct InMemoryVocabularyStore {
    state: Mutex<State>,
    round_trips: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryVocabularyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from pre-existing table contents.
    pub fn from_rows(rows: StoredVocabularies) -> Self {
        Self {
            state: Mutex::new(State {
                rows,
                statuses: HashMap::new(),
            }),
            ..Self::default()
        }
    }

    /// Insert a row directly, bypassing the catalog. Returns the new id.
    pub async fn insert_row(&self, vocabulary: UnboundedVocabulary, value: &str) -> Result<i32> {
        let mut state = self.state.lock().await;
        insert_value(unbounded_rows(&mut state.rows, vocabulary), value)
    }

    pub async fn row_count(&self, vocabulary: UnboundedVocabulary) -> usize {
        let mut state = self.state.lock().await;
        unbounded_rows(&mut state.rows, vocabulary).len()
    }

    pub async fn rows(&self) -> StoredVocabularies {
        self.state.lock().await.rows.clone()
    }

    pub async fn search_param_status(&self, uri: &str) -> Option<StoredStatus> {
        self.state.lock().await.statuses.get(uri).cloned()
    }

    /// Number of store calls made so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Simulate an outage; every call fails with `StoreUnavailable` while unset.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn begin_call(&self) -> Result<()> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn unbounded_rows(
    rows: &mut StoredVocabularies,
    vocabulary: UnboundedVocabulary,
) -> &mut Vec<(i32, String)> {
    match vocabulary {
        UnboundedVocabulary::System => &mut rows.systems,
        UnboundedVocabulary::QuantityCode => &mut rows.quantity_codes,
    }
}

fn insert_value(rows: &mut Vec<(i32, String)>, value: &str) -> Result<i32> {
    let id = next_id(rows)?;
    rows.push((id, value.to_string()));
    Ok(id)
}

fn next_id<I>(rows: &[(I, String)]) -> Result<I>
where
    I: Copy + Into<i64> + TryFrom<i64>,
{
    let next = rows
        .iter()
        .map(|(id, _)| Into::<i64>::into(*id))
        .max()
        .unwrap_or(0)
        + 1;
    I::try_from(next).map_err(|_| {
        Error::StoreUnavailable(sqlx::Error::Protocol(format!(
            "identity exhausted at {next}"
        )))
    })
}

/// Append the desired members not yet present. Comparison is exact.
fn insert_missing<I>(rows: &mut Vec<(I, String)>, desired: &[String]) -> Result<()>
where
    I: Copy + Into<i64> + TryFrom<i64>,
{
    for name in desired {
        if rows.iter().all(|(_, existing)| existing != name) {
            let id = next_id(rows)?;
            rows.push((id, name.clone()));
        }
    }
    Ok(())
}

#[async_trait]
impl VocabularyStore for InMemoryVocabularyStore {
    async fn reconcile(&self, desired: &VocabularySnapshot) -> Result<StoredVocabularies> {
        self.begin_call()?;
        let mut state = self.state.lock().await;

        // Work on a copy so a failure leaves the tables untouched.
        let mut rows = state.rows.clone();
        insert_missing(&mut rows.resource_types, &desired.resource_types)?;
        insert_missing(&mut rows.search_params, &desired.search_parameter_uris())?;
        insert_missing(&mut rows.claim_types, &desired.claim_types)?;
        insert_missing(&mut rows.compartment_types, &desired.compartment_types)?;

        state.rows = rows.clone();
        Ok(rows)
    }

    async fn get_or_create(&self, vocabulary: UnboundedVocabulary, value: &str) -> Result<i32> {
        self.begin_call()?;
        let mut state = self.state.lock().await;
        let rows = unbounded_rows(&mut state.rows, vocabulary);

        let normalized = normalize_value(value);
        if let Some((id, _)) = rows
            .iter()
            .find(|(_, existing)| normalize_value(existing) == normalized)
        {
            return Ok(*id);
        }
        insert_value(rows, value)
    }

    async fn sync_search_parameter_statuses(
        &self,
        statuses: &[SearchParameterStatus],
    ) -> Result<StatusUpdate> {
        self.begin_call()?;
        let mut state = self.state.lock().await;
        let synced_at = Utc::now();

        let mut updated = 0;
        for status in statuses {
            let uri = status.uri.as_str();
            if state.rows.search_params.iter().any(|(_, existing)| existing == uri) {
                state.statuses.insert(
                    uri.to_string(),
                    StoredStatus {
                        status: status.status,
                        is_partially_supported: status.is_partially_supported,
                        last_updated: synced_at,
                    },
                );
                updated += 1;
            }
        }

        Ok(StatusUpdate { updated, synced_at })
    }
}
