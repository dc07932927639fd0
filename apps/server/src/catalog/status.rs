//! Search parameter status synchronization results

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What the status step pushed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSyncReport {
    /// Rows of `search_param` that received a status.
    pub updated: u64,
    /// Records dropped because their URI is not a catalog key.
    pub unknown: usize,
    /// Database timestamp stamped onto every updated row.
    pub synced_at: DateTime<Utc>,
}

/// Outcome of the status step of a bootstrap.
///
/// A failure here never invalidates the id mappings already committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatusSyncOutcome {
    /// Disabled by configuration or below the schema version that carries status columns.
    Skipped,
    Synced(StatusSyncReport),
    Failed { message: String },
}

impl StatusSyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Synced(_) => "synced",
            Self::Failed { .. } => "failed",
        }
    }
}
