//! Search parameter status records and their loaders

use super::VocabularySource;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Lifecycle status of a search parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchParameterStatusKind {
    Disabled,
    Supported,
    Enabled,
    PendingDelete,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSearchParameterStatusError(String);

impl fmt::Display for ParseSearchParameterStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown search parameter status '{}'", self.0)
    }
}

impl std::error::Error for ParseSearchParameterStatusError {}

impl FromStr for SearchParameterStatusKind {
    type Err = ParseSearchParameterStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Disabled" => Ok(Self::Disabled),
            "Supported" => Ok(Self::Supported),
            "Enabled" => Ok(Self::Enabled),
            "PendingDelete" => Ok(Self::PendingDelete),
            "Deleted" => Ok(Self::Deleted),
            other => Err(ParseSearchParameterStatusError(other.to_string())),
        }
    }
}

impl SearchParameterStatusKind {
    /// Value stored in `search_param.status`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::Supported => "Supported",
            Self::Enabled => "Enabled",
            Self::PendingDelete => "PendingDelete",
            Self::Deleted => "Deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParameterStatus {
    pub uri: Url,
    pub status: SearchParameterStatusKind,
    #[serde(default)]
    pub is_partially_supported: bool,
}

/// Supplies the current status of every known search parameter.
#[async_trait]
pub trait SearchParameterStatusLoader: Send + Sync {
    async fn statuses(&self) -> Result<Vec<SearchParameterStatus>>;
}

/// Fixed list of statuses.
#[derive(Debug, Clone, Default)]
pub struct StaticStatusLoader {
    statuses: Vec<SearchParameterStatus>,
}

impl StaticStatusLoader {
    pub fn new(statuses: Vec<SearchParameterStatus>) -> Self {
        Self { statuses }
    }
}

#[async_trait]
impl SearchParameterStatusLoader for StaticStatusLoader {
    async fn statuses(&self) -> Result<Vec<SearchParameterStatus>> {
        Ok(self.statuses.clone())
    }
}

/// Reads status records from a JSON array on disk.
#[derive(Debug, Clone)]
pub struct FileStatusLoader {
    path: PathBuf,
}

impl FileStatusLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SearchParameterStatusLoader for FileStatusLoader {
    async fn statuses(&self) -> Result<Vec<SearchParameterStatus>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::StatusSyncFailed(format!(
                "Failed to read search parameter statuses from {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            Error::StatusSyncFailed(format!(
                "Invalid search parameter status file {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

/// Reports every registered search parameter as enabled.
pub struct DefinitionStatusLoader {
    source: Arc<dyn VocabularySource>,
}

impl DefinitionStatusLoader {
    pub fn new(source: Arc<dyn VocabularySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SearchParameterStatusLoader for DefinitionStatusLoader {
    async fn statuses(&self) -> Result<Vec<SearchParameterStatus>> {
        let snapshot = self.source.snapshot().await?;
        Ok(snapshot
            .search_parameters
            .into_iter()
            .map(|p| SearchParameterStatus {
                uri: p.url,
                status: SearchParameterStatusKind::Enabled,
                is_partially_supported: false,
            })
            .collect())
    }
}
