//! Desired vocabulary membership
//!
//! The catalog asks a [`VocabularySource`] once per bootstrap for the names
//! the fixed vocabularies must contain. Reconciliation only ever adds these
//! names to the tables; it never removes rows.

pub mod model;
pub mod source;
pub mod status;

pub use source::StaticVocabularySource;
pub use status::{
    DefinitionStatusLoader, FileStatusLoader, SearchParameterStatus, SearchParameterStatusKind,
    SearchParameterStatusLoader, StaticStatusLoader,
};

use crate::Result;
use async_trait::async_trait;
use url::Url;

/// A registered search parameter, as far as the catalog cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParameterDefinition {
    pub name: String,
    pub url: Url,
}

impl SearchParameterDefinition {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }
}

/// Desired membership of the fixed vocabularies, taken once at boot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabularySnapshot {
    pub resource_types: Vec<String>,
    pub search_parameters: Vec<SearchParameterDefinition>,
    pub claim_types: Vec<String>,
    pub compartment_types: Vec<String>,
}

impl VocabularySnapshot {
    pub fn search_parameter_uris(&self) -> Vec<String> {
        self.search_parameters
            .iter()
            .map(|p| p.url.as_str().to_string())
            .collect()
    }
}

/// Supplies the authoritative desired membership at startup.
#[async_trait]
pub trait VocabularySource: Send + Sync {
    async fn snapshot(&self) -> Result<VocabularySnapshot>;
}
