//! In-process vocabulary source built from configuration

use super::{model, SearchParameterDefinition, VocabularySnapshot, VocabularySource};
use crate::config::CatalogConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use url::Url;

/// Vocabulary source holding fixed lists.
///
/// The lists are copied into each snapshot, so later changes to the
/// underlying configuration are only seen by a new bootstrap.
#[derive(Debug, Clone, Default)]
pub struct StaticVocabularySource {
    snapshot: VocabularySnapshot,
}

impl StaticVocabularySource {
    pub fn new(snapshot: VocabularySnapshot) -> Self {
        Self { snapshot }
    }

    /// Build the source from catalog configuration.
    ///
    /// Resource and compartment types default to the R4 model lists. Search
    /// parameters come from `search_parameters_path` when set.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let resource_types = if config.resource_types.is_empty() {
            model::R4_RESOURCE_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            config.resource_types.clone()
        };

        let compartment_types = if config.compartment_types.is_empty() {
            model::COMPARTMENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            config.compartment_types.clone()
        };

        let search_parameters = match &config.search_parameters_path {
            Some(path) => load_search_parameter_bundle(path)?,
            None => Vec::new(),
        };

        Ok(Self::new(VocabularySnapshot {
            resource_types,
            search_parameters,
            claim_types: config.principal_claims.clone(),
            compartment_types,
        }))
    }

    pub fn with_resource_types<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.snapshot.resource_types = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_search_parameters(mut self, params: Vec<SearchParameterDefinition>) -> Self {
        self.snapshot.search_parameters = params;
        self
    }

    pub fn with_claim_types<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.snapshot.claim_types = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_compartment_types<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.snapshot.compartment_types = names.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl VocabularySource for StaticVocabularySource {
    async fn snapshot(&self) -> Result<VocabularySnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// Read SearchParameter definitions from a FHIR Bundle file.
pub fn load_search_parameter_bundle(path: &Path) -> Result<Vec<SearchParameterDefinition>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read search parameter bundle {}: {}",
            path.display(),
            e
        ))
    })?;
    let bundle: Value = serde_json::from_str(&raw).map_err(|e| {
        Error::InvalidVocabulary(format!(
            "Search parameter bundle {} is not valid JSON: {}",
            path.display(),
            e
        ))
    })?;
    parse_search_parameter_bundle(&bundle)
}

pub fn parse_search_parameter_bundle(bundle: &Value) -> Result<Vec<SearchParameterDefinition>> {
    if bundle.get("resourceType").and_then(|v| v.as_str()) != Some("Bundle") {
        return Err(Error::InvalidVocabulary(
            "Search parameter file must contain a Bundle".to_string(),
        ));
    }

    let Some(entries) = bundle.get("entry").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };

    let mut params = Vec::new();
    for resource in entries.iter().filter_map(|e| e.get("resource")) {
        if resource.get("resourceType").and_then(|v| v.as_str()) != Some("SearchParameter") {
            continue;
        }

        let Some(raw_url) = resource.get("url").and_then(|v| v.as_str()) else {
            tracing::warn!("SearchParameter without url, skipping");
            continue;
        };
        let url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = raw_url, error = %e, "SearchParameter url is not a valid URI, skipping");
                continue;
            }
        };

        let name = resource
            .get("name")
            .or_else(|| resource.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        params.push(SearchParameterDefinition::new(name, url));
    }

    Ok(params)
}
