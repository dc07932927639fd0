//! In-memory id tables built at bootstrap

use super::ids::{
    ClaimTypeId, CompartmentTypeId, ResourceTypeId, SearchParamId, UnboundedVocabulary,
    Vocabulary,
};
use crate::db::StoredVocabularies;
use crate::metrics;
use crate::{Error, Result};
use prometheus::IntCounter;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use url::Url;

/// Bidirectional map for a vocabulary that is closed after bootstrap.
///
/// Never mutated once built, so it is shared without synchronization.
#[derive(Debug)]
pub struct FixedTable<K, I> {
    by_key: HashMap<K, I>,
    by_id: HashMap<I, K>,
}

impl<K, I> FixedTable<K, I>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    I: Eq + Hash + Copy + Into<i64>,
{
    pub fn build(vocabulary: Vocabulary, rows: Vec<(I, K)>) -> Result<Self> {
        let mut by_key = HashMap::with_capacity(rows.len());
        let mut by_id = HashMap::with_capacity(rows.len());

        for (id, key) in rows {
            if by_key.insert(key.clone(), id).is_some() {
                return Err(Error::InvalidVocabulary(format!(
                    "{} '{}' is stored more than once",
                    vocabulary, key
                )));
            }
            if by_id.insert(id, key).is_some() {
                return Err(Error::InvalidVocabulary(format!(
                    "{} id {} is assigned more than once",
                    vocabulary,
                    id.into()
                )));
            }
        }

        Ok(Self { by_key, by_id })
    }

    pub fn id<Q>(&self, key: &Q) -> Option<I>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.by_key.get(key).copied()
    }

    pub fn key(&self, id: I) -> Option<&K> {
        self.by_id.get(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }
}

/// Recently seen values of an unbounded vocabulary.
///
/// Values compare case-insensitively. A miss says nothing about the table;
/// the caller must resolve it against the store.
pub struct UnboundedCache {
    entries: RwLock<HashMap<String, i32>>,
    hits: IntCounter,
    misses: IntCounter,
}

impl UnboundedCache {
    pub fn build(vocabulary: UnboundedVocabulary, rows: Vec<(i32, String)>) -> Self {
        let mut entries = HashMap::with_capacity(rows.len());
        for (id, value) in rows {
            // first registration wins when two rows differ only by case
            entries.entry(normalize_value(&value)).or_insert(id);
        }

        let label = vocabulary.vocabulary().as_str();
        Self {
            entries: RwLock::new(entries),
            hits: metrics::CATALOG_LOOKUPS_TOTAL.with_label_values(&[label, "hit"]),
            misses: metrics::CATALOG_LOOKUPS_TOTAL.with_label_values(&[label, "miss"]),
        }
    }

    pub fn get(&self, value: &str) -> Option<i32> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let id = entries.get(&normalize_value(value)).copied();
        drop(entries);

        match id {
            Some(_) => self.hits.inc(),
            None => self.misses.inc(),
        }
        id
    }

    /// Record a resolved value. Ids never change once assigned, so racing
    /// writers always store the same pair.
    pub fn insert(&self, value: &str, id: i32) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(normalize_value(value), id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Case folding for unbounded values. Stores persist this form in
/// `value_normalized` and match on it; the database never folds case itself.
pub fn normalize_value(value: &str) -> String {
    value.to_lowercase()
}

/// Number of entries per vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VocabularySizes {
    pub resource_types: usize,
    pub search_params: usize,
    pub claim_types: usize,
    pub compartment_types: usize,
    pub systems: usize,
    pub quantity_codes: usize,
}

/// Everything the catalog serves after bootstrap.
pub struct CatalogTables {
    pub resource_types: FixedTable<String, ResourceTypeId>,
    pub search_params: FixedTable<Url, SearchParamId>,
    pub claim_types: FixedTable<String, ClaimTypeId>,
    pub compartment_types: FixedTable<String, CompartmentTypeId>,
    pub systems: UnboundedCache,
    pub quantity_codes: UnboundedCache,
}

impl CatalogTables {
    pub fn build(stored: StoredVocabularies) -> Result<Self> {
        let search_param_rows = stored
            .search_params
            .into_iter()
            .map(|(id, uri)| {
                Url::parse(&uri)
                    .map(|url| (SearchParamId(id), url))
                    .map_err(|e| {
                        Error::InvalidVocabulary(format!(
                            "search_param {} holds an invalid URI '{}': {}",
                            id, uri, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            resource_types: FixedTable::build(
                Vocabulary::ResourceType,
                wrap(stored.resource_types, ResourceTypeId),
            )?,
            search_params: FixedTable::build(Vocabulary::SearchParam, search_param_rows)?,
            claim_types: FixedTable::build(
                Vocabulary::ClaimType,
                wrap(stored.claim_types, ClaimTypeId),
            )?,
            compartment_types: FixedTable::build(
                Vocabulary::CompartmentType,
                wrap(stored.compartment_types, CompartmentTypeId),
            )?,
            systems: UnboundedCache::build(UnboundedVocabulary::System, stored.systems),
            quantity_codes: UnboundedCache::build(
                UnboundedVocabulary::QuantityCode,
                stored.quantity_codes,
            ),
        })
    }

    pub fn unbounded(&self, vocabulary: UnboundedVocabulary) -> &UnboundedCache {
        match vocabulary {
            UnboundedVocabulary::System => &self.systems,
            UnboundedVocabulary::QuantityCode => &self.quantity_codes,
        }
    }

    pub fn sizes(&self) -> VocabularySizes {
        VocabularySizes {
            resource_types: self.resource_types.len(),
            search_params: self.search_params.len(),
            claim_types: self.claim_types.len(),
            compartment_types: self.compartment_types.len(),
            systems: self.systems.len(),
            quantity_codes: self.quantity_codes.len(),
        }
    }
}

fn wrap<R, I>(rows: Vec<(R, String)>, id: impl Fn(R) -> I) -> Vec<(I, String)> {
    rows.into_iter().map(|(raw, key)| (id(raw), key)).collect()
}
