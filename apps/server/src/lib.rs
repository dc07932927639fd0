//! FHIR surrogate key catalog
//!
//! Maps the strings a FHIR store indexes on (resource types, search
//! parameter URIs, security claims, compartment types, coding systems and
//! quantity codes) to compact integer ids backed by PostgreSQL tables.
//! - Fixed vocabularies are reconciled at startup and served from memory
//! - Coding systems and quantity codes grow lazily through a
//!   concurrency-safe get-or-create
//! - Search parameter statuses are pushed to the store during bootstrap

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod startup;
pub mod vocabulary;

pub use catalog::{CatalogPhase, StartOutcome, SurrogateKeyCatalog};
pub use config::Config;
pub use error::{Error, Result};
