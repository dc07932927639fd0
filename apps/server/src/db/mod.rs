//! Database layer - vocabulary storage and schema management

pub mod memory;
pub mod pool;
pub mod schema;
pub mod traits;
pub mod vocabulary;

pub use memory::InMemoryVocabularyStore;
pub use pool::connect;
pub use schema::{FixedSchemaGatekeeper, PostgresSchemaGatekeeper, MIGRATOR};
pub use traits::{SchemaGatekeeper, StatusUpdate, StoredVocabularies, VocabularyStore};
pub use vocabulary::PostgresVocabularyStore;
