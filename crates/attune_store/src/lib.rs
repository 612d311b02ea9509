pub mod crypto;
pub mod repository;
pub mod retry;
pub mod sqlite;
pub mod store;

pub use crypto::{CipherEnvelope, KeyVault};
pub use repository::{
    StateCheck, StateCheckDraft, StateCheckRecord, StateCheckRepository, DEFAULT_RECENT_LIMIT,
    SCHEMA_VERSION,
};
pub use retry::with_retry;
pub use sqlite::SqliteStore;
pub use store::{KeyedStore, KeyedStoreError, MemoryStore, StoreCode};
