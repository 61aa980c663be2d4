//! Shared persistent store port: the atomic primitives the engine relies on.
//!
//! The engine owns no state of its own across restarts; everything that must
//! survive a crash (queues, the requesting map, counters) lives behind this
//! trait. `MemoryStore` backs deterministic tests and ephemeral runs;
//! `SqliteStore` backs production crash-recovery.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Atomic key/value primitives over namespaced keys.
///
/// Each method is atomic on its own; the engine's serialized outcome section
/// relies on that, not on any cross-call transaction. Lists are FIFO
/// (`push_back` + `pop_front`), sets report first insertion, hashes are
/// string field maps, counters are signed integers.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn push_back(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn list_len(&self, key: &str) -> Result<i64, StoreError>;

    /// Add `member` to the set at `key`. Returns true if it was not already
    /// present (first-seen-wins dedup relies on this).
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hash_del(&self, key: &str, field: &str) -> Result<(), StoreError>;
    /// Increment the integer at `key`/`field` by `by`, creating it at `by`
    /// when absent. Returns the new value.
    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError>;
    async fn hash_all(&self, key: &str) -> Result<Vec<(String, String)>, StoreError>;

    async fn counter_get(&self, key: &str) -> Result<Option<i64>, StoreError>;
    async fn counter_set(&self, key: &str, value: i64) -> Result<(), StoreError>;
    /// Atomically increment the counter at `key`, creating it at 1 when
    /// absent. Returns the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;
    /// Atomically decrement the counter at `key`, creating it at -1 when
    /// absent. Returns the new value.
    async fn decr(&self, key: &str) -> Result<i64, StoreError>;

    /// Delete one exact key across all structures.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Delete every key starting with `prefix` across all structures.
    /// Used for the bulk namespace wipe on completion or reset.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError>;
}
