//! Key-value backend for session records
//!
//! The trait mirrors the Redis hash and set commands the session layout is built
//! on: one hash per record with a native TTL, one set per user indexing record
//! keys, a single-field compare-and-set used to flip the blocked flag, and a
//! guarded write that refuses to replace a record carrying a given field value.
//! On Redis the guarded write is a WATCH/MULTI transaction or a Lua script.

mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryKvStore;

/// Key-value backend errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Wrong value type at key {0}")]
    WrongType(String),
}

/// Outcome of a compare-and-set on a hash field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The field held the expected value and was replaced
    Swapped,
    /// The field held some other value; nothing was written
    Mismatch,
    /// The hash does not exist (never written or expired)
    Missing,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically replace the hash at `key` and set its time-to-live, unless
    /// the live hash already there has `guard_field` equal to `guard_value`.
    ///
    /// Returns `false` when the write was refused.
    async fn hash_set_unless(
        &self,
        key: &str,
        fields: HashMap<String, String>,
        ttl: Duration,
        guard_field: &str,
        guard_value: &str,
    ) -> Result<bool, StoreError>;

    /// Read every field of the hash at `key`, `None` if absent or expired
    async fn hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, String>>, StoreError>;

    /// Atomically set `field` to `new` if it currently equals `expected`
    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: &str,
        new: &str,
    ) -> Result<CasOutcome, StoreError>;

    /// Add `member` to the set at `key`, returning how many were added
    async fn set_add(&self, key: &str, member: &str) -> Result<u64, StoreError>;

    /// Remove `member` from the set at `key`, returning how many were removed
    async fn set_remove(&self, key: &str, member: &str) -> Result<u64, StoreError>;

    /// All members of the set at `key`
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Delete `key`, returning how many keys were removed
    async fn delete(&self, key: &str) -> Result<u64, StoreError>;
}
