//! In-process key-value store
//!
//! Honours per-key TTLs passively: an expired entry is treated as absent on the
//! next access and purged then.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CasOutcome, KeyValueStore, StoreError};

/// Ceiling for TTLs too large to represent as an `Instant`
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Memory-backed `KeyValueStore`
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn hash_set_unless(
        &self,
        key: &str,
        fields: HashMap<String, String>,
        ttl: Duration,
        guard_field: &str,
        guard_value: &str,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key) {
            Some(Entry {
                value: Value::Hash(existing),
                ..
            }) if existing.get(guard_field).map(String::as_str) == Some(guard_value) => {
                return Ok(false)
            }
            Some(Entry {
                value: Value::Set(_),
                ..
            }) => return Err(StoreError::WrongType(key.to_string())),
            _ => {}
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Hash(fields),
                expires_at: Some(Instant::now() + ttl.min(MAX_TTL)),
            },
        );
        Ok(true)
    }

    async fn hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, String>>, StoreError> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(Some(fields.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: &str,
        new: &str,
    ) -> Result<CasOutcome, StoreError> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key) {
            None => Ok(CasOutcome::Missing),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => {
                if fields.get(field).map(String::as_str) != Some(expected) {
                    return Ok(CasOutcome::Mismatch);
                }
                fields.insert(field.to_string(), new.to_string());
                Ok(CasOutcome::Swapped)
            }
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        if live_entry(&mut entries, key).is_none() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Set(BTreeSet::new()),
                    expires_at: None,
                },
            );
        }

        match entries.get_mut(key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(u64::from(members.insert(member.to_string()))),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        let removed = match live_entry(&mut entries, key) {
            None => return Ok(0),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => (u64::from(members.remove(member)), members.is_empty()),
            Some(_) => return Err(StoreError::WrongType(key.to_string())),
        };

        // Redis drops a set once its last member is gone
        if removed.1 {
            entries.remove(key);
        }
        Ok(removed.0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        let existed = live_entry(&mut entries, key).is_some();
        entries.remove(key);
        Ok(u64::from(existed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(blocked: &str) -> HashMap<String, String> {
        HashMap::from([("Blocked".to_string(), blocked.to_string())])
    }

    async fn put(store: &MemoryKvStore, key: &str, blocked: &str, ttl: Duration) -> bool {
        store
            .hash_set_unless(key, fields(blocked), ttl, "Blocked", "true")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hash_roundtrip_and_ttl() {
        let store = MemoryKvStore::new();
        assert!(put(&store, "k", "false", Duration::from_millis(30)).await);
        assert!(store.hash_get_all("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.hash_get_all("k").await.unwrap().is_none());
        assert_eq!(store.delete("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = MemoryKvStore::new();
        assert_eq!(
            store
                .hash_compare_and_set("k", "Blocked", "false", "true")
                .await
                .unwrap(),
            CasOutcome::Missing
        );

        put(&store, "k", "false", Duration::from_secs(60)).await;
        assert_eq!(
            store
                .hash_compare_and_set("k", "Blocked", "false", "true")
                .await
                .unwrap(),
            CasOutcome::Swapped
        );
        assert_eq!(
            store
                .hash_compare_and_set("k", "Blocked", "false", "true")
                .await
                .unwrap(),
            CasOutcome::Mismatch
        );
        assert_eq!(store.hash_get_all("k").await.unwrap().unwrap()["Blocked"], "true");
    }

    #[tokio::test]
    async fn test_guarded_write_refuses_blocked_hash() {
        let store = MemoryKvStore::new();
        assert!(put(&store, "k", "false", Duration::from_secs(60)).await);
        assert!(put(&store, "k", "false", Duration::from_secs(60)).await);

        store
            .hash_compare_and_set("k", "Blocked", "false", "true")
            .await
            .unwrap();
        assert!(!put(&store, "k", "false", Duration::from_secs(60)).await);
        assert_eq!(store.hash_get_all("k").await.unwrap().unwrap()["Blocked"], "true");
    }

    #[tokio::test]
    async fn test_huge_ttl_is_capped() {
        let store = MemoryKvStore::new();
        assert!(put(&store, "k", "false", Duration::from_secs(u64::MAX)).await);
        assert!(store.hash_get_all("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_membership() {
        let store = MemoryKvStore::new();
        assert_eq!(store.set_add("s", "a").await.unwrap(), 1);
        assert_eq!(store.set_add("s", "a").await.unwrap(), 0);
        assert_eq!(store.set_add("s", "b").await.unwrap(), 1);
        assert_eq!(store.set_members("s").await.unwrap(), vec!["a", "b"]);

        assert_eq!(store.set_remove("s", "a").await.unwrap(), 1);
        assert_eq!(store.set_remove("s", "a").await.unwrap(), 0);
        assert_eq!(store.set_remove("s", "b").await.unwrap(), 1);
        assert!(store.set_members("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryKvStore::new();
        store.set_add("s", "a").await.unwrap();
        assert!(matches!(
            store.hash_get_all("s").await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryKvStore::new();
        put(&store, "short", "false", Duration::from_millis(10)).await;
        put(&store, "long", "false", Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired().await, 1);
        assert!(store.hash_get_all("long").await.unwrap().is_some());
    }
}
