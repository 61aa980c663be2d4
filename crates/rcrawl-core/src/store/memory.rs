//! In-memory store implementation (tests and ephemeral runs).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{StateStore, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    // BTreeMap keeps hash_all output deterministic.
    hashes: HashMap<String, BTreeMap<String, String>>,
    counters: HashMap<String, i64>,
}

/// `StateStore` over plain collections behind one async mutex.
///
/// Does not survive the process; a crawl backed by this store cannot be
/// resumed after a crash. Every primitive is trivially atomic because the
/// whole state sits behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn push_back(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.lists.get_mut(key).and_then(VecDeque::pop_front))
    }

    async fn list_len(&self, key: &str) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.lists.get(key).map_or(0, |l| l.len() as i64))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(hash) = state.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError> {
        let mut state = self.state.lock().await;
        let hash = state.hashes.entry(key.to_string()).or_default();
        let current = hash
            .get(field)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + by;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hash_all(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn counter_get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.counters.get(key).copied())
    }

    async fn counter_set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.counters.insert(key.to_string(), value);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut state = self.state.lock().await;
        let value = state.counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        let mut state = self.state.lock().await;
        let value = state.counters.entry(key.to_string()).or_insert(0);
        *value -= 1;
        Ok(*value)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.lists.remove(key);
        state.sets.remove(key);
        state.hashes.remove(key);
        state.counters.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.lists.retain(|k, _| !k.starts_with(prefix));
        state.sets.retain(|k, _| !k.starts_with(prefix));
        state.hashes.retain(|k, _| !k.starts_with(prefix));
        state.counters.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_are_fifo() {
        let store = MemoryStore::new();
        store.push_back("q", "a").await.unwrap();
        store.push_back("q", "b").await.unwrap();
        assert_eq!(store.list_len("q").await.unwrap(), 2);
        assert_eq!(store.pop_front("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.pop_front("q").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.pop_front("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_add_reports_first_insertion() {
        let store = MemoryStore::new();
        assert!(store.set_add("s", "x").await.unwrap());
        assert!(!store.set_add("s", "x").await.unwrap());
        assert!(store.set_add("s", "y").await.unwrap());
    }

    #[tokio::test]
    async fn hash_incr_creates_and_increments() {
        let store = MemoryStore::new();
        assert_eq!(store.hash_incr("h", "f", 1).await.unwrap(), 1);
        assert_eq!(store.hash_incr("h", "f", 1).await.unwrap(), 2);
        assert_eq!(store.hash_get("h", "f").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn counters_incr_decr() {
        let store = MemoryStore::new();
        assert_eq!(store.counter_get("c").await.unwrap(), None);
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.decr("c").await.unwrap(), 1);
        store.counter_set("c", 10).await.unwrap();
        assert_eq!(store.counter_get("c").await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn delete_is_exact_and_prefix_is_bulk() {
        let store = MemoryStore::new();
        store.push_back("job:queue", "a").await.unwrap();
        store.push_back("job:queue:error", "b").await.unwrap();
        store.counter_set("job:total", 1).await.unwrap();

        // Exact delete must not touch the sibling retry queue.
        store.delete("job:queue").await.unwrap();
        assert_eq!(store.list_len("job:queue").await.unwrap(), 0);
        assert_eq!(store.list_len("job:queue:error").await.unwrap(), 1);

        store.delete_prefix("job:").await.unwrap();
        assert_eq!(store.list_len("job:queue:error").await.unwrap(), 0);
        assert_eq!(store.counter_get("job:total").await.unwrap(), None);
    }
}
