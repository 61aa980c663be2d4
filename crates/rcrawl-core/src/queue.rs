//! Queue manager: pending/retry queues, requesting map, counters, dedup.
//!
//! Owns the per-job key namespace and every mutation of persisted queue
//! state. Invariant maintained here and in the outcome handlers:
//! `overplus == total - (resolved successes + resolved permanent failures)`
//! between dispatcher ticks.

use std::sync::Arc;

use tracing::info;

use crate::blacklist::Blacklist;
use crate::request::{normalize, RequestRecord, SeedItem};
use crate::store::{StateStore, StoreError};

/// Per-job key namespace. All keys share the `rcrawl:{name}:` prefix so a
/// completed or reset job can be wiped with one prefix delete.
#[derive(Debug, Clone)]
pub struct JobKeys {
    prefix: String,
}

impl JobKeys {
    pub fn new(name: &str) -> Self {
        Self {
            prefix: format!("rcrawl:{name}:"),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Pending FIFO queue of serialized records.
    pub fn pending(&self) -> String {
        format!("{}queue", self.prefix)
    }

    /// Error-retry FIFO queue, drained with priority over pending.
    pub fn retry(&self) -> String {
        format!("{}queue:error", self.prefix)
    }

    /// In-flight map: dispatch slot index -> serialized record.
    pub fn requesting(&self) -> String {
        format!("{}requesting", self.prefix)
    }

    /// Seeding dedup set, cleared once seeding finishes.
    pub fn seen(&self) -> String {
        format!("{}sets", self.prefix)
    }

    /// Retry-count map: serialized record -> attempts that already failed.
    pub fn retry_count(&self) -> String {
        format!("{}retry_count", self.prefix)
    }

    /// All records ever accepted into the run.
    pub fn total(&self) -> String {
        format!("{}total", self.prefix)
    }

    /// Unresolved remaining count.
    pub fn overplus(&self) -> String {
        format!("{}overplus", self.prefix)
    }
}

/// Queue state owner. Cheap to clone (store handle + key prefix); the
/// dispatcher clones it into the slot-filling stream.
#[derive(Clone)]
pub struct QueueManager {
    store: Arc<dyn StateStore>,
    keys: JobKeys,
}

impl QueueManager {
    pub fn new(store: Arc<dyn StateStore>, keys: JobKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &JobKeys {
        &self.keys
    }

    /// Consume the seed producer once: normalize, dedup, enqueue.
    ///
    /// Invalid and blacklisted items are logged and skipped. Duplicates in
    /// the same pass are dropped first-seen-wins via the dedup set. After
    /// the producer is exhausted, `total` and `overplus` are both set to
    /// the pending queue length and the dedup set is deleted.
    pub async fn seed(
        &self,
        seeds: impl Iterator<Item = SeedItem>,
        base_uri: &str,
        blacklist: Option<&dyn Blacklist>,
        queue_len_hint: Option<u64>,
    ) -> Result<(), StoreError> {
        let pending = self.keys.pending();
        let seen = self.keys.seen();
        let mut last_logged_pct = 0u64;

        for (index, item) in seeds.enumerate() {
            if let Some(raw) = self.accept(item, base_uri, blacklist).await? {
                if self.store.set_add(&seen, &raw).await? {
                    self.store.push_back(&pending, &raw).await?;
                }
            }

            if let Some(hint) = queue_len_hint.filter(|h| *h > 0) {
                let pct = ((index as u64 + 1) * 100) / hint;
                if pct >= last_logged_pct + 5 {
                    let len = self.store.list_len(&pending).await?;
                    info!("seeding: {pct}%, queue length {len}");
                    last_logged_pct = pct;
                }
            }
        }

        let len = self.store.list_len(&pending).await?;
        self.store.counter_set(&self.keys.total(), len).await?;
        self.store.counter_set(&self.keys.overplus(), len).await?;
        self.store.delete(&seen).await?;
        Ok(())
    }

    /// Move every record left in the requesting map back onto the pending
    /// queue (order unspecified; recovery favors completeness), clear the
    /// map, and reset `overplus` to the pending queue length. `total` is
    /// preserved from the prior run.
    pub async fn recover_in_flight(&self) -> Result<(), StoreError> {
        let requesting = self.keys.requesting();
        let pending = self.keys.pending();
        let in_flight = self.store.hash_all(&requesting).await?;
        let recovered = in_flight.len();
        for (_slot, raw) in in_flight {
            self.store.push_back(&pending, &raw).await?;
        }
        self.store.delete(&requesting).await?;
        let len = self.store.list_len(&pending).await?;
        self.store.counter_set(&self.keys.overplus(), len).await?;
        info!(recovered, remaining = len, "recovered in-flight requests");
        Ok(())
    }

    /// Inject one request into a (possibly running) crawl. Returns false if
    /// it was rejected by validation or blacklist.
    pub async fn add_request(
        &self,
        item: SeedItem,
        base_uri: &str,
        blacklist: Option<&dyn Blacklist>,
    ) -> Result<bool, StoreError> {
        let Some(raw) = self.accept(item, base_uri, blacklist).await? else {
            return Ok(false);
        };
        self.store.push_back(&self.keys.pending(), &raw).await?;
        self.store.incr(&self.keys.overplus()).await?;
        self.store.incr(&self.keys.total()).await?;
        Ok(true)
    }

    /// Normalize one seed item; returns the canonical serialized record, or
    /// None (logged) when the item is rejected.
    async fn accept(
        &self,
        item: SeedItem,
        base_uri: &str,
        blacklist: Option<&dyn Blacklist>,
    ) -> Result<Option<String>, StoreError> {
        let record = match normalize(item, base_uri) {
            Ok(record) => record,
            Err(err) => {
                info!("skipping seed item: {err}");
                return Ok(None);
            }
        };
        if let Some(blacklist) = blacklist {
            if blacklist.is_blacklisted(&record) {
                info!(uri = %record.uri, "skipping blacklisted uri");
                return Ok(None);
            }
        }
        Ok(Some(record.canonical()))
    }

    /// Delete every key in the job namespace.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.delete_prefix(self.keys.prefix()).await
    }

    /// Pop the next record to dispatch: the error-retry queue is drained
    /// ahead of the pending queue on every slot fill.
    pub async fn pop_next(&self) -> Result<Option<String>, StoreError> {
        if let Some(raw) = self.store.pop_front(&self.keys.retry()).await? {
            return Ok(Some(raw));
        }
        self.store.pop_front(&self.keys.pending()).await
    }

    /// Record a dispatch slot in the requesting map. This write is the
    /// durability point: from here the record survives a crash.
    pub async fn mark_requesting(&self, slot: u64, raw: &str) -> Result<(), StoreError> {
        self.store
            .hash_set(&self.keys.requesting(), &slot.to_string(), raw)
            .await
    }

    /// Look up and remove a slot's record from the requesting map.
    pub async fn take_requesting(&self, slot: u64) -> Result<Option<String>, StoreError> {
        let requesting = self.keys.requesting();
        let field = slot.to_string();
        let raw = self.store.hash_get(&requesting, &field).await?;
        if raw.is_some() {
            self.store.hash_del(&requesting, &field).await?;
        }
        Ok(raw)
    }

    /// Push a failed record onto the error-retry queue.
    pub async fn push_retry(&self, raw: &str) -> Result<(), StoreError> {
        self.store.push_back(&self.keys.retry(), raw).await
    }

    /// How many times this record has already failed.
    pub async fn retry_count(&self, raw: &str) -> Result<i64, StoreError> {
        let count = self.store.hash_get(&self.keys.retry_count(), raw).await?;
        Ok(count.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
    }

    pub async fn bump_retry(&self, raw: &str) -> Result<i64, StoreError> {
        self.store.hash_incr(&self.keys.retry_count(), raw, 1).await
    }

    pub async fn clear_retry(&self, raw: &str) -> Result<(), StoreError> {
        self.store.hash_del(&self.keys.retry_count(), raw).await
    }

    /// Resolve one request (success or permanent failure): decrement
    /// `overplus` and return the new remaining count.
    pub async fn resolve_one(&self) -> Result<i64, StoreError> {
        self.store.decr(&self.keys.overplus()).await
    }

    pub async fn total(&self) -> Result<i64, StoreError> {
        Ok(self.store.counter_get(&self.keys.total()).await?.unwrap_or(0))
    }

    pub async fn remaining(&self) -> Result<i64, StoreError> {
        Ok(self
            .store
            .counter_get(&self.keys.overplus())
            .await?
            .unwrap_or(0))
    }
}
