//! An in-process storage backend over `dashmap`.
//!
//! Freshness is entirely the engine's concern ([`crate::freshness`]); this
//! backend does no TTL-based self-expiry and no capacity-based eviction.
//! It exists so tests, examples, and single-process deployments have a
//! working [`Storage`] without depending on an external service.

use crate::entry::Entry;
use crate::error::Result;
use crate::storage::{CacheKey, SerializedTag, Storage};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;

/// A verification report captured by [`MemoryStorage`] for inspection in
/// tests and examples; real backends would ship this over `/v1/verify`
/// instead.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub key: String,
    pub is_stale: bool,
    pub cached_hash: String,
    pub fresh_hash: String,
}

/// In-memory reference implementation of [`Storage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<CacheKey, Entry>,
    tag_invalidations: DashMap<SerializedTag, u64>,
    verification_reports: Mutex<Vec<VerificationReport>>,
    metrics: crate::metrics::Metrics,
}

impl MemoryStorage {
    /// Creates a new, empty in-memory storage backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a reference to this backend's metrics instance.
    pub fn metrics(&self) -> &crate::metrics::Metrics {
        &self.metrics
    }

    /// Returns every verification report recorded so far, oldest first.
    pub fn verification_reports(&self) -> Vec<VerificationReport> {
        self.verification_reports.lock().unwrap().clone()
    }

    /// Current number of stored entries, irrespective of freshness.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries are currently stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &CacheKey) -> Result<Option<Entry>> {
        let timing = self.metrics.begin_get_timing();
        let result = self.entries.get(key).map(|e| e.value().clone());
        if result.is_some() {
            self.metrics.record_hit();
        } else {
            self.metrics.record_miss();
        }
        self.metrics.record_get_latency(timing);
        Ok(result)
    }

    async fn set(&self, key: CacheKey, entry: Entry) -> Result<()> {
        let timing = self.metrics.begin_set_timing();
        self.entries.insert(key, entry);
        self.metrics.record_insertion();
        self.metrics.record_set_latency(timing);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn get_tag_invalidation(&self, tag: &SerializedTag) -> Result<Option<u64>> {
        Ok(self.tag_invalidations.get(tag).map(|v| *v))
    }

    async fn set_tag_invalidation(&self, tag: SerializedTag, at_ms: u64) -> Result<()> {
        self.tag_invalidations.insert(tag, at_ms);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        self.tag_invalidations.clear();
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn supports_verification(&self) -> bool {
        true
    }

    async fn report_verification(
        &self,
        key: &CacheKey,
        is_stale: bool,
        cached_hash: &str,
        fresh_hash: &str,
    ) -> Result<()> {
        self.verification_reports
            .lock()
            .unwrap()
            .push(VerificationReport {
                key: key.clone(),
                is_stale,
                cached_hash: cached_hash.to_string(),
                fresh_hash: fresh_hash.to_string(),
            });
        Ok(())
    }
}
