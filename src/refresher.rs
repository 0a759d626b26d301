//! Background refresher: the two fire-and-forget tasks the engine
//! spawns from `query` — stale-while-revalidate refresh and sampled
//! verification. Both are detached from the caller's scope and must not
//! hold the coalescer entry, which the synchronous request already
//! released before spawning either.
//!
//! Built in the same `tokio::spawn`, detach, swallow-and-log-failures
//! style used elsewhere in this crate's background work, adapted to
//! one-shot per-key tasks fired by a stale read rather than run on a
//! fixed interval.

use crate::error::Result;
use crate::metrics::Metrics;
use crate::stable_hash;
use crate::storage::{CacheKey, Storage};
use crate::tag::TagPath;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Re-runs a loader and replaces the stored entry. Used both for SWR
/// refresh and, synchronously, for the initial load on a miss (see
/// [`crate::engine::Engine::query`]).
///
/// On success, writes `{ value, tags, now, now+ttl, now+ttl+grace }`.
/// On failure, the caller decides whether to swallow or propagate;
/// this function simply returns the `Result`.
pub async fn fetch_and_cache<T, L, Fut>(
    storage: &dyn Storage,
    cache_key: &CacheKey,
    tags: &HashSet<TagPath>,
    loader: &L,
    now_ms: u64,
    ttl_ms: u64,
    grace_ms: Option<u64>,
) -> Result<T>
where
    L: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
    T: Serialize + Send + Sync,
{
    let value = loader().await?;
    let bytes = crate::serialization::Serializer::serialize(
        &crate::serialization::BincodeSerializer::new(),
        &value,
    )?;
    let expires_at = now_ms + ttl_ms;
    let grace_until = grace_ms.map(|g| expires_at + g);
    let entry = crate::entry::Entry::new(bytes, tags.clone(), now_ms, expires_at, grace_until)?;
    storage.set(cache_key.clone(), entry).await?;
    Ok(value)
}

/// Stale-while-revalidate refresh, spawned when `query` finds an entry
/// `IN_GRACE`. Failures are logged and swallowed; the stale entry already
/// returned to the caller remains in storage until the next synchronous
/// reader forces a load or an invalidation lands.
pub async fn refresh<T, L, Fut>(
    storage: Arc<dyn Storage>,
    metrics: Arc<Metrics>,
    cache_key: CacheKey,
    tags: HashSet<TagPath>,
    loader: L,
    now_ms: u64,
    ttl_ms: u64,
    grace_ms: Option<u64>,
) where
    L: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
    T: Serialize + Send + Sync,
{
    let result = fetch_and_cache(
        storage.as_ref(),
        &cache_key,
        &tags,
        &loader,
        now_ms,
        ttl_ms,
        grace_ms,
    )
    .await;

    if let Err(err) = result {
        tracing::warn!(key = %cache_key, error = %err, "background refresh failed, keeping stale entry");
    }
    metrics.record_refresh_completed();
}

/// Sampled verification, spawned when `query` finds an entry `FRESH` and
/// the sampling draw succeeds. Runs the loader again, hashes both
/// values, and reports staleness to the backend if it accepts reports.
/// All failures — loader, hashing, or the report call itself — are
/// swallowed.
pub async fn verify<T, L, Fut>(
    storage: Arc<dyn Storage>,
    metrics: Arc<Metrics>,
    cache_key: CacheKey,
    cached_value: Arc<T>,
    loader: L,
) where
    L: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
    T: Serialize + Send + Sync,
{
    if !storage.supports_verification() {
        return;
    }

    let fresh_value = match loader().await {
        Ok(v) => v,
        Err(err) => {
            tracing::debug!(key = %cache_key, error = %err, "verification loader failed, swallowing");
            return;
        }
    };

    let (cached_hash, fresh_hash) =
        match (stable_hash::hash_value(&*cached_value), stable_hash::hash_value(&fresh_value)) {
            (Ok(a), Ok(b)) => (a, b),
            _ => return,
        };

    let is_stale = cached_hash != fresh_hash;
    if is_stale {
        metrics.record_verification_stale();
    }

    if let Err(err) = storage
        .report_verification(&cache_key, is_stale, &cached_hash, &fresh_hash)
        .await
    {
        tracing::debug!(key = %cache_key, error = %err, "verification report failed, swallowing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStorage;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Counter {
        n: u32,
    }

    fn tags() -> HashSet<TagPath> {
        [TagPath::single("k")].into_iter().collect()
    }

    #[tokio::test]
    async fn fetch_and_cache_stores_and_returns_loader_value() {
        let storage = MemoryStorage::new();
        let loader = || async { Ok(Counter { n: 7 }) };
        let value: Counter = fetch_and_cache(
            &storage,
            &"qc:k".to_string(),
            &tags(),
            &loader,
            0,
            1000,
            None,
        )
        .await
        .unwrap();
        assert_eq!(value, Counter { n: 7 });

        let stored = storage.get(&"qc:k".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.expires_at, 1000);
        assert_eq!(stored.grace_until, None);
    }

    #[tokio::test]
    async fn fetch_and_cache_sets_grace_relative_to_expiry() {
        let storage = MemoryStorage::new();
        let loader = || async { Ok(Counter { n: 1 }) };
        let _: Counter = fetch_and_cache(
            &storage,
            &"qc:k".to_string(),
            &tags(),
            &loader,
            100,
            50,
            Some(200),
        )
        .await
        .unwrap();

        let stored = storage.get(&"qc:k".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.expires_at, 150);
        assert_eq!(stored.grace_until, Some(350));
    }

    #[tokio::test]
    async fn refresh_swallows_loader_failure() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let metrics = Arc::new(Metrics::new());
        let loader = || async { Err::<Counter, _>(crate::error::Error::loader("boom")) };

        refresh(
            storage.clone(),
            metrics.clone(),
            "qc:k".to_string(),
            tags(),
            loader,
            0,
            1000,
            None,
        )
        .await;

        assert_eq!(metrics.refreshes_completed(), 1);
        assert!(storage.get(&"qc:k".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verify_reports_agreement_when_values_match() {
        let storage = Arc::new(MemoryStorage::new());
        let metrics = Arc::new(Metrics::new());
        let loader = || async { Ok(Counter { n: 1 }) };

        verify(
            storage.clone() as Arc<dyn Storage>,
            metrics.clone(),
            "qc:k".to_string(),
            Arc::new(Counter { n: 1 }),
            loader,
        )
        .await;

        assert_eq!(metrics.verifications_stale(), 0);
        assert_eq!(storage.verification_reports().len(), 1);
        assert!(!storage.verification_reports()[0].is_stale);
    }

    #[tokio::test]
    async fn verify_reports_staleness_when_values_diverge() {
        let storage = Arc::new(MemoryStorage::new());
        let metrics = Arc::new(Metrics::new());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let loader = move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Counter { n: 2 })
            }
        };

        verify(
            storage.clone() as Arc<dyn Storage>,
            metrics.clone(),
            "qc:k".to_string(),
            Arc::new(Counter { n: 1 }),
            loader,
        )
        .await;

        assert_eq!(metrics.verifications_stale(), 1);
        assert_eq!(storage.verification_reports().len(), 1);
        assert!(storage.verification_reports()[0].is_stale);
    }
}
