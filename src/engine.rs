//! Cache engine: the orchestrator. Implements the named-query
//! façade (`query`) plus `invalidate`/`clear`/`disconnect`, and owns the
//! stampede coalescer and the policy knobs every query reads.

use crate::clock::{Clock, SystemClock};
use crate::coalescer::{Coalescer, Registration};
use crate::duration;
use crate::error::{Error, Result};
use crate::freshness::{self, Freshness};
use crate::metrics::Metrics;
use crate::refresher;
use crate::serialization::{BincodeSerializer, Serializer};
use crate::storage::Storage;
use crate::tag::TagPath;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Policy knobs shared by every query issued against an [`Engine`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Namespace prefix prepended to every cache key.
    pub prefix: String,
    /// Default freshness window, in milliseconds.
    pub default_ttl_ms: u64,
    /// Default grace window beyond the TTL, in milliseconds. `None`
    /// disables grace by default.
    pub default_grace_ms: Option<u64>,
    /// Sampling rate for background verification, in `[0, 1]`.
    pub verify_percent: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "qc".to_string(),
            default_ttl_ms: 30_000,
            default_grace_ms: None,
            verify_percent: 0.1,
        }
    }
}

/// Builds a [`CacheConfig`], validating `verify_percent` at `build()`
/// time: out-of-range values are rejected at construction.
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Sets the default TTL from a duration string (`"30s"`, `"500"`, …).
    pub fn default_ttl(mut self, ttl: &str) -> Result<Self> {
        self.config.default_ttl_ms = duration::parse_ms(ttl)?;
        Ok(self)
    }

    /// Sets the default TTL directly in milliseconds.
    pub fn default_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.config.default_ttl_ms = ttl_ms;
        self
    }

    /// Sets the default grace window from a duration string.
    pub fn default_grace(mut self, grace: &str) -> Result<Self> {
        self.config.default_grace_ms = Some(duration::parse_ms(grace)?);
        Ok(self)
    }

    /// Sets the default grace window directly in milliseconds.
    pub fn default_grace_ms(mut self, grace_ms: u64) -> Self {
        self.config.default_grace_ms = Some(grace_ms);
        self
    }

    pub fn verify_percent(mut self, verify_percent: f64) -> Self {
        self.config.verify_percent = verify_percent;
        self
    }

    /// Validates and finalizes the configuration.
    pub fn build(self) -> Result<CacheConfig> {
        if !(0.0..=1.0).contains(&self.config.verify_percent) {
            return Err(Error::config(format!(
                "verify_percent must be in [0, 1], got {}",
                self.config.verify_percent
            )));
        }
        Ok(self.config)
    }
}

/// The cache engine. Cheap to clone — internally an `Arc` over shared
/// state — so it can be handed to background tasks and held across
/// `await` points freely.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    coalescer: Coalescer,
    metrics: Arc<Metrics>,
    config: CacheConfig,
}

impl Engine {
    /// Builds an engine over `storage` with the system wall clock.
    pub fn new(storage: Arc<dyn Storage>, config: CacheConfig) -> Self {
        Self::with_clock(storage, config, Arc::new(SystemClock))
    }

    /// Builds an engine with an injected clock, for deterministic tests.
    pub fn with_clock(storage: Arc<dyn Storage>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                storage,
                clock,
                coalescer: Coalescer::new(),
                metrics: Arc::new(Metrics::new()),
                config,
            }),
        }
    }

    /// This engine's configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// This engine's metrics.
    pub fn metrics(&self) -> &Metrics {
        self.inner.metrics.as_ref()
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}:{}", self.inner.config.prefix, key)
    }

    async fn lookup_tag(storage: &dyn Storage, serialized_tag: String) -> Result<Option<u64>> {
        storage.get_tag_invalidation(&serialized_tag).await
    }

    /// Named-query façade: returns the cached value if fresh or in-grace,
    /// otherwise synchronously loads, stores, and returns a new value.
    /// Concurrent calls for the same `key` share a single loader
    /// invocation.
    pub async fn query<T, L, Fut>(
        &self,
        key: &str,
        tags: Vec<TagPath>,
        loader: L,
        ttl_ms: Option<u64>,
        grace_ms: Option<Option<u64>>,
    ) -> Result<T>
    where
        L: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let cache_key = self.cache_key(key);
        let tag_set: HashSet<TagPath> = tags.into_iter().collect();
        let ttl_ms = ttl_ms.unwrap_or(self.inner.config.default_ttl_ms);
        let grace_ms = grace_ms.unwrap_or(self.inner.config.default_grace_ms);

        match self.inner.coalescer.register(&cache_key) {
            Registration::Joiner(mut receiver) => {
                self.inner.metrics.record_coalesced_join();
                let shared = receiver
                    .recv()
                    .await
                    .map_err(|_| Error::backend("coalesced load was dropped before completing"))?;
                let bytes = shared?;
                BincodeSerializer::new().deserialize(&bytes)
            }
            Registration::Completer(completer) => {
                let result = self
                    .run_query(&cache_key, tag_set, loader, ttl_ms, grace_ms)
                    .await;
                match &result {
                    Ok(value) => {
                        let bytes = BincodeSerializer::new().serialize(value)?;
                        completer.finish(Ok(Arc::new(bytes)));
                    }
                    Err(err) => completer.finish(Err(err.clone())),
                }
                result
            }
        }
    }

    async fn run_query<T, L, Fut>(
        &self,
        cache_key: &str,
        tags: HashSet<TagPath>,
        loader: L,
        ttl_ms: u64,
        grace_ms: Option<u64>,
    ) -> Result<T>
    where
        L: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let storage = self.inner.storage.clone();
        let now = self.inner.clock.now_ms();
        let cache_key_owned = cache_key.to_string();

        let existing = storage.get(&cache_key_owned).await?;

        let freshness = match &existing {
            Some(entry) => {
                freshness::classify(entry, now, |tag| Self::lookup_tag(storage.as_ref(), tag)).await?
            }
            None => Freshness::Expired,
        };

        match (&existing, freshness) {
            (Some(entry), Freshness::Fresh) => {
                let value: T = BincodeSerializer::new().deserialize(&entry.value)?;
                self.maybe_schedule_verification(&cache_key_owned, &value, loader);
                Ok(value)
            }
            (Some(entry), Freshness::InGrace) => {
                let value: T = BincodeSerializer::new().deserialize(&entry.value)?;
                self.inner.metrics.record_refresh_scheduled();
                let storage = self.inner.storage.clone();
                let metrics_handle = self.metrics_handle();
                let tags_clone = tags.clone();
                let key_clone = cache_key_owned.clone();
                tokio::spawn(async move {
                    refresher::refresh(
                        storage,
                        metrics_handle,
                        key_clone,
                        tags_clone,
                        loader,
                        now,
                        ttl_ms,
                        grace_ms,
                    )
                    .await;
                });
                Ok(value)
            }
            (_, Freshness::Expired) => {
                let load_result = refresher::fetch_and_cache(
                    storage.as_ref(),
                    &cache_key_owned,
                    &tags,
                    &loader,
                    now,
                    ttl_ms,
                    grace_ms,
                )
                .await;

                match load_result {
                    Ok(value) => Ok(value),
                    Err(err) => {
                        // Only a loader failure falls back to a grace-valid
                        // prior entry; a backend write failure after the
                        // loader already succeeded must still propagate.
                        if matches!(err, Error::Loader(_)) {
                            if let Some(entry) = &existing {
                                if let Some(grace_until) = entry.grace_until {
                                    if grace_until > now {
                                        let value: T = BincodeSerializer::new().deserialize(&entry.value)?;
                                        return Ok(value);
                                    }
                                }
                            }
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    fn metrics_handle(&self) -> Arc<Metrics> {
        self.inner.metrics.clone()
    }

    fn maybe_schedule_verification<T, L, Fut>(&self, cache_key: &str, cached_value: &T, loader: L)
    where
        L: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + Sync + Clone + 'static,
    {
        if !self.inner.storage.supports_verification() {
            return;
        }
        if rand::random::<f64>() >= self.inner.config.verify_percent {
            return;
        }
        self.inner.metrics.record_verification_scheduled();
        let storage = self.inner.storage.clone();
        let metrics = self.metrics_handle();
        let cache_key = cache_key.to_string();
        let cached_value = Arc::new(cached_value.clone());
        tokio::spawn(async move {
            refresher::verify(storage, metrics, cache_key, cached_value, loader).await;
        });
    }

    /// Invalidates every given tag. If `exact`, appends the exact
    /// sentinel first so only entries whose tag set contains exactly
    /// this path are affected; otherwise, every entry tagged with an
    /// extension of this path is affected. One storage write per tag; no
    /// enumeration of affected entries.
    pub async fn invalidate(&self, tags: &[TagPath], exact: bool) -> Result<()> {
        let now = self.inner.clock.now_ms();
        for tag in tags {
            let serialized = if exact {
                freshness::exact_key(tag)
            } else {
                freshness::prefix_key(tag)
            };
            self.inner.storage.set_tag_invalidation(serialized, now).await?;
        }
        Ok(())
    }

    /// Removes all entries and all tag timestamps.
    pub async fn clear(&self) -> Result<()> {
        self.inner.storage.clear().await
    }

    /// Releases the storage backend's resources.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.storage.disconnect().await
    }

    /// Primitive `get`: returns the stored value iff it classifies as
    /// `FRESH` or `IN_GRACE` and is not tag-invalidated. Never deletes.
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let cache_key = self.cache_key(key);
        let storage = self.inner.storage.clone();
        let now = self.inner.clock.now_ms();
        let Some(entry) = storage.get(&cache_key).await? else {
            return Ok(None);
        };
        let freshness =
            freshness::classify(&entry, now, |tag| Self::lookup_tag(storage.as_ref(), tag)).await?;
        match freshness {
            Freshness::Fresh | Freshness::InGrace => {
                Ok(Some(BincodeSerializer::new().deserialize(&entry.value)?))
            }
            Freshness::Expired => Ok(None),
        }
    }

    /// Primitive `set`: writes a value directly, bypassing the loader
    /// path and the coalescer.
    pub async fn set<T>(
        &self,
        key: &str,
        value: &T,
        tags: Vec<TagPath>,
        ttl_ms: Option<u64>,
        grace_ms: Option<Option<u64>>,
    ) -> Result<()>
    where
        T: Serialize,
    {
        let cache_key = self.cache_key(key);
        let now = self.inner.clock.now_ms();
        let ttl_ms = ttl_ms.unwrap_or(self.inner.config.default_ttl_ms);
        let grace_ms = grace_ms.unwrap_or(self.inner.config.default_grace_ms);
        let expires_at = now + ttl_ms;
        let grace_until = grace_ms.map(|g| expires_at + g);
        let bytes = BincodeSerializer::new().serialize(value)?;
        let tag_set: HashSet<TagPath> = tags.into_iter().collect();
        let entry = crate::entry::Entry::new(bytes, tag_set, now, expires_at, grace_until)?;
        self.inner.storage.set(cache_key, entry).await
    }

    /// Primitive `del`: deletes the stored entry outright.
    pub async fn del(&self, key: &str) -> Result<()> {
        let cache_key = self.cache_key(key);
        self.inner.storage.delete(&cache_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStorage;
    use crate::clock::TestClock;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct User {
        id: String,
        name: String,
    }

    fn engine_with_clock() -> (Engine, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let config = CacheConfigBuilder::new()
            .default_ttl_ms(60_000)
            .build()
            .unwrap();
        (Engine::with_clock(storage, config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn cache_hit_does_not_reinvoke_loader() {
        let (engine, clock) = engine_with_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let loader = move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(User {
                    id: "1".to_string(),
                    name: "Alice".to_string(),
                })
            }
        };

        let tags = vec![TagPath::new(["user", "1"])];
        let v1: User = engine
            .query("getUser", tags.clone(), loader.clone(), None, None)
            .await
            .unwrap();
        clock.advance(1000);
        let v2: User = engine.query("getUser", tags, loader, None, None).await.unwrap();

        assert_eq!(v1, v2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hierarchical_invalidation_forces_reload() {
        let (engine, clock) = engine_with_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let loader = move || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(User {
                    id: "1".to_string(),
                    name: if n == 0 { "V1".to_string() } else { "V2".to_string() },
                })
            }
        };

        let tags = vec![TagPath::new(["posts", "1", "comments"])];
        let v1: User = engine
            .query("gp", tags.clone(), loader.clone(), None, None)
            .await
            .unwrap();
        assert_eq!(v1.name, "V1");

        clock.advance(100);
        engine
            .invalidate(&[TagPath::new(["posts", "1"])], false)
            .await
            .unwrap();

        clock.advance(100);
        let v2: User = engine.query("gp", tags, loader, None, None).await.unwrap();
        assert_eq!(v2.name, "V2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exact_invalidation_does_not_cascade() {
        let (engine, clock) = engine_with_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let loader = move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(User {
                    id: "1".to_string(),
                    name: "V1".to_string(),
                })
            }
        };

        let tags = vec![TagPath::new(["posts", "1", "comments"])];
        let _: User = engine
            .query("gp", tags.clone(), loader.clone(), None, None)
            .await
            .unwrap();

        clock.advance(100);
        engine
            .invalidate(&[TagPath::new(["posts", "1"])], true)
            .await
            .unwrap();

        clock.advance(100);
        let v2: User = engine.query("gp", tags, loader, None, None).await.unwrap();
        assert_eq!(v2.name, "V1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_queries_for_same_key_share_one_loader_call() {
        let (engine, _clock) = engine_with_clock();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let loader = move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                Ok(User {
                    id: "1".to_string(),
                    name: "Alice".to_string(),
                })
            }
        };

        let tags = vec![TagPath::single("k")];
        let mut joins = Vec::new();
        for _ in 0..3 {
            let engine = engine.clone();
            let tags = tags.clone();
            let loader = loader.clone();
            joins.push(tokio::spawn(async move {
                engine.query::<User, _, _>("k", tags, loader, None, None).await
            }));
        }

        let mut results = Vec::new();
        for join in joins {
            results.push(join.await.unwrap().unwrap());
        }

        assert!(results.iter().all(|r| r.name == "Alice"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_primitive_returns_none_when_expired() {
        let (engine, clock) = engine_with_clock();
        engine
            .set(
                "k",
                &User {
                    id: "1".to_string(),
                    name: "Alice".to_string(),
                },
                vec![TagPath::single("k")],
                Some(1),
                None,
            )
            .await
            .unwrap();

        let hit: Option<User> = engine.get("k").await.unwrap();
        assert!(hit.is_some());

        clock.advance(2);
        let miss: Option<User> = engine.get("k").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn del_primitive_removes_entry() {
        let (engine, _clock) = engine_with_clock();
        engine
            .set(
                "k",
                &User {
                    id: "1".to_string(),
                    name: "Alice".to_string(),
                },
                vec![TagPath::single("k")],
                None,
                None,
            )
            .await
            .unwrap();
        engine.del("k").await.unwrap();
        let hit: Option<User> = engine.get("k").await.unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn config_builder_rejects_out_of_range_verify_percent() {
        let result = CacheConfigBuilder::new().verify_percent(1.5).build();
        assert!(result.is_err());
    }

    #[test]
    fn config_builder_accepts_boundary_verify_percent() {
        assert!(CacheConfigBuilder::new().verify_percent(0.0).build().is_ok());
        assert!(CacheConfigBuilder::new().verify_percent(1.0).build().is_ok());
    }

    /// Delegates everything to an inner [`MemoryStorage`] except `set`,
    /// which always fails — used to prove a backend write failure is
    /// never mistaken for a loader failure.
    #[derive(Debug)]
    struct FailingSetStorage {
        inner: MemoryStorage,
    }

    #[async_trait::async_trait]
    impl Storage for FailingSetStorage {
        async fn get(&self, key: &crate::storage::CacheKey) -> Result<Option<crate::entry::Entry>> {
            self.inner.get(key).await
        }

        async fn set(&self, _key: crate::storage::CacheKey, _entry: crate::entry::Entry) -> Result<()> {
            Err(Error::backend("disk full"))
        }

        async fn delete(&self, key: &crate::storage::CacheKey) -> Result<()> {
            self.inner.delete(key).await
        }

        async fn get_tag_invalidation(&self, tag: &crate::storage::SerializedTag) -> Result<Option<u64>> {
            self.inner.get_tag_invalidation(tag).await
        }

        async fn set_tag_invalidation(&self, tag: crate::storage::SerializedTag, at_ms: u64) -> Result<()> {
            self.inner.set_tag_invalidation(tag, at_ms).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }

        async fn disconnect(&self) -> Result<()> {
            self.inner.disconnect().await
        }
    }

    #[tokio::test]
    async fn expired_branch_propagates_backend_write_failure_even_with_grace() {
        let clock = Arc::new(TestClock::new());

        // Seed an entry directly into the inner storage so there is a
        // grace-valid prior value the buggy fallback would otherwise
        // have served instead of propagating the write failure.
        let tags: HashSet<TagPath> = [TagPath::single("k")].into_iter().collect();
        let entry = crate::entry::Entry::new(vec![1, 2, 3], tags, 0, 5, Some(10_000)).unwrap();
        let memory = MemoryStorage::new();
        memory.set("qc:k".to_string(), entry).await.unwrap();

        let storage: Arc<dyn Storage> = Arc::new(FailingSetStorage { inner: memory });
        let config = CacheConfigBuilder::new()
            .default_ttl_ms(10)
            .default_grace_ms(10_000)
            .build()
            .unwrap();
        let engine = Engine::with_clock(storage, config, clock.clone());

        clock.advance(20); // past expires_at(5), well within grace_until(10_000)

        let loader = || async {
            Ok(User {
                id: "1".to_string(),
                name: "fresh".to_string(),
            })
        };
        let result = engine
            .query::<User, _, _>("k", vec![TagPath::single("k")], loader, None, None)
            .await;

        assert!(matches!(result, Err(Error::Backend(_))));
    }
}
