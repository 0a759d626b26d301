//! The storage contract: the engine's sole external collaborator.
//!
//! A [`Storage`] implementation owns entries and tag-invalidation
//! timestamps; it is assumed thread-safe, and the engine never locks
//! around it. All calls are fallible. Which failures the engine propagates
//! versus swallows is specified per call site in the engine itself, not
//! here — the contract just reports success or [`Error::Backend`].

use crate::entry::Entry;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// A fully-prefixed cache key, e.g. `"qc:getUser:1"`.
pub type CacheKey = String;

/// A serialized tag path, used as the side-channel key for invalidation
/// timestamps (see [`crate::tag::TagPath::serialize`]).
pub type SerializedTag = String;

/// The abstract key/value store the cache engine depends on.
///
/// Storage backends themselves (in-memory LRU, remote KV over HTTP,
/// Redis-style stores) are external collaborators specified only through
/// this trait; this crate ships one reference implementation
/// ([`crate::backends::memory::MemoryStorage`]) for tests and examples.
#[async_trait]
pub trait Storage: Send + Sync + Debug {
    /// Reads an entry by its fully-prefixed cache key.
    async fn get(&self, key: &CacheKey) -> Result<Option<Entry>>;

    /// Writes an entry, replacing whatever was previously stored at `key`.
    ///
    /// Implementations MAY use `entry.grace_until` (or `entry.expires_at`
    /// if grace is absent) to set a backend TTL so expired entries drop
    /// out passively; the engine does not require this.
    async fn set(&self, key: CacheKey, entry: Entry) -> Result<()>;

    /// Deletes an entry. Deleting an absent key is not an error.
    async fn delete(&self, key: &CacheKey) -> Result<()>;

    /// Reads the invalidation timestamp recorded for a serialized tag, if
    /// any write has ever happened for it.
    async fn get_tag_invalidation(&self, tag: &SerializedTag) -> Result<Option<u64>>;

    /// Records an invalidation timestamp for a serialized tag. Writing
    /// overwrites; later wins. Absence means "never invalidated". The set
    /// may grow without bound; a backend MAY age out a tag once no live
    /// entry could still reference it, but the engine never requires
    /// this.
    async fn set_tag_invalidation(&self, tag: SerializedTag, at_ms: u64) -> Result<()>;

    /// Removes all entries and all tag timestamps under the engine's
    /// namespace.
    async fn clear(&self) -> Result<()>;

    /// Releases any resources (connections, background tasks) held by
    /// this backend. A no-op for purely in-process backends.
    async fn disconnect(&self) -> Result<()>;

    /// Whether this backend accepts [`Storage::report_verification`]
    /// calls. Modeled as a capability test rather than dynamic method
    /// lookup: the engine checks this once per `query` instead of
    /// probing for an optional trait method.
    fn supports_verification(&self) -> bool {
        false
    }

    /// Reports the outcome of a sampled verification. Only called
    /// when [`Storage::supports_verification`] returns true. Failures here
    /// are always swallowed by the engine.
    async fn report_verification(
        &self,
        _key: &CacheKey,
        _is_stale: bool,
        _cached_hash: &str,
        _fresh_hash: &str,
    ) -> Result<()> {
        Ok(())
    }
}
