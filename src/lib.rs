#![warn(missing_docs)]
//! # tagcache
//!
//! A declarative, tag-indexed result cache. Callers register named
//! queries; each query maps its arguments to a deterministic cache key,
//! a set of hierarchical tags expressing the data it depends on, and a
//! loader producing the value on miss. Invalidation is expressed against
//! tag paths rather than individual keys — the engine decides which
//! stored entries become stale.
//!
//! ## Features
//!
//! - **Hierarchical tags**: invalidate `["posts", "1"]` and every entry
//!   tagged with an extension of that path goes stale, without
//!   enumerating which entries those are.
//! - **Stampede protection**: concurrent callers asking for the same
//!   cache key while nothing fresh exists share a single loader call.
//! - **Stale-while-revalidate**: entries past their TTL but within a
//!   grace window are served immediately while a background refresh
//!   runs.
//! - **Sampled verification**: an optional background check that a
//!   cached value still agrees with a freshly loaded one, reported to
//!   backends that accept it.
//! - **Pluggable storage**: the engine depends only on the [`Storage`]
//!   contract; this crate ships an in-process reference implementation.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tagcache::{backends::memory::MemoryStorage, CacheConfigBuilder, Engine, TagPath};
//!
//! # async fn run() -> tagcache::Result<()> {
//! let engine = Engine::new(Arc::new(MemoryStorage::new()), CacheConfigBuilder::new().build()?);
//!
//! let user = engine
//!     .query(
//!         "getUser:1",
//!         vec![TagPath::new(["user", "1"])],
//!         || async { Ok("Alice".to_string()) },
//!         None,
//!         None,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod clock;
pub mod coalescer;
pub mod duration;
pub mod engine;
pub mod entry;
pub mod error;
pub mod freshness;
pub mod metrics;
pub mod refresher;
pub mod serialization;
pub mod stable_hash;
pub mod storage;
pub mod tag;
pub mod tagtree;

pub use engine::{CacheConfig, CacheConfigBuilder, Engine};
pub use entry::Entry;
pub use error::Error;
pub use storage::Storage;
pub use tag::TagPath;

#[cfg(feature = "macros")]
#[doc(inline)]
pub use tagcache_macros::query;

/// The crate's result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Common prelude for using the library.
pub mod prelude {
    pub use crate::{
        backends::memory::MemoryStorage, engine::CacheConfigBuilder, engine::Engine, error::Error,
        storage::Storage, tag::TagPath, Result,
    };

    #[cfg(feature = "macros")]
    pub use crate::query;
}

mod global {
    use crate::engine::Engine;
    use crate::error::Error;
    use crate::Result;
    use std::sync::OnceLock;

    static GLOBAL_ENGINE: OnceLock<Engine> = OnceLock::new();

    /// Initializes the process-global engine. Returns
    /// [`Error::AlreadyInitialized`] if called more than once.
    pub fn init_global_engine(engine: Engine) -> Result<()> {
        GLOBAL_ENGINE
            .set(engine)
            .map_err(|_| Error::AlreadyInitialized)
    }

    /// Returns the process-global engine.
    ///
    /// # Panics
    ///
    /// Panics if [`init_global_engine`] has not been called yet.
    pub fn global_engine() -> &'static Engine {
        GLOBAL_ENGINE
            .get()
            .expect("global engine not initialized; call init_global_engine first")
    }
}

pub use global::{global_engine, init_global_engine};
