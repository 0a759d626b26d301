//! Error types for the tagcache library.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The main error type for the tagcache library.
///
/// Variants correspond to the error kinds named by cause rather than by call
/// site: a config problem, a backend I/O failure, a user loader failure, or a
/// verification-path failure. The engine never converts one kind into
/// another and never retries (see the crate-level error handling notes).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// `verify_percent` out of `[0, 1]`, or a malformed duration string.
    /// Raised at construction or first use; fatal.
    #[error("config error: {0}")]
    Config(String),

    /// The storage backend failed a read, write, or administrative call.
    /// Propagated from synchronous paths; swallowed from background paths.
    #[error("backend error: {0}")]
    Backend(String),

    /// The caller-supplied loader raised. Recoverable via grace; otherwise
    /// propagated to the caller and to every coalesced joiner.
    #[error("loader error: {0}")]
    Loader(String),

    /// The verification loader raised, or the verification report call
    /// failed. Always swallowed by the engine.
    #[error("verification error: {0}")]
    Verification(String),

    /// An error that occurred during serialization or deserialization of a
    /// cached value.
    #[error("codec error: {0}")]
    Codec(String),

    /// An error that occurred while initializing the global engine more
    /// than once.
    #[error("global engine has already been initialized")]
    AlreadyInitialized,

    /// An error that doesn't fit into the other categories.
    #[error("cache error: {0}")]
    Other(String),
}

impl Error {
    /// Creates a new config error.
    pub fn config<E: fmt::Display>(error: E) -> Self {
        Self::Config(error.to_string())
    }

    /// Creates a new backend error.
    pub fn backend<E: fmt::Display>(error: E) -> Self {
        Self::Backend(error.to_string())
    }

    /// Creates a new loader error.
    pub fn loader<E: fmt::Display>(error: E) -> Self {
        Self::Loader(error.to_string())
    }

    /// Creates a new verification error.
    pub fn verification<E: fmt::Display>(error: E) -> Self {
        Self::Verification(error.to_string())
    }

    /// Creates a new codec error.
    pub fn codec<E: fmt::Display>(error: E) -> Self {
        Self::Codec(error.to_string())
    }

    /// Creates a new other error.
    pub fn other<E: fmt::Display>(error: E) -> Self {
        Self::Other(error.to_string())
    }
}

/// A specialized `Result` type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
