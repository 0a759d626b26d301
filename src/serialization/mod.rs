//! Serialization support for the cache engine.
//!
//! The engine stores opaque `Vec<u8>` values; a [`Serializer`] is how a
//! loader's typed return value gets in and out of that form. Bincode is
//! the default for on-the-wire compactness; JSON is kept alongside it
//! because sampled verification needs a canonical, stable text
//! encoding to hash, and bincode's encoding is not guaranteed stable
//! across struct field reordering in the way canonical JSON is.

use crate::error::Error;
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Converts typed values to and from the opaque bytes the engine stores.
pub trait Serializer: Send + Sync + Debug {
    /// Serializes a value into bytes.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserializes bytes into a value.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// The default serializer: compact, not self-describing, used for the
/// values actually stored by the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl BincodeSerializer {
    /// Creates a new `BincodeSerializer`.
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for BincodeSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(Error::codec)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(Error::codec)
    }
}

/// A JSON serializer, used by sampled verification to produce the
/// canonical text form a stable hash is computed over. `serde_json`
/// serializes struct fields in their declared order, which keeps the
/// output stable across runs for ordinary structs — but it serializes
/// maps in iteration order, not sorted by key, so a value containing a
/// `HashMap` can still hash differently across processes even though
/// nothing about the value actually changed; callers hashing such a
/// value should use an ordered map (e.g. `BTreeMap`) instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Creates a new `JsonSerializer`.
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(Error::codec)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(Error::codec)
    }
}
