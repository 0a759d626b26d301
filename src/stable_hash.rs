//! Stable hash: the djb2-style 32-bit hash of a value's canonical JSON
//! serialization, rendered as 8 hex digits (see the glossary entry
//! "Stable hash"). Used only by sampled verification to compare a cached
//! value against a freshly loaded one without exposing either value to
//! the backend.
//!
//! Chosen for cross-process agreement, not cryptographic strength: two
//! processes computing this over the same canonical bytes always agree.

use crate::error::Result;
use crate::serialization::{JsonSerializer, Serializer};
use serde::Serialize;

/// Computes the stable hash of `value`'s canonical JSON encoding.
pub fn hash_value<T: Serialize>(value: &T) -> Result<String> {
    let bytes = JsonSerializer::new().serialize(value)?;
    Ok(hash_bytes(&bytes))
}

/// The djb2 hash (`h = h * 33 + byte`, wrapping 32-bit arithmetic),
/// starting from the conventional seed `5381`, rendered as 8 lowercase
/// hex digits.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hash: u32 = 5381;
    for &byte in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u32);
    }
    format!("{hash:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn hash_is_eight_hex_digits() {
        let h = hash_bytes(b"hello world");
        assert_eq!(h.len(), 8);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_input_hashes_to_seed() {
        assert_eq!(hash_bytes(b""), format!("{:08x}", 5381u32));
    }

    #[test]
    fn same_value_hashes_the_same() {
        let a = Point { x: 1, y: 2 };
        let b = Point { x: 1, y: 2 };
        assert_eq!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn different_values_hash_differently() {
        let a = Point { x: 1, y: 2 };
        let b = Point { x: 1, y: 3 };
        assert_ne!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn known_vector() {
        // djb2 over "a": 5381 * 33 + 97 = 177670
        assert_eq!(hash_bytes(b"a"), format!("{:08x}", 177_670u32));
    }
}
