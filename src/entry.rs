//! Cache entry records.

use crate::error::{Error, Result};
use crate::tag::TagPath;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A stored cache entry: an opaque value plus the tags it depends on and
/// the three timestamps that drive the freshness evaluator.
///
/// Entries are never mutated in place; a refresh always produces and
/// stores a brand new `Entry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// The loader's return value, serialized opaquely by the engine's
    /// [`crate::serialization::Serializer`].
    pub value: Vec<u8>,
    /// The non-empty set of tags this value depends on.
    pub tags: HashSet<TagPath>,
    /// Monotonic-wall-clock milliseconds at which this entry was created.
    pub created_at: u64,
    /// Monotonic-wall-clock milliseconds after which the entry is no
    /// longer fresh.
    pub expires_at: u64,
    /// Monotonic-wall-clock milliseconds after which the entry is no
    /// longer usable at all, if grace is enabled.
    pub grace_until: Option<u64>,
}

impl Entry {
    /// Builds a new entry, validating `created_at <= expires_at <=
    /// grace_until` (when grace is present).
    pub fn new(
        value: Vec<u8>,
        tags: HashSet<TagPath>,
        created_at: u64,
        expires_at: u64,
        grace_until: Option<u64>,
    ) -> Result<Self> {
        if tags.is_empty() {
            return Err(Error::other("a cache entry must carry at least one tag"));
        }
        if created_at > expires_at {
            return Err(Error::other("entry created_at must not exceed expires_at"));
        }
        if let Some(grace_until) = grace_until {
            if expires_at > grace_until {
                return Err(Error::other(
                    "entry expires_at must not exceed grace_until",
                ));
            }
        }
        Ok(Self {
            value,
            tags,
            created_at,
            expires_at,
            grace_until,
        })
    }
}
