//! Freshness evaluator: classifies a stored entry against the
//! current time and any tag-invalidation timestamps recorded in storage.
//!
//! This module is pure with respect to time and storage: it takes an
//! `Entry`, `now`, and a lookup closure, and returns a [`Freshness`]
//! verdict. The engine is the only caller that actually touches a
//! [`crate::storage::Storage`].

use crate::entry::Entry;
use crate::error::Result;
use crate::tag::TagPath;

/// The three-way freshness classification: progression is monotone
/// over the lifetime of a single entry — `Fresh -> InGrace -> Expired`,
/// never backwards, and a tag invalidation can only push a state forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Safe to serve with no background work triggered.
    Fresh,
    /// Safe to serve, but a background refresh should be scheduled
    /// (stale-while-revalidate).
    InGrace,
    /// Not safe to serve; the caller must block on a fresh load.
    Expired,
}

/// Classifies `entry` as of `now`, given an async lookup for a tag's
/// recorded invalidation timestamp.
///
/// Per the documented design decision, the exact-sentinel channel is
/// always checked first for every tag the entry carries, then every
/// non-empty prefix of every tag; any timestamp `>= entry.created_at`
/// forces [`Freshness::Expired`] regardless of the TTL/grace timestamps.
/// The boundary is inclusive: a timestamp exactly equal to
/// `created_at` invalidates the entry.
pub async fn classify<F, Fut>(entry: &Entry, now: u64, lookup_tag: F) -> Result<Freshness>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<Option<u64>>>,
{
    for tag in &entry.tags {
        let exact = tag.exact().serialize();
        if let Some(at) = lookup_tag(exact).await? {
            if at >= entry.created_at {
                return Ok(Freshness::Expired);
            }
        }
    }

    for tag in &entry.tags {
        for prefix in tag.prefixes() {
            let serialized = prefix.serialize();
            if let Some(at) = lookup_tag(serialized).await? {
                if at >= entry.created_at {
                    return Ok(Freshness::Expired);
                }
            }
        }
    }

    Ok(classify_by_time(entry, now))
}

/// The time-only half of classification, with no tag lookups: used once
/// the caller has already established no tag invalidation applies, and
/// directly by tests that want to check TTL/grace boundaries in
/// isolation.
pub fn classify_by_time(entry: &Entry, now: u64) -> Freshness {
    if now < entry.expires_at {
        Freshness::Fresh
    } else if let Some(grace_until) = entry.grace_until {
        if now < grace_until {
            Freshness::InGrace
        } else {
            Freshness::Expired
        }
    } else {
        Freshness::Expired
    }
}

/// Convenience: the serialized tag path under which `tag` itself (not
/// exact-only) is reachable via a prefix invalidation. Exposed for the
/// engine, which writes to this key on a non-exact invalidation.
pub fn prefix_key(tag: &TagPath) -> String {
    tag.serialize()
}

/// Convenience: the serialized key the exact-only invalidation channel
/// writes and reads. Exposed for the engine's invalidation path.
pub fn exact_key(tag: &TagPath) -> String {
    tag.exact().serialize()
}
