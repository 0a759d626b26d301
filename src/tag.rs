//! Tag paths: the value type naming a data dependency.
//!
//! A [`TagPath`] is an ordered sequence of non-empty string segments. Tag
//! `P` is a prefix of tag `Q` iff `P` is no longer than `Q` and they agree
//! segment-by-segment over `P`'s length. Invalidating a prefix invalidates
//! every entry tagged with an extension of it; a separate exact-sentinel
//! channel lets a caller confine an invalidation to a single path.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment appended to a tag path to mark it for exact-only invalidation.
///
/// Fixed for wire compatibility: this literal is read and written verbatim
/// by the storage backend's tag-invalidation side channel.
pub const EXACT_SENTINEL: &str = "__exact__";

/// An ordered sequence of non-empty string segments naming a data
/// dependency, e.g. `["posts", "1", "comments"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagPath(Vec<String>);

impl TagPath {
    /// Builds a tag path from a sequence of segments.
    ///
    /// # Panics
    ///
    /// Panics if `segments` is empty or contains an empty segment. Empty
    /// segments are legal in the *serialized* form (per the wire format)
    /// but a [`TagPath`] itself is always built from non-empty segments at
    /// this layer; callers constructing paths from untrusted input should
    /// validate first.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        assert!(!segments.is_empty(), "a tag path must have at least one segment");
        assert!(
            segments.iter().all(|s| !s.is_empty()),
            "a tag path segment must be non-empty"
        );
        Self(segments)
    }

    /// Builds a single-segment tag path.
    pub fn single<S: Into<String>>(segment: S) -> Self {
        Self(vec![segment.into()])
    }

    /// Returns the segments making up this path.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns this path with one additional segment appended.
    pub fn child<S: Into<String>>(&self, segment: S) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Returns this path with the exact-sentinel segment appended, i.e. the
    /// tag used to confine an invalidation to exactly this path.
    pub fn exact(&self) -> Self {
        self.child(EXACT_SENTINEL)
    }

    /// `is_prefix(self, other)`: true iff `self` is no longer than `other`
    /// and agrees with it segment-by-segment over `self`'s length.
    ///
    /// Reflexive: `p.is_prefix(&p)` is always true.
    pub fn is_prefix_of(&self, other: &TagPath) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Iterates over every non-empty prefix of this path, shortest first,
    /// ending with the path itself (length 1..=len(self), inclusive).
    pub fn prefixes(&self) -> impl Iterator<Item = TagPath> + '_ {
        (1..=self.0.len()).map(move |n| TagPath(self.0[..n].to_vec()))
    }

    /// Canonical serialization: segments joined with `:` after
    /// backslash-escaping any `\` or `:` within each segment.
    pub fn serialize(&self) -> String {
        self.0
            .iter()
            .map(|segment| escape_segment(segment))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Inverse of [`TagPath::serialize`]. Empty segments are legal.
    pub fn deserialize(serialized: &str) -> Self {
        if serialized.is_empty() {
            return Self(vec![String::new()]);
        }
        Self(split_escaped(serialized))
    }
}

impl fmt::Display for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        if ch == '\\' || ch == ':' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Splits a serialized tag path back into its original segments, undoing
/// the backslash-escaping [`escape_segment`] applies to `\` and `:`.
fn split_escaped(serialized: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = serialized.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    segments.push(current);
    segments
}
