//! Tag-tree runtime: materializes a user-declared schema into a
//! navigable tree of typed accessors over [`crate::tag::TagPath`].
//!
//! The schema itself is two kinds of node:
//! - [`Static`] contributes a fixed segment and exposes named children.
//! - [`Wild`] contributes a caller-supplied segment and is exposed as a
//!   callable taking that string.
//!
//! Full type-level verification that only schema-sanctioned paths can be
//! built (the source's branded-tag trick) is out of reach without
//! const-generics-over-strings; the practical approximation here is that
//! [`TagNode`]'s constructor is crate-private, so paths can only be grown
//! through the navigation methods a schema author exposes on their own
//! wrapper types, never by hand-assembling segments.

use crate::tag::TagPath;
use std::sync::Arc;

/// A materialized tag-tree node: an immutable, shareable handle on the
/// path reached by navigating from the schema's root.
///
/// `path()` always equals the concatenation of the segments
/// contributed by the navigation used to reach this node. A schema
/// author wraps `TagNode` in their own named types and exposes one
/// method per declared child or wildcard; calling a wildcard method
/// advances the path by exactly one segment.
#[derive(Debug, Clone)]
pub struct TagNode {
    path: Arc<TagPath>,
}

impl TagNode {
    /// Roots a new tag tree at a single top-level segment. Schema authors
    /// call this once per root name they declare.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            path: Arc::new(TagPath::single(name)),
        }
    }

    /// Descends into a static named child, appending `name` as the next
    /// segment.
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self {
            path: Arc::new(self.path.child(name)),
        }
    }

    /// Descends through a wildcard position, appending the caller-supplied
    /// `id` as the next segment (exactly one segment added).
    pub fn wild(&self, id: impl Into<String>) -> Self {
        self.child(id)
    }

    /// The full materialized path at this node.
    pub fn path(&self) -> &TagPath {
        &self.path
    }

    /// Convenience for building the tag the engine actually stores and
    /// invalidates against.
    pub fn into_path(self) -> TagPath {
        match Arc::try_unwrap(self.path) {
            Ok(path) => path,
            Err(shared) => (*shared).clone(),
        }
    }
}

/// Declares a static segment in a schema: a fixed name with zero or more
/// named children or wildcard children, built eagerly from a root.
///
/// This is a thin builder over [`TagNode`]; schema authors typically
/// generate one of these per declared name rather than calling it by
/// hand, but nothing prevents direct use for small schemas.
#[derive(Debug, Clone)]
pub struct Static {
    node: TagNode,
}

impl Static {
    /// A new static node rooted directly (no parent).
    pub fn at(name: impl Into<String>) -> Self {
        Self {
            node: TagNode::root(name),
        }
    }

    /// A static node nested under an existing node.
    pub fn under(parent: &TagNode, name: impl Into<String>) -> Self {
        Self {
            node: parent.child(name),
        }
    }

    /// The underlying materialized node.
    pub fn node(&self) -> &TagNode {
        &self.node
    }
}

/// Declares a wildcard position in a schema: a caller-supplied string
/// segment, exposed as a callable.
#[derive(Debug, Clone)]
pub struct Wild {
    parent: TagNode,
}

impl Wild {
    /// A wildcard position rooted under `parent`.
    pub fn under(parent: &TagNode) -> Self {
        Self {
            parent: parent.clone(),
        }
    }

    /// Calling the wildcard with a concrete id yields the subtree rooted
    /// at `parent ++ [id]`.
    pub fn call(&self, id: impl Into<String>) -> TagNode {
        self.parent.wild(id)
    }

    /// The wildcard considered as a value (not called) represents its
    /// parent's path.
    pub fn as_value(&self) -> &TagNode {
        &self.parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_materializes_single_segment_path() {
        let posts = TagNode::root("posts");
        assert_eq!(posts.path(), &TagPath::new(["posts"]));
    }

    #[test]
    fn navigation_concatenates_segments_in_order() {
        let posts = TagNode::root("posts");
        let post = posts.wild("1");
        let comments = post.child("comments");
        assert_eq!(comments.path(), &TagPath::new(["posts", "1", "comments"]));
    }

    #[test]
    fn wildcard_as_value_represents_parent_path() {
        let posts = TagNode::root("posts");
        let wild = Wild::under(&posts);
        assert_eq!(wild.as_value().path(), posts.path());
    }

    #[test]
    fn wildcard_call_adds_exactly_one_segment() {
        let posts = TagNode::root("posts");
        let wild = Wild::under(&posts);
        let post = wild.call("42");
        assert_eq!(post.path().segments().len(), posts.path().segments().len() + 1);
        assert_eq!(post.path(), &TagPath::new(["posts", "42"]));
    }

    #[test]
    fn siblings_share_the_same_parent_branch() {
        let posts = TagNode::root("posts");
        let post = posts.wild("1");
        let comments = post.child("comments");
        let likes = post.child("likes");
        assert_eq!(comments.path().segments()[..2], likes.path().segments()[..2]);
        assert_ne!(comments.path(), likes.path());
    }

    #[test]
    fn static_builder_matches_direct_node_navigation() {
        let root = Static::at("posts");
        let under = Static::under(root.node(), "featured");
        assert_eq!(under.node().path(), &TagPath::new(["posts", "featured"]));
    }
}
