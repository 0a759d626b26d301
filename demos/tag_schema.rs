//! Building a navigable tag schema out of [`tagcache::tagtree`]'s
//! `TagNode`/`Static`/`Wild` building blocks, then using the resulting
//! paths to cache and invalidate post comments.

use tagcache::tagtree::{TagNode, Wild};
use tagcache::TagPath;

/// A small hand-written schema: `posts` is a wildcard keyed by post id,
/// and each post has a `comments` child.
struct Schema {
    posts: Wild,
}

struct Post {
    node: TagNode,
}

impl Schema {
    fn new() -> Self {
        let root = TagNode::root("posts");
        Self {
            posts: Wild::under(&root),
        }
    }

    fn post(&self, id: &str) -> Post {
        Post {
            node: self.posts.call(id),
        }
    }
}

impl Post {
    fn path(&self) -> TagPath {
        self.node.path().clone()
    }

    fn comments(&self) -> TagPath {
        self.node.child("comments").into_path()
    }
}

fn main() {
    let schema = Schema::new();

    let post_1 = schema.post("1");
    println!("post tag: {}", post_1.path());
    println!("post comments tag: {}", post_1.comments());

    // Invalidating the post's own path cascades to its comments (and any
    // other children declared under it), since "posts/1" is a prefix of
    // "posts/1/comments".
    assert!(post_1.path().is_prefix_of(&post_1.comments()));

    let post_2 = schema.post("2");
    assert_ne!(post_1.comments(), post_2.comments());
    println!("distinct posts produce distinct comment tags: {} vs {}", post_1.comments(), post_2.comments());
}
