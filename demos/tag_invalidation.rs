//! Hierarchical vs. exact tag invalidation: invalidating a prefix tag
//! forces reload of everything tagged under it, while invalidating the
//! same path "exactly" leaves deeper entries alone.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tagcache::backends::memory::MemoryStorage;
use tagcache::{CacheConfigBuilder, Engine, Storage, TagPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Comment {
    post_id: String,
    body: String,
}

#[tokio::main]
async fn main() -> tagcache::Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let config = CacheConfigBuilder::new().prefix("demo").build()?;
    let engine = Engine::new(storage, config);

    let version = Arc::new(AtomicU32::new(0));
    let loader = {
        let version = version.clone();
        move || {
            let version = version.clone();
            async move {
                let v = version.load(Ordering::SeqCst);
                Ok(Comment {
                    post_id: "1".to_string(),
                    body: format!("comment body v{v}"),
                })
            }
        }
    };

    let tags = vec![TagPath::new(["posts", "1", "comments"])];

    let before: Comment = engine
        .query("comments:1", tags.clone(), loader.clone(), None, None)
        .await?;
    println!("before invalidation: {before:?}");

    version.fetch_add(1, Ordering::SeqCst);

    // Hierarchical: invalidating "posts/1" cascades to "posts/1/comments".
    engine
        .invalidate(&[TagPath::new(["posts", "1"])], false)
        .await?;
    let after_hierarchical: Comment = engine
        .query("comments:1", tags.clone(), loader.clone(), None, None)
        .await?;
    println!("after hierarchical invalidation: {after_hierarchical:?}");
    assert_ne!(before.body, after_hierarchical.body);

    version.fetch_add(1, Ordering::SeqCst);

    // Exact: invalidating "posts/1" exactly does not cascade to
    // "posts/1/comments", so the cached comment survives untouched.
    engine
        .invalidate(&[TagPath::new(["posts", "1"])], true)
        .await?;
    let after_exact: Comment = engine.query("comments:1", tags, loader, None, None).await?;
    println!("after exact invalidation: {after_exact:?}");
    assert_eq!(after_hierarchical.body, after_exact.body);

    Ok(())
}
