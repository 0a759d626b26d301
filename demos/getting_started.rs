//! Basic named-query caching: a loader runs once per cache miss, and
//! repeated calls for the same key return the cached value.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tagcache::backends::memory::MemoryStorage;
use tagcache::{CacheConfigBuilder, Engine, Storage, TagPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: String,
    name: String,
}

#[tokio::main]
async fn main() -> tagcache::Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let config = CacheConfigBuilder::new()
        .prefix("demo")
        .default_ttl("60s")?
        .build()?;
    let engine = Engine::new(storage, config);

    let loader_calls = Arc::new(AtomicU32::new(0));

    let fetch_user = {
        let loader_calls = loader_calls.clone();
        move || {
            let loader_calls = loader_calls.clone();
            async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                println!("loading user 1 from the database...");
                Ok(User {
                    id: "1".to_string(),
                    name: "Alice".to_string(),
                })
            }
        }
    };

    let tags = vec![TagPath::new(["user", "1"])];

    let first: User = engine
        .query("getUser:1", tags.clone(), fetch_user.clone(), None, None)
        .await?;
    println!("first call: {first:?}");

    let second: User = engine.query("getUser:1", tags, fetch_user, None, None).await?;
    println!("second call: {second:?}");

    assert_eq!(loader_calls.load(Ordering::SeqCst), 1);
    println!("loader ran exactly once across both calls");

    Ok(())
}
