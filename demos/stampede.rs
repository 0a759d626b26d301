//! Stampede protection: many concurrent callers asking for the same
//! cold cache key share a single loader invocation instead of each
//! hitting the origin independently.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tagcache::backends::memory::MemoryStorage;
use tagcache::{CacheConfigBuilder, Engine, Storage, TagPath};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Product {
    id: String,
    price_cents: u64,
}

#[tokio::main]
async fn main() -> tagcache::Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let config = CacheConfigBuilder::new().prefix("demo").build()?;
    let engine = Engine::new(storage, config);

    let loader_calls = Arc::new(AtomicU32::new(0));
    let loader = {
        let loader_calls = loader_calls.clone();
        move || {
            let loader_calls = loader_calls.clone();
            async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                // Simulate a slow origin call; every concurrent caller
                // below joins this one in-flight load instead of
                // starting its own.
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Product {
                    id: "sku-1".to_string(),
                    price_cents: 1999,
                })
            }
        }
    };

    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        let loader = loader.clone();
        let tags = vec![TagPath::single("sku-1")];
        handles.push(tokio::spawn(async move {
            engine
                .query::<Product, _, _>("product:sku-1", tags, loader, None, None)
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap()?);
    }

    let calls = loader_calls.load(Ordering::SeqCst);
    println!("20 concurrent callers, loader invoked {calls} time(s)");
    assert_eq!(calls, 1);
    assert!(results.iter().all(|p| *p == results[0]));

    Ok(())
}
