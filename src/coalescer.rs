//! Stampede coalescer: ensures that concurrent callers asking for the
//! same cache key while no fresh value exists share a single loader
//! invocation instead of each running it.
//!
//! Grounded in the in-flight-map + RAII-guard idiom used for multi-tier
//! cache stampede protection: a `DashMap<String, ...>` records one
//! in-progress load per key; the first caller to insert becomes the
//! completer and runs the loader, everyone else awaits a broadcast of its
//! result. The guard's `Drop` impl removes the map entry even if the
//! completer's future is cancelled.

use crate::error::Error;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What joiners receive once the completer finishes: the loader's result,
/// cloned to every receiver. `Error` is `Clone`, so a loader failure
/// reaches every joiner exactly as the completer saw it.
pub type Shared = Result<Arc<Vec<u8>>, Error>;

struct InFlight {
    sender: broadcast::Sender<Shared>,
}

/// Process-local registry of in-progress loads, keyed by fully-prefixed
/// cache key. One coalescer is shared by all callers of a single engine
/// instance; it does not persist across process restarts and coalesces
/// only within this process (Non-goal: cross-process coalescing).
#[derive(Debug, Default)]
pub struct Coalescer {
    in_flight: Arc<DashMap<String, InFlight>>,
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight").finish_non_exhaustive()
    }
}

/// The outcome of [`Coalescer::register`]: either this caller is the
/// completer and must run the loader and call [`Completer::finish`], or
/// this caller is a joiner and must await the completer's result.
pub enum Registration {
    Completer(Completer),
    Joiner(broadcast::Receiver<Shared>),
}

/// Held by the caller responsible for actually running the loader.
/// Dropping this without calling [`Completer::finish`] (e.g. on panic or
/// cancellation) still removes the in-flight entry, so a future caller
/// is not wedged behind a load that never completes — but it does not
/// wake any joiners, who will see their receiver lagged/closed and must
/// fall back to a retry.
pub struct Completer {
    key: String,
    sender: broadcast::Sender<Shared>,
    registry: Arc<DashMap<String, InFlight>>,
    finished: bool,
}

impl Completer {
    /// Removes the in-flight entry for this key and publishes the
    /// loader's result to every joiner already subscribed.
    ///
    /// The entry is removed before the broadcast goes out: if a new
    /// caller calls `register` between the two steps, it must see a
    /// vacant slot and become a fresh completer that re-reads storage,
    /// not a joiner subscribing to a channel that already delivered its
    /// one message and is about to close.
    pub fn finish(mut self, result: Shared) {
        self.registry.remove(&self.key);
        let _ = self.sender.send(result);
        self.finished = true;
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        if !self.finished {
            self.registry.remove(&self.key);
        }
    }
}

impl Coalescer {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Registers interest in loading `key`. The first caller for a given
    /// key becomes the [`Registration::Completer`]; every subsequent
    /// caller while that load is in flight becomes a
    /// [`Registration::Joiner`] and receives the completer's result when
    /// it finishes.
    pub fn register(&self, key: &str) -> Registration {
        match self.in_flight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                Registration::Joiner(occupied.get().sender.subscribe())
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let (sender, _receiver) = broadcast::channel(1);
                vacant.insert(InFlight {
                    sender: sender.clone(),
                });
                Registration::Completer(Completer {
                    key: key.to_string(),
                    sender,
                    registry: self.in_flight.clone(),
                    finished: false,
                })
            }
        }
    }

    /// Number of keys currently being loaded. Exposed for metrics and
    /// tests, not used by the engine itself.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn second_registration_for_same_key_joins() {
        let coalescer = Coalescer::new();
        let first = coalescer.register("k");
        assert!(matches!(first, Registration::Completer(_)));

        let second = coalescer.register("k");
        assert!(matches!(second, Registration::Joiner(_)));
    }

    #[tokio::test]
    async fn joiner_receives_completers_value() {
        let coalescer = Coalescer::new();
        let completer = match coalescer.register("k") {
            Registration::Completer(c) => c,
            _ => panic!("expected completer"),
        };
        let mut joiner = match coalescer.register("k") {
            Registration::Joiner(rx) => rx,
            _ => panic!("expected joiner"),
        };

        completer.finish(Ok(Arc::new(vec![1, 2, 3])));

        let value = joiner.recv().await.unwrap().unwrap();
        assert_eq!(*value, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn joiner_receives_completers_error() {
        let coalescer = Coalescer::new();
        let completer = match coalescer.register("k") {
            Registration::Completer(c) => c,
            _ => panic!("expected completer"),
        };
        let mut joiner = match coalescer.register("k") {
            Registration::Joiner(rx) => rx,
            _ => panic!("expected joiner"),
        };

        completer.finish(Err(Error::loader("boom")));

        let value = joiner.recv().await.unwrap();
        assert!(value.is_err());
    }

    #[tokio::test]
    async fn finishing_removes_in_flight_entry() {
        let coalescer = Coalescer::new();
        let completer = match coalescer.register("k") {
            Registration::Completer(c) => c,
            _ => panic!("expected completer"),
        };
        assert_eq!(coalescer.in_flight_count(), 1);
        completer.finish(Ok(Arc::new(vec![])));
        assert_eq!(coalescer.in_flight_count(), 0);

        assert!(matches!(coalescer.register("k"), Registration::Completer(_)));
    }

    #[tokio::test]
    async fn concurrent_callers_only_run_loader_once() {
        let coalescer = Arc::new(Coalescer::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut joins = Vec::new();

        for _ in 0..8 {
            let coalescer = coalescer.clone();
            let calls = calls.clone();
            joins.push(tokio::spawn(async move {
                match coalescer.register("k") {
                    Registration::Completer(completer) => {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        completer.finish(Ok(Arc::new(vec![42])));
                    }
                    Registration::Joiner(mut rx) => {
                        rx.recv().await.unwrap().unwrap();
                    }
                }
            }));
        }

        for join in joins {
            join.await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
