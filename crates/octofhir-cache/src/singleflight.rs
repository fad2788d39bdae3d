//! Per-process coalescing of concurrent loads for the same key.
//!
//! The first caller for a key becomes the leader and runs the work; callers
//! that arrive while it runs wait on a watch channel and receive a clone of
//! the leader's result. If the leader's future is dropped before it finishes,
//! its entry is removed and the sender closes, so waiting callers retry and
//! one of them takes over.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::error::CacheError;

/// Result shared between the leader and its followers: encoded bytes, or
/// `None` when the loader reported no data.
pub type SharedLoad = Result<Option<Arc<Vec<u8>>>, CacheError>;

type Slot = watch::Receiver<Option<SharedLoad>>;

/// Outcome of one [`SingleFlight::run`] call.
#[derive(Debug)]
pub struct Flight {
    pub result: SharedLoad,
    /// `true` if this caller received another caller's result.
    pub shared: bool,
}

#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: DashMap<String, Slot>,
}

/// Removes the leader's entry on completion or cancellation. The sender is
/// dropped right after, which wakes followers still waiting.
struct LeaderGuard<'a> {
    in_flight: &'a DashMap<String, Slot>,
    key: &'a str,
    tx: watch::Sender<Option<SharedLoad>>,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(self.key);
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a load in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Runs `work` unless a load for `key` is already running, in which case
    /// waits for and returns that load's result.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Flight
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SharedLoad>,
    {
        let tx = loop {
            let mut rx = match self.in_flight.entry(key.to_string()) {
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => {
                    let (tx, rx) = watch::channel(None);
                    entry.insert(rx);
                    break tx;
                }
            };

            let waited = rx
                .wait_for(Option::is_some)
                .await
                .map(|value| value.clone());
            if let Ok(Some(result)) = waited {
                return Flight {
                    result,
                    shared: true,
                };
            }
            tracing::debug!(key = %key, "Coalesced load abandoned by its leader, retrying");
        };

        let guard = LeaderGuard {
            in_flight: &self.in_flight,
            key,
            tx,
        };
        let result = work().await;
        guard.tx.send_replace(Some(result.clone()));
        drop(guard);

        Flight {
            result,
            shared: false,
        }
    }
}
