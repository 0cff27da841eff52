//! Single-flight coordination — at most one in-flight execution per key.
//!
//! The first caller to [`join`](FlightGroup::join) a key becomes the
//! *leader* and receives a [`FlightGuard`]; every concurrent caller with
//! the same key becomes a *waiter* and awaits the leader's published
//! outcome. Completing the guard wakes all waiters with a clone of the
//! outcome and removes the in-flight entry immediately. Dropping the guard
//! without completing it (the leader task panicked or was aborted) wakes
//! waiters with [`JoinError`] instead — waiters never hang.
//!
//! A `FlightGroup` is a plain value owned by whoever needs coalescing (the
//! cache layer holds one per instance); there is no process-global state,
//! so independent cache instances coalesce independently.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

/// The leader aborted before publishing an outcome.
#[derive(Debug, Error)]
#[error("in-flight execution aborted before publishing a result")]
pub struct JoinError;

type Registry<T> = Arc<Mutex<HashMap<String, watch::Receiver<Option<T>>>>>;

/// Keyed map of in-flight executions. Cloning shares the same registry.
pub struct FlightGroup<T> {
    inflight: Registry<T>,
}

impl<T> Clone for FlightGroup<T> {
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

impl<T> Default for FlightGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of joining a key: either this caller leads the execution, or it
/// waits on whoever already does.
pub enum Flight<T> {
    /// First caller for the key. Must eventually call
    /// [`FlightGuard::complete`]; dropping the guard instead fails the
    /// waiters over to their own execution.
    Leader(FlightGuard<T>),
    /// Another caller is already executing under this key.
    Waiter(FlightWaiter<T>),
}

impl<T> FlightGroup<T> {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers intent to execute under `key`.
    pub fn join(&self, key: &str) -> Flight<T> {
        let mut inflight = self.inflight.lock();
        if let Some(rx) = inflight.get(key) {
            return Flight::Waiter(FlightWaiter { rx: rx.clone() });
        }

        let (tx, rx) = watch::channel(None);
        inflight.insert(key.to_owned(), rx);
        Flight::Leader(FlightGuard {
            key: key.to_owned(),
            registry: Arc::clone(&self.inflight),
            tx,
            completed: false,
        })
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.lock().is_empty()
    }
}

/// Leader-side handle for one in-flight key.
pub struct FlightGuard<T> {
    key: String,
    registry: Registry<T>,
    tx: watch::Sender<Option<T>>,
    completed: bool,
}

impl<T> FlightGuard<T> {
    /// Publishes the outcome to every waiter and retires the in-flight
    /// entry. Late arrivals for the same key become fresh leaders.
    pub fn complete(mut self, outcome: T) {
        self.registry.lock().remove(&self.key);
        self.completed = true;
        // Waiters hold receiver clones; the value reaches them even though
        // the registry entry is already gone.
        self.tx.send_replace(Some(outcome));
    }
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        if !self.completed {
            self.registry.lock().remove(&self.key);
            // Dropping `tx` without a value closes the channel; waiters
            // observe JoinError.
        }
    }
}

/// Waiter-side handle: resolves once the leader publishes or aborts.
pub struct FlightWaiter<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> FlightWaiter<T> {
    /// Waits for the leader's outcome.
    ///
    /// # Errors
    ///
    /// [`JoinError`] if the leader dropped its guard without completing.
    pub async fn outcome(mut self) -> Result<T, JoinError> {
        let value = self
            .rx
            .wait_for(|slot| slot.is_some())
            .await
            .map_err(|_| JoinError)?;
        // The predicate guarantees the slot is filled.
        value.clone().ok_or(JoinError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_caller_leads() {
        let group: FlightGroup<u32> = FlightGroup::new();
        assert!(matches!(group.join("k"), Flight::Leader(_)));
    }

    #[tokio::test]
    async fn concurrent_callers_wait_and_share_outcome() {
        let group: FlightGroup<u32> = FlightGroup::new();

        let guard = match group.join("k") {
            Flight::Leader(guard) => guard,
            Flight::Waiter(_) => panic!("expected leader"),
        };

        let mut waiters = Vec::new();
        for _ in 0..8 {
            match group.join("k") {
                Flight::Waiter(w) => waiters.push(tokio::spawn(w.outcome())),
                Flight::Leader(_) => panic!("expected waiter"),
            }
        }

        guard.complete(42);

        for handle in waiters {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
    }

    #[tokio::test]
    async fn entry_removed_after_completion() {
        let group: FlightGroup<u32> = FlightGroup::new();
        let Flight::Leader(guard) = group.join("k") else {
            panic!("expected leader");
        };
        assert_eq!(group.len(), 1);
        guard.complete(1);
        assert!(group.is_empty());

        // The key is free again — next caller leads.
        assert!(matches!(group.join("k"), Flight::Leader(_)));
    }

    #[tokio::test]
    async fn dropped_leader_fails_waiters_over() {
        let group: FlightGroup<u32> = FlightGroup::new();
        let Flight::Leader(guard) = group.join("k") else {
            panic!("expected leader");
        };
        let Flight::Waiter(waiter) = group.join("k") else {
            panic!("expected waiter");
        };

        drop(guard);
        assert!(waiter.outcome().await.is_err());
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let group: FlightGroup<&'static str> = FlightGroup::new();
        let Flight::Leader(slow) = group.join("slow") else {
            panic!("expected leader");
        };
        // "slow" is still executing; "fast" proceeds independently.
        let Flight::Leader(fast) = group.join("fast") else {
            panic!("expected leader");
        };
        fast.complete("fast done");

        let Flight::Waiter(waiter) = group.join("slow") else {
            panic!("expected waiter");
        };
        let join = tokio::spawn(waiter.outcome());
        tokio::time::sleep(Duration::from_millis(10)).await;
        slow.complete("slow done");
        assert_eq!(join.await.unwrap().unwrap(), "slow done");
    }
}
