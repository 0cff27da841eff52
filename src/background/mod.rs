//! Background tasks — the cache write-back queue.
//!
//! Persisting a captured response must not sit on the response path: the
//! client has its bytes before the store write necessarily completes.
//! [`WriteBackQueue`] models that explicitly as a bounded in-process task
//! queue (one worker, one mpsc channel) instead of detached fire-and-forget
//! tasks, so backpressure has a defined policy and tests can await
//! completion deterministically via [`flush`](WriteBackQueue::flush).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::cache::CacheStore;

enum Job {
    Store {
        key: String,
        payload: Bytes,
        ttl: Duration,
    },
    // Barrier: acked once every job enqueued before it has been processed.
    Flush(oneshot::Sender<()>),
}

/// Bounded queue that persists captured responses off the response path.
///
/// When the queue is full the write is dropped with a warning — losing an
/// opportunistic cache write is cheaper than stalling live responses.
/// Store failures are logged and swallowed; they never reach a client.
pub struct WriteBackQueue {
    tx: mpsc::Sender<Job>,
}

impl WriteBackQueue {
    /// Spawns the worker task. Must be called from within a Tokio runtime.
    ///
    /// `capacity` bounds how many pending writes may queue up before new
    /// ones are rejected.
    pub fn spawn(store: Arc<dyn CacheStore>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(capacity);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Store { key, payload, ttl } => {
                        match store.set(&key, payload, ttl).await {
                            Ok(()) => debug!(key = %key, "cache write-back stored"),
                            Err(e) => warn!(key = %key, error = %e, "cache write-back failed"),
                        }
                    }
                    Job::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    /// Enqueues a store write. Never blocks; a full or closed queue drops
    /// the job with a warning.
    pub fn enqueue(&self, key: String, payload: Bytes, ttl: Duration) {
        let job = Job::Store { key, payload, ttl };
        if let Err(err) = self.tx.try_send(job) {
            let reason = match &err {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "worker gone",
            };
            if let Job::Store { key, .. } = err.into_inner() {
                warn!(key = %key, reason, "cache write-back dropped");
            }
        }
    }

    /// Resolves once every write enqueued before this call has been
    /// processed. Primarily for tests and orderly shutdown.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;

    #[tokio::test]
    async fn enqueued_write_reaches_the_store() {
        let store = Arc::new(MemoryStore::new());
        let queue = WriteBackQueue::spawn(store.clone(), 8);

        queue.enqueue(
            "v1:/ping".into(),
            Bytes::from_static(b"pong"),
            Duration::from_secs(60),
        );
        queue.flush().await;

        assert_eq!(
            store.get("v1:/ping").await.unwrap(),
            Some(Bytes::from_static(b"pong"))
        );
    }

    #[tokio::test]
    async fn flush_waits_for_prior_jobs() {
        let store = Arc::new(MemoryStore::new());
        let queue = WriteBackQueue::spawn(store.clone(), 32);

        for i in 0..20 {
            queue.enqueue(
                format!("v1:/item/{i}"),
                Bytes::from_static(b"x"),
                Duration::from_secs(60),
            );
        }
        queue.flush().await;

        for i in 0..20 {
            assert!(store.exists(&format!("v1:/item/{i}")).await.unwrap());
        }
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let store = Arc::new(MemoryStore::new());
        let queue = WriteBackQueue::spawn(store, 1);

        // Deliberately overrun a tiny queue; enqueue must return promptly
        // whether or not each job fits.
        for i in 0..50 {
            queue.enqueue(
                format!("v1:/burst/{i}"),
                Bytes::from_static(b"x"),
                Duration::from_secs(60),
            );
        }
        queue.flush().await;
    }
}
