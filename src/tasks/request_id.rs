//! Request ID Generator
//!
//! Background producer feeding unique hex identifiers into a bounded queue.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Identifiers buffered ahead of demand.
pub const REQUEST_ID_QUEUE: usize = 100;

/// Consumer side of the identifier queue. Clones share one queue, so every
/// identifier is handed out exactly once.
#[derive(Debug, Clone)]
pub struct RequestIds {
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl RequestIds {
    /// Waits for the next identifier. `None` only if the producer is gone.
    pub async fn next(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

/// Spawns the identifier producer and returns its consumer handle.
///
/// The producer repeatedly folds a seed taken from the start time into a
/// running SHA-256 state and queues the hex digest after each step. It
/// blocks while the queue is full and stops once every [`RequestIds`]
/// handle has been dropped.
///
/// # Example
/// ```ignore
/// let ids = spawn_request_id_generator(REQUEST_ID_QUEUE);
/// let id = ids.next().await;
/// ```
pub fn spawn_request_id_generator(capacity: usize) -> RequestIds {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let seed = chrono::Utc::now().to_rfc3339().into_bytes();

    tokio::spawn(async move {
        debug!("Starting request id generator with queue of {}", capacity);
        let mut hasher = Sha256::new();
        loop {
            hasher.update(&seed);
            let id = hex::encode(hasher.clone().finalize());
            if tx.send(id).await.is_err() {
                debug!("Request id queue closed, stopping generator");
                break;
            }
        }
    });

    RequestIds {
        rx: Arc::new(Mutex::new(rx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_ids_are_hex_digests() {
        let ids = spawn_request_id_generator(4);
        let id = ids.next().await.unwrap();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_sequential_ids_differ() {
        let ids = spawn_request_id_generator(4);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            assert!(seen.insert(ids.next().await.unwrap()));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumers_get_distinct_ids() {
        let ids = spawn_request_id_generator(REQUEST_ID_QUEUE);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ids = ids.clone();
            handles.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                for _ in 0..50 {
                    taken.push(ids.next().await.unwrap());
                }
                taken
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(all.insert(id), "identifier handed out twice");
            }
        }
        assert_eq!(all.len(), 400);
    }

    #[tokio::test]
    async fn test_full_queue_does_not_fail_producer() {
        let ids = spawn_request_id_generator(2);
        // let the producer fill the queue and block
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        for _ in 0..10 {
            assert!(ids.next().await.is_some());
        }
    }
}
