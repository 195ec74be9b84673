// ── omem Engine: Worker Pool ────────────────────────────────────────────────
//
// Bounded pool absorbing asynchronous write-path calls. Jobs are boxed
// futures over a bounded mpsc channel; overflow callers get a not-queued
// ack rather than backpressure. Shutdown drains in-flight jobs under a
// deadline.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::atoms::error::{MemoryError, MemoryResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Close-time drain deadline.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

pub struct WorkerPool {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `size` workers over a queue of `queue_size` slots.
    pub fn new(size: usize, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(queue_size.max(1));
        let rx = std::sync::Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..size.max(1))
            .map(|_| {
                let rx = std::sync::Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = rx.lock().await;
                            rx.recv().await
                        };
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        info!("[pool] Started {} workers (queue {})", size.max(1), queue_size.max(1));
        WorkerPool {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Enqueue a job. Returns whether it was accepted — a full queue or a
    /// stopped pool yields `false`, never an error.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => match tx.try_send(Box::pin(job)) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("[pool] Queue full, job rejected");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
            None => false,
        }
    }

    /// Stop accepting work and wait for in-flight jobs, up to the drain
    /// deadline.
    pub async fn shutdown(&self) -> MemoryResult<()> {
        self.tx.lock().take(); // closes the channel; workers exit at drain
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();

        let drain = async {
            for handle in workers {
                let _ = handle.await;
            }
        };
        match tokio::time::timeout(DRAIN_DEADLINE, drain).await {
            Ok(()) => {
                info!("[pool] Drained cleanly");
                Ok(())
            }
            Err(_) => {
                warn!("[pool] Drain exceeded {}s", DRAIN_DEADLINE.as_secs());
                Err(MemoryError::ShutdownTimeout(DRAIN_DEADLINE.as_secs()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_run_and_pool_drains() {
        let pool = WorkerPool::new(2, 16);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            assert!(pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.shutdown().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(1, 4);
        pool.shutdown().await.unwrap();
        assert!(!pool.submit(async {}));
    }

    #[tokio::test]
    async fn overflow_gets_false_not_error() {
        let pool = WorkerPool::new(1, 1);
        // Saturate the single worker and single queue slot.
        pool.submit(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        pool.submit(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        // The next job may or may not fit depending on pickup timing; push
        // until one bounces.
        let mut rejected = false;
        for _ in 0..4 {
            if !pool.submit(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }) {
                rejected = true;
                break;
            }
        }
        assert!(rejected);
        pool.shutdown().await.ok();
    }
}
