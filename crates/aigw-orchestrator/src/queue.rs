//! Soft concurrency gate: once `max_concurrent` requests are in flight,
//! further callers wait on a `Notify` up to `queue_timeout` rather than
//! piling unboundedly onto the providers below. A full queue does not reject
//! the caller outright -- it proceeds anyway, since the alternative is an
//! unconditional 503 for traffic the providers might well have absorbed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use aigw_common::GatewayError;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub enabled: bool,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub queue_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: 10,
            max_queue_size: 100,
            queue_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Queue {
    config: QueueConfig,
    active: AtomicUsize,
    queued: AtomicUsize,
    notify: Notify,
}

/// Released automatically when dropped, so an early `?` return on the
/// caller's side can never leak a permit.
pub struct Admission<'a> {
    queue: &'a Queue,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.queue.active.fetch_sub(1, Ordering::AcqRel);
        self.queue.notify.notify_waiters();
    }
}

impl Queue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            active: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Admits the caller, waiting if the gate is at capacity and there is
    /// still room to queue. Returns a guard that releases the slot on drop.
    pub async fn admit(&self) -> Result<Admission<'_>, GatewayError> {
        if !self.config.enabled || self.active.load(Ordering::Relaxed) < self.config.max_concurrent {
            self.active.fetch_add(1, Ordering::AcqRel);
            return Ok(Admission { queue: self });
        }

        if self.queued.load(Ordering::Relaxed) >= self.config.max_queue_size {
            self.active.fetch_add(1, Ordering::AcqRel);
            return Ok(Admission { queue: self });
        }

        self.queued.fetch_add(1, Ordering::AcqRel);
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.active.load(Ordering::Relaxed) < self.config.max_concurrent {
                    break;
                }
                notified.await;
            }
        };
        let outcome = tokio::time::timeout(self.config.queue_timeout, wait).await;
        self.queued.fetch_sub(1, Ordering::AcqRel);

        match outcome {
            Ok(()) => {
                self.active.fetch_add(1, Ordering::AcqRel);
                Ok(Admission { queue: self })
            }
            Err(_) => Err(GatewayError::Generic {
                code: "QUEUE_TIMEOUT",
                message: "timed out waiting for a free execution slot".to_string(),
                retryable: true,
                cause: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_immediately_under_capacity() {
        let queue = Queue::new(QueueConfig {
            max_concurrent: 2,
            ..Default::default()
        });
        let _a = queue.admit().await.unwrap();
        assert_eq!(queue.active_count(), 1);
        let _b = queue.admit().await.unwrap();
        assert_eq!(queue.active_count(), 2);
    }

    #[tokio::test]
    async fn disabled_queue_never_blocks() {
        let queue = Queue::new(QueueConfig {
            enabled: false,
            max_concurrent: 1,
            ..Default::default()
        });
        let _a = queue.admit().await.unwrap();
        let _b = queue.admit().await.unwrap();
        assert_eq!(queue.active_count(), 2);
    }

    #[tokio::test]
    async fn release_wakes_a_waiter() {
        let queue = std::sync::Arc::new(Queue::new(QueueConfig {
            max_concurrent: 1,
            max_queue_size: 1,
            queue_timeout: Duration::from_secs(5),
            enabled: true,
        }));
        let first = queue.admit().await.unwrap();

        let queue2 = queue.clone();
        let waiter = tokio::spawn(async move {
            let _second = queue2.admit().await.unwrap();
        });

        tokio::task::yield_now().await;
        assert_eq!(queue.queued_count(), 1);
        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn queued_waiter_times_out() {
        let queue = std::sync::Arc::new(Queue::new(QueueConfig {
            max_concurrent: 1,
            max_queue_size: 1,
            queue_timeout: Duration::from_millis(50),
            enabled: true,
        }));
        let _holder = queue.admit().await.unwrap();

        let queue2 = queue.clone();
        let waiter = tokio::spawn(async move { queue2.admit().await });
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(100)).await;

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(GatewayError::Generic { retryable: true, .. })));
    }
}
