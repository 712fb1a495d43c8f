//! Embedding throttle — a counting semaphore bounding concurrent
//! embedding computations process-wide, with observable counters.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

/// Waits longer than this are logged as backpressure telemetry.
const WAIT_LOG_MS: f64 = 50.0;

#[derive(Debug, Default)]
struct WaitStats {
    total_ms: f64,
    count: u64,
}

/// Bounds concurrent embedding work. All embedding paths go through one
/// shared instance.
pub struct EmbeddingThrottle {
    semaphore: Arc<Semaphore>,
    queue_depth: AtomicUsize,
    waits: Mutex<WaitStats>,
}

/// Observable throttle counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ThrottleStats {
    pub queue_depth: usize,
    pub wait_ms_avg: f64,
}

impl EmbeddingThrottle {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
            queue_depth: AtomicUsize::new(0),
            waits: Mutex::new(WaitStats::default()),
        }
    }

    /// Run an embedding computation behind the semaphore.
    pub async fn run<F, Fut, T>(&self, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let depth = self.queue_depth.fetch_add(1, Ordering::SeqCst) + 1;
        if self.semaphore.available_permits() == 0 {
            tracing::warn!(queue_depth = depth, "embedding backpressure — throttling");
        }

        let wait_start = Instant::now();
        // The semaphore is never closed, so acquisition cannot fail.
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("embedding semaphore closed");

        let wait_ms = wait_start.elapsed().as_secs_f64() * 1000.0;
        let avg = {
            let mut stats = self.waits.lock();
            stats.total_ms += wait_ms;
            stats.count += 1;
            stats.total_ms / stats.count as f64
        };
        if wait_ms > WAIT_LOG_MS {
            tracing::info!(
                queue_depth = self.queue_depth.load(Ordering::SeqCst),
                wait_ms,
                wait_ms_avg = avg,
                "embedding throttle wait"
            );
        }

        let result = work().await;
        self.queue_depth.fetch_sub(1, Ordering::SeqCst);
        result
    }

    pub fn stats(&self) -> ThrottleStats {
        let waits = self.waits.lock();
        ThrottleStats {
            queue_depth: self.queue_depth.load(Ordering::SeqCst),
            wait_ms_avg: if waits.count > 0 {
                waits.total_ms / waits.count as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn at_most_two_run_concurrently() {
        let throttle = Arc::new(EmbeddingThrottle::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let throttle = Arc::clone(&throttle);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                throttle
                    .run(|| async {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn queue_depth_returns_to_zero() {
        let throttle = EmbeddingThrottle::new(2);
        throttle.run(|| async { 42 }).await;
        assert_eq!(throttle.stats().queue_depth, 0);
        assert!(throttle.stats().wait_ms_avg >= 0.0);
    }

    #[tokio::test]
    async fn returns_inner_value() {
        let throttle = EmbeddingThrottle::new(1);
        let value = throttle.run(|| async { "embedded" }).await;
        assert_eq!(value, "embedded");
    }
}
