//! The per-request event bus — the single ordering point of a stream.
//!
//! Every producer (orchestrator, token path, heartbeat) pushes through
//! one bus; sequence numbers are stamped at enqueue under one atomic
//! counter, so the SSE generator never has to reorder anything. The
//! terminal guard lives here too: exactly one `done` per stream, no
//! matter how many paths try to emit one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use nd_domain::stream::{DoneStatus, Envelope, StreamEvent};

/// One slot on the stream queue.
#[derive(Debug)]
pub enum QueueItem {
    Event(Envelope),
    /// End-of-stream marker enqueued after the terminal event.
    Sentinel,
}

/// Bounded, sequence-stamping event queue.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<QueueItem>,
    seq: Arc<AtomicU64>,
    done_sent: Arc<AtomicBool>,
}

impl EventBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueueItem>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                seq: Arc::new(AtomicU64::new(0)),
                done_sent: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    fn stamp(&self, event: StreamEvent) -> Envelope {
        Envelope {
            seq_id: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            ts: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            event,
        }
    }

    /// Enqueue an event, waiting for queue capacity. A second `done` is
    /// silently dropped; the terminal contract is exactly-one.
    pub async fn push(&self, event: StreamEvent) {
        if event.is_done() && self.done_sent.swap(true, Ordering::SeqCst) {
            tracing::warn!("suppressed duplicate done event");
            return;
        }
        let envelope = self.stamp(event);
        if self.tx.send(QueueItem::Event(envelope)).await.is_err() {
            tracing::debug!("event dropped, stream receiver gone");
        }
    }

    /// Non-blocking push for synchronous contexts (drop guards). Events
    /// that do not fit or find the receiver gone are dropped.
    pub fn try_push(&self, event: StreamEvent) {
        if event.is_done() && self.done_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let envelope = self.stamp(event);
        let _ = self.tx.try_send(QueueItem::Event(envelope));
    }

    /// Convenience: terminal event.
    pub async fn push_done(&self, status: DoneStatus, message: Option<String>) {
        self.push(StreamEvent::done(status, message)).await;
    }

    /// Convenience: status event.
    pub async fn push_status(&self, phase: &str, message: &str, duration_ms: Option<u64>) {
        self.push(StreamEvent::Status {
            phase: phase.to_string(),
            message: message.to_string(),
            duration_ms,
        })
        .await;
    }

    /// Enqueue the end-of-stream marker.
    pub async fn sentinel(&self) {
        let _ = self.tx.send(QueueItem::Sentinel).await;
    }

    pub fn done_was_sent(&self) -> bool {
        self.done_sent.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_ids_strictly_increase() {
        let (bus, mut rx) = EventBus::new(16);
        for _ in 0..5 {
            bus.push(StreamEvent::Ping {}).await;
        }
        let mut last = 0;
        for _ in 0..5 {
            match rx.recv().await.unwrap() {
                QueueItem::Event(env) => {
                    assert!(env.seq_id > last);
                    last = env.seq_id;
                }
                QueueItem::Sentinel => panic!("unexpected sentinel"),
            }
        }
    }

    #[tokio::test]
    async fn exactly_one_done_passes_the_guard() {
        let (bus, mut rx) = EventBus::new(16);
        bus.push_done(DoneStatus::Ok, None).await;
        bus.push_done(DoneStatus::Failed, None).await;
        bus.try_push(StreamEvent::aborted("client_disconnect"));
        bus.sentinel().await;

        let mut done_count = 0;
        while let Some(item) = rx.recv().await {
            match item {
                QueueItem::Event(env) if env.event.is_done() => done_count += 1,
                QueueItem::Event(_) => {}
                QueueItem::Sentinel => break,
            }
        }
        assert_eq!(done_count, 1);
        assert!(bus.done_was_sent());
    }

    #[tokio::test]
    async fn push_after_receiver_drop_does_not_panic() {
        let (bus, rx) = EventBus::new(4);
        drop(rx);
        bus.push(StreamEvent::Ping {}).await;
        bus.try_push(StreamEvent::Ping {});
    }
}
