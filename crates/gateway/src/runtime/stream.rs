//! SSE stream assembly — one bounded queue, three producers, one drain.
//!
//! The orchestrator task and the heartbeat task feed the request's
//! [`EventBus`]; this module drains the queue into framed SSE events.
//! Lifecycle contract:
//! - exactly one `done` per stream (the bus enforces the guard);
//! - client disconnect emits an aborted `done` and cancels both tasks;
//! - a missing terminal is backstopped in the drain's cleanup.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::Event;
use futures_core::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use nd_domain::stream::StreamEvent;

use super::bus::{EventBus, QueueItem};
use super::orchestrator::{run_orchestration, ChatInput};
use crate::state::AppState;

/// Queue capacity: producers block (backpressure) once the client falls
/// this far behind.
const QUEUE_CAPACITY: usize = 256;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Cleans up when the stream is dropped, including an abrupt client
/// disconnect, where the generator never reaches its normal end.
struct StreamGuard {
    bus: EventBus,
    orchestrator: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if !self.bus.done_was_sent() {
            tracing::warn!("client disconnected before terminal event, emitting aborted done");
            self.bus.try_push(StreamEvent::aborted("client_disconnect"));
        }
        self.orchestrator.abort();
        self.heartbeat.abort();
        tracing::debug!("stream tasks cancelled");
    }
}

/// Build the SSE event stream for one chat request: spawn the
/// orchestration and heartbeat producers, then drain the queue.
pub fn sse_stream(
    state: AppState,
    input: ChatInput,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let (bus, rx) = EventBus::new(QUEUE_CAPACITY);

    let orchestrator = tokio::spawn(run_orchestration(state, input, bus.clone()));
    let heartbeat = tokio::spawn(heartbeat_loop(bus.clone()));

    let guard = StreamGuard {
        bus: bus.clone(),
        orchestrator,
        heartbeat,
    };

    drain(bus, rx, guard)
}

async fn heartbeat_loop(bus: EventBus) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        bus.push(StreamEvent::Ping {}).await;
    }
}

fn drain(
    bus: EventBus,
    mut rx: mpsc::Receiver<QueueItem>,
    guard: StreamGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        // Moved into the stream so dropping the stream drops the guard.
        let _guard = guard;
        let mut first_token_sent = false;

        while let Some(item) = rx.recv().await {
            match item {
                QueueItem::Event(envelope) => {
                    if !first_token_sent
                        && matches!(envelope.event, StreamEvent::Token { .. })
                    {
                        tracing::info!(seq_id = envelope.seq_id, "first token sent");
                        first_token_sent = true;
                    }
                    let kind = envelope.event.kind();
                    let data = serde_json::to_string(&envelope).unwrap_or_else(|e| {
                        tracing::error!(error = %e, "event serialization failed");
                        r#"{"error":"serialization failed"}"#.to_string()
                    });
                    yield Ok(Event::default().event(kind).data(data));

                    if envelope.event.is_done() {
                        // Tokens and status never follow the terminal.
                        break;
                    }
                }
                QueueItem::Sentinel => break,
            }
        }

        // Safety net: a stream must never end without its terminal.
        if !bus.done_was_sent() {
            tracing::warn!("development warning: stream ended without done, forcing emission");
            bus.try_push(StreamEvent::done(nd_domain::stream::DoneStatus::Ok, None));
            while let Ok(item) = rx.try_recv() {
                if let QueueItem::Event(envelope) = item {
                    let done = envelope.event.is_done();
                    let data = serde_json::to_string(&envelope).unwrap_or_default();
                    yield Ok(Event::default().event(envelope.event.kind()).data(data));
                    if done {
                        break;
                    }
                }
            }
        }
        // _guard drops here: tasks cancelled, aborted-done check runs.
    }
}
