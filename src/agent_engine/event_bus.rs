use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Start,
    Quick,
    Iteration,
    Capture,
    Detect,
    Think,
    Act,
    Wait,
    Warning,
    Error,
    Complete,
    Failed,
    Timeout,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: uuid::Uuid,
    pub phase: ProgressPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    /// Where the frame behind a `capture` event was written, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Fan-out channel for progress events. Sending never blocks the loop; events
/// are dropped when nobody is subscribed or a subscriber lags.
#[derive(Clone)]
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ProgressEvent) {
        tracing::debug!(phase = ?event.phase, iteration = ?event.iteration, message = %event.message, "progress");
        if self.tx.send(event).is_err() {
            tracing::trace!("progress event dropped: no subscribers");
        }
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain everything currently buffered on a receiver.
pub fn drain(rx: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => events.push(ev),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "progress receiver lagged");
            }
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(phase: ProgressPhase, message: &str) -> ProgressEvent {
        ProgressEvent {
            run_id: uuid::Uuid::nil(),
            phase,
            message: message.into(),
            iteration: None,
            screenshot: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_fail() {
        let bus = ProgressBus::new();
        bus.emit(event(ProgressPhase::Start, "hello"));
    }

    #[test]
    fn subscribers_receive_events_in_order() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe();
        bus.emit(event(ProgressPhase::Capture, "a"));
        bus.emit(event(ProgressPhase::Think, "b"));
        let got = drain(&mut rx);
        let phases: Vec<_> = got.iter().map(|e| e.phase).collect();
        assert_eq!(phases, vec![ProgressPhase::Capture, ProgressPhase::Think]);
    }

    #[test]
    fn phase_serializes_as_snake_case() {
        let json = serde_json::to_value(event(ProgressPhase::Timeout, "x")).unwrap();
        assert_eq!(json["phase"], "timeout");
        assert!(json.get("iteration").is_none());
        assert!(json.get("screenshot").is_none());
    }

    #[test]
    fn screenshot_path_is_serialized_when_present() {
        let mut ev = event(ProgressPhase::Capture, "saved");
        ev.screenshot = Some(PathBuf::from("screenshots/screenshot_1.png"));
        let json = serde_json::to_value(ev).unwrap();
        assert_eq!(json["screenshot"], "screenshots/screenshot_1.png");
    }
}
