use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent_engine::state::MouseButton;
use crate::errors::DeviceError;
use crate::executor::keymap::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Press,
    Release,
    Click,
    /// A true double-click gesture, not two separate clicks.
    DoubleClick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

/// Primitive input commands accepted by a remote target.
/// Each call is fire-and-forget with a success/failure acknowledgment.
#[async_trait]
pub trait InputTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn move_to(&self, x: i32, y: i32) -> Result<(), DeviceError>;

    async fn button(&self, button: MouseButton, action: ButtonAction) -> Result<(), DeviceError>;

    /// Positive clicks scroll up, negative scroll down.
    async fn scroll(&self, clicks: i32) -> Result<(), DeviceError>;

    async fn type_text(&self, text: &str) -> Result<(), DeviceError>;

    async fn key(&self, key: Key, direction: KeyDirection) -> Result<(), DeviceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Move { x: i32, y: i32 },
    Button { button: MouseButton, action: ButtonAction },
    Scroll { clicks: i32 },
    Type { text: String },
    Key { key: Key, direction: KeyDirection },
}

/// Logs and records every event without touching a real target.
/// Backs the dry-run mode; `fail_on` makes a matching event fail.
#[derive(Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<InputEvent>>,
    fail_on: Mutex<Option<InputEvent>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, event: InputEvent) {
        if let Ok(mut slot) = self.fail_on.lock() {
            *slot = Some(event);
        }
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn record(&self, event: InputEvent) -> Result<(), DeviceError> {
        tracing::info!(?event, "dry-run input");
        let should_fail = self
            .fail_on
            .lock()
            .map(|slot| slot.as_ref() == Some(&event))
            .unwrap_or(false);
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        if should_fail {
            return Err(DeviceError::Transport(format!("injected failure on {event:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl InputTransport for RecordingTransport {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn move_to(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.record(InputEvent::Move { x, y })
    }

    async fn button(&self, button: MouseButton, action: ButtonAction) -> Result<(), DeviceError> {
        self.record(InputEvent::Button { button, action })
    }

    async fn scroll(&self, clicks: i32) -> Result<(), DeviceError> {
        self.record(InputEvent::Scroll { clicks })
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        self.record(InputEvent::Type { text: text.to_string() })
    }

    async fn key(&self, key: Key, direction: KeyDirection) -> Result<(), DeviceError> {
        self.record(InputEvent::Key { key, direction })
    }
}
