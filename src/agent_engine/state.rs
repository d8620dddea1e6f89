use serde::{Deserialize, Serialize};

use crate::agent_engine::history::HistoryEntry;

/// Lifecycle states of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "terminal", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    QuickPathCheck,
    QuickPathExecute,
    Capturing,
    DetectingChange,
    Deciding,
    Acting,
    Terminal(TerminalState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Completed,
    Failed,
    TimedOut,
    StoppedByOperator,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// X11 button number: left=1, middle=2, right=3.
    pub fn code(self) -> u8 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Middle => 2,
            MouseButton::Right => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Middle => "middle",
            MouseButton::Right => "right",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" | "primary" => Some(MouseButton::Left),
            "middle" | "secondary" => Some(MouseButton::Middle),
            "right" | "tertiary" => Some(MouseButton::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

impl ScrollDirection {
    /// Signed wheel clicks: up is positive, down is negative.
    pub fn signed(self, amount: u32) -> i32 {
        let amount = amount.min(i32::MAX as u32) as i32;
        match self {
            ScrollDirection::Up => amount,
            ScrollDirection::Down => -amount,
        }
    }
}

/// One proposed step against the target. Coordinates are target-resolution pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        x: i32,
        y: i32,
        #[serde(default)]
        button: MouseButton,
    },
    DoubleClick {
        x: i32,
        y: i32,
    },
    Move {
        x: i32,
        y: i32,
    },
    Drag {
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
    },
    Scroll {
        x: i32,
        y: i32,
        direction: ScrollDirection,
        amount: u32,
    },
    TypeText {
        text: String,
    },
    KeyPress {
        key: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        modifiers: Vec<String>,
    },
    Wait {
        duration_ms: u64,
    },
    Screenshot,
    Done {
        message: String,
    },
    Fail {
        message: String,
    },
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::DoubleClick { .. } => "double_click",
            Action::Move { .. } => "move",
            Action::Drag { .. } => "drag",
            Action::Scroll { .. } => "scroll",
            Action::TypeText { .. } => "type_text",
            Action::KeyPress { .. } => "key_press",
            Action::Wait { .. } => "wait",
            Action::Screenshot => "screenshot",
            Action::Done { .. } => "done",
            Action::Fail { .. } => "fail",
        }
    }

    /// The point a pointer action lands on, if any.
    pub fn anchor(&self) -> Option<(i32, i32)> {
        match *self {
            Action::Click { x, y, .. }
            | Action::DoubleClick { x, y }
            | Action::Move { x, y }
            | Action::Scroll { x, y, .. } => Some((x, y)),
            Action::Drag { end_x, end_y, .. } => Some((end_x, end_y)),
            _ => None,
        }
    }

    /// Human-readable one-liner used in history and progress messages.
    pub fn describe(&self) -> String {
        match self {
            Action::Click { x, y, button: MouseButton::Left } => format!("Click at ({x}, {y})"),
            Action::Click { x, y, button: MouseButton::Right } => format!("Right-click at ({x}, {y})"),
            Action::Click { x, y, button: MouseButton::Middle } => format!("Middle-click at ({x}, {y})"),
            Action::DoubleClick { x, y } => format!("Double-click at ({x}, {y})"),
            Action::Move { x, y } => format!("Move mouse to ({x}, {y})"),
            Action::Drag { start_x, start_y, end_x, end_y } => {
                format!("Drag from ({start_x}, {start_y}) to ({end_x}, {end_y})")
            }
            Action::Scroll { x, y, direction, amount } => {
                let dir = match direction {
                    ScrollDirection::Up => "up",
                    ScrollDirection::Down => "down",
                };
                format!("Scroll {dir} {amount} at ({x}, {y})")
            }
            Action::TypeText { text } => {
                let head: String = text.chars().take(30).collect();
                let ellipsis = if text.chars().count() > 30 { "..." } else { "" };
                format!("Type: \"{head}{ellipsis}\"")
            }
            Action::KeyPress { key, modifiers } => {
                if modifiers.is_empty() {
                    format!("Press key: {key}")
                } else {
                    format!("Press key: {}+{key}", modifiers.join("+"))
                }
            }
            Action::Wait { duration_ms } => format!("Wait {duration_ms}ms"),
            Action::Screenshot => "Take screenshot".into(),
            Action::Done { message } => format!("Task completed: {message}"),
            Action::Fail { message } => format!("Error: {message}"),
        }
    }
}

/// Normalized result of executing one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub succeeded: bool,
    pub message: String,
    pub is_terminal: bool,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { succeeded: true, message: message.into(), is_terminal: false }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { succeeded: false, message: message.into(), is_terminal: false }
    }

    pub fn terminal(succeeded: bool, message: impl Into<String>) -> Self {
        Self { succeeded, message: message.into(), is_terminal: true }
    }
}

/// What `run_agent` hands back once the run reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: uuid::Uuid,
    pub task: String,
    pub succeeded: bool,
    pub terminal: TerminalState,
    pub message: String,
    pub iterations_used: u32,
    /// Non-terminal actions handed to the dispatcher.
    pub actions_dispatched: u32,
    /// Oracle calls that failed; each one still consumed an iteration.
    pub oracle_failures: u32,
    pub history: Vec<HistoryEntry>,
}
