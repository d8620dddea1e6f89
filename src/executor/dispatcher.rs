use std::time::Duration;

use serde_json::Value;

use crate::agent_engine::state::{Action, ActionOutcome};
use crate::errors::DeviceError;
use crate::executor::input::DeviceEmitter;
use crate::executor::keymap;
use crate::executor::validate;
use crate::perception::grid::GridMapper;

/// Upper bound on a single `wait` action unless configured otherwise.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(10_000);

/// Validates actions and routes them to the device emitter.
///
/// Never returns an error: malformed actions, unknown tags and device
/// failures all come back as an unsuccessful [`ActionOutcome`].
pub struct Dispatcher {
    emitter: DeviceEmitter,
    grid: GridMapper,
    max_wait: Duration,
}

impl Dispatcher {
    pub fn new(emitter: DeviceEmitter, grid: GridMapper) -> Self {
        Self { emitter, grid, max_wait: DEFAULT_MAX_WAIT }
    }

    /// Cap applied to oracle-proposed waits. The stop flag is only polled
    /// between iterations, so this bounds how long a stop request can lag.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn grid(&self) -> &GridMapper {
        &self.grid
    }

    pub fn transport_name(&self) -> &str {
        self.emitter.transport_name()
    }

    /// Validate an oracle-proposed JSON action, then dispatch it.
    /// The typed action is returned when validation passed.
    pub async fn dispatch_raw(&self, raw: &Value) -> (Option<Action>, ActionOutcome) {
        match validate::validate(raw, &self.grid) {
            Ok(action) => {
                let outcome = self.dispatch(&action).await;
                (Some(action), outcome)
            }
            Err(e) => {
                tracing::warn!(error = %e, "action rejected before dispatch");
                (None, ActionOutcome::failed(e.to_string()))
            }
        }
    }

    pub async fn dispatch(&self, action: &Action) -> ActionOutcome {
        if let Err(e) = validate::check(action) {
            return ActionOutcome::failed(e.to_string());
        }
        tracing::info!(action = %action.describe(), transport = %self.transport_name(), "dispatching");

        let result = match action {
            Action::Done { message } => return ActionOutcome::terminal(true, message.clone()),
            Action::Fail { message } => return ActionOutcome::terminal(false, message.clone()),
            Action::Screenshot => {
                return ActionOutcome::ok("Screenshot requested; the next iteration captures a fresh frame")
            }
            Action::Wait { duration_ms } => Ok(self.wait(*duration_ms).await),
            Action::Click { x, y, button } => self.emitter.click_at(*x, *y, *button).await,
            Action::DoubleClick { x, y } => self.emitter.double_click_at(*x, *y).await,
            Action::Move { x, y } => self.emitter.move_to(*x, *y).await,
            Action::Drag { start_x, start_y, end_x, end_y } => {
                self.emitter.drag_from(*start_x, *start_y, *end_x, *end_y).await
            }
            Action::Scroll { x, y, direction, amount } => {
                self.emitter.scroll_at(*x, *y, direction.signed(*amount)).await
            }
            Action::TypeText { text } => self.emitter.type_string(text).await,
            Action::KeyPress { key, modifiers } => self.press(key, modifiers).await,
        };

        match result {
            Ok(message) => ActionOutcome::ok(message),
            Err(e) => {
                tracing::warn!(action = %action.describe(), error = %e, "device action failed");
                ActionOutcome::failed(format!("{} failed: {e}", action.describe()))
            }
        }
    }

    async fn wait(&self, requested_ms: u64) -> String {
        let requested = Duration::from_millis(requested_ms);
        if requested <= self.max_wait {
            tokio::time::sleep(requested).await;
            return format!("Waited {requested_ms}ms");
        }
        let capped_ms = self.max_wait.as_millis() as u64;
        tracing::warn!(requested_ms, capped_ms, "wait exceeds the configured maximum; capping");
        tokio::time::sleep(self.max_wait).await;
        format!("Waited {capped_ms}ms (capped from {requested_ms}ms)")
    }

    /// Explicit modifiers come first, then any found in a `+`-joined key.
    /// A lone uppercase letter is sent as shift plus the letter.
    async fn press(&self, key: &str, modifiers: &[String]) -> Result<String, DeviceError> {
        let (embedded, key) = split_combo(key);
        let mut mods: Vec<String> = modifiers.to_vec();
        for m in embedded {
            if !mods.contains(&m) {
                mods.push(m);
            }
        }

        if !mods.is_empty() {
            return self.emitter.press_combo(&mods, &key).await;
        }
        match shifted_letter(&key) {
            Some(lower) => self.emitter.press_combo(&["shift".to_string()], &lower).await,
            None => self.emitter.press_key(&key).await,
        }
    }
}

fn shifted_letter(key: &str) -> Option<String> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Some(c.to_ascii_lowercase().to_string()),
        _ => None,
    }
}

/// Split `"ctrl+shift+t"` into `(["ctrl", "shift"], "t")`.
///
/// A lone `"+"` is the plus key, and a trailing `"++"` means the last key is
/// `+` itself. Leading parts are always treated as modifiers so that a
/// non-modifier in that position fails loudly at key lookup.
pub fn split_combo(spec: &str) -> (Vec<String>, String) {
    let trimmed = spec.trim();
    if trimmed == "+" || !trimmed.contains('+') {
        return (Vec::new(), trimmed.to_string());
    }

    let (body, plus_key) = match trimmed.strip_suffix("++") {
        Some(body) => (body, true),
        None => (trimmed, false),
    };
    let mut parts: Vec<&str> = body
        .split('+')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let key = if plus_key {
        "+".to_string()
    } else {
        parts.pop().unwrap_or_default().to_string()
    };
    let modifiers = parts
        .into_iter()
        .map(|p| {
            if !keymap::is_modifier_name(p) {
                tracing::debug!(part = %p, "combo part is not a known modifier");
            }
            p.to_ascii_lowercase()
        })
        .collect();
    (modifiers, key)
}
