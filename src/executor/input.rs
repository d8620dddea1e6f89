use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::state::MouseButton;
use crate::errors::DeviceError;
use crate::executor::keymap::{self, Key};
use crate::executor::transport::{ButtonAction, InputTransport, KeyDirection};

/// Turns pointer/keyboard intents into transport primitives.
///
/// Every operation either succeeds with a human-readable message or fails as
/// a whole; there is no partial success. Coordinates are passed through
/// untouched: callers supply target-resolution pixels.
#[derive(Clone)]
pub struct DeviceEmitter {
    transport: Arc<dyn InputTransport>,
    double_click_settle: Duration,
}

impl DeviceEmitter {
    pub fn new(transport: Arc<dyn InputTransport>, double_click_settle: Duration) -> Self {
        Self {
            transport,
            double_click_settle,
        }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub async fn move_to(&self, x: i32, y: i32) -> Result<String, DeviceError> {
        self.transport.move_to(x, y).await?;
        Ok(format!("Moved mouse to ({x}, {y})"))
    }

    pub async fn click_at(&self, x: i32, y: i32, button: MouseButton) -> Result<String, DeviceError> {
        self.transport.move_to(x, y).await?;
        self.transport.button(button, ButtonAction::Click).await?;
        Ok(format!("Clicked {} at ({x}, {y})", button.as_str()))
    }

    /// Move, settle briefly, then a single double-click gesture.
    pub async fn double_click_at(&self, x: i32, y: i32) -> Result<String, DeviceError> {
        self.transport.move_to(x, y).await?;
        if !self.double_click_settle.is_zero() {
            tokio::time::sleep(self.double_click_settle).await;
        }
        self.transport
            .button(MouseButton::Left, ButtonAction::DoubleClick)
            .await?;
        Ok(format!("Double-clicked at ({x}, {y})"))
    }

    /// Press at the start, move, release at the end. The button is released
    /// even if the move fails.
    pub async fn drag_from(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<String, DeviceError> {
        self.transport.move_to(x1, y1).await?;
        self.transport.button(MouseButton::Left, ButtonAction::Press).await?;
        let moved = self.transport.move_to(x2, y2).await;
        let released = self.transport.button(MouseButton::Left, ButtonAction::Release).await;
        moved?;
        released?;
        Ok(format!("Dragged from ({x1}, {y1}) to ({x2}, {y2})"))
    }

    /// Positive clicks scroll up, negative down.
    pub async fn scroll_at(&self, x: i32, y: i32, clicks: i32) -> Result<String, DeviceError> {
        self.transport.move_to(x, y).await?;
        self.transport.scroll(clicks).await?;
        let dir = if clicks >= 0 { "up" } else { "down" };
        Ok(format!("Scrolled {dir} {} at ({x}, {y})", clicks.unsigned_abs()))
    }

    /// An empty string is a successful no-op.
    pub async fn type_string(&self, text: &str) -> Result<String, DeviceError> {
        if text.is_empty() {
            return Ok("Nothing to type".into());
        }
        self.transport.type_text(text).await?;
        Ok(format!("Typed {} characters", text.chars().count()))
    }

    /// Press and release one named key. Named shortcuts ("copy") expand to combos.
    pub async fn press_key(&self, name: &str) -> Result<String, DeviceError> {
        if let Some((mods, key)) = keymap::lookup_combo(name) {
            self.emit_combo(&mods, key).await?;
            return Ok(format!("Pressed {name}"));
        }
        let key = keymap::lookup_key(name)?;
        self.transport.key(key, KeyDirection::Down).await?;
        self.transport.key(key, KeyDirection::Up).await?;
        Ok(format!("Pressed {}", key.keysym()))
    }

    /// Hold `modifiers` in order, tap `key`, release modifiers in reverse.
    /// All names are resolved before the first event is sent.
    pub async fn press_combo(&self, modifiers: &[String], key: &str) -> Result<String, DeviceError> {
        let mods = modifiers
            .iter()
            .map(|m| keymap::lookup_modifier(m))
            .collect::<Result<Vec<_>, _>>()?;
        let key = keymap::lookup_key(key)?;
        self.emit_combo(&mods, key).await?;

        let label = mods
            .iter()
            .map(|m| m.keysym())
            .chain(std::iter::once(key.keysym()))
            .collect::<Vec<_>>()
            .join("+");
        Ok(format!("Pressed {label}"))
    }

    async fn emit_combo(&self, mods: &[Key], key: Key) -> Result<(), DeviceError> {
        let mut held: Vec<Key> = Vec::with_capacity(mods.len());
        let mut result: Result<(), DeviceError> = Ok(());

        for &m in mods {
            match self.transport.key(m, KeyDirection::Down).await {
                Ok(()) => held.push(m),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        if result.is_ok() {
            result = match self.transport.key(key, KeyDirection::Down).await {
                Ok(()) => self.transport.key(key, KeyDirection::Up).await,
                Err(e) => Err(e),
            };
        }

        // Best-effort cleanup: release whatever was acquired, newest first.
        for &m in held.iter().rev() {
            if let Err(e) = self.transport.key(m, KeyDirection::Up).await {
                tracing::warn!(key = %m.keysym(), error = %e, "modifier release failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::transport::{InputEvent, RecordingTransport};

    fn emitter() -> (Arc<RecordingTransport>, DeviceEmitter) {
        let transport = Arc::new(RecordingTransport::new());
        let emitter = DeviceEmitter::new(transport.clone(), Duration::ZERO);
        (transport, emitter)
    }

    fn key(key: Key, direction: KeyDirection) -> InputEvent {
        InputEvent::Key { key, direction }
    }

    #[tokio::test]
    async fn combo_orders_presses_and_releases() {
        let (t, e) = emitter();
        let msg = e
            .press_combo(&["ctrl".into(), "shift".into()], "t")
            .await
            .unwrap();
        assert_eq!(msg, "Pressed ctrl+shift+t");
        assert_eq!(
            t.events(),
            vec![
                key(Key::Ctrl, KeyDirection::Down),
                key(Key::Shift, KeyDirection::Down),
                key(Key::Char('t'), KeyDirection::Down),
                key(Key::Char('t'), KeyDirection::Up),
                key(Key::Shift, KeyDirection::Up),
                key(Key::Ctrl, KeyDirection::Up),
            ]
        );
    }

    #[tokio::test]
    async fn failed_key_still_releases_held_modifiers() {
        let (t, e) = emitter();
        t.fail_on(key(Key::Char('c'), KeyDirection::Down));
        let err = e.press_combo(&["ctrl".into()], "c").await.unwrap_err();
        assert!(matches!(err, DeviceError::Transport(_)));
        assert_eq!(
            t.events(),
            vec![
                key(Key::Ctrl, KeyDirection::Down),
                key(Key::Char('c'), KeyDirection::Down),
                key(Key::Ctrl, KeyDirection::Up),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_names_fail_before_any_event() {
        let (t, e) = emitter();
        assert_eq!(
            e.press_key("warp").await.unwrap_err(),
            DeviceError::UnknownKey("warp".into())
        );
        assert!(e.press_combo(&["hyper".into()], "a").await.is_err());
        assert!(e.press_combo(&["enter".into()], "a").await.is_err());
        assert!(t.events().is_empty());
    }

    #[tokio::test]
    async fn named_shortcut_expands_to_combo() {
        let (t, e) = emitter();
        e.press_key("paste").await.unwrap();
        assert_eq!(t.events().len(), 4);
        assert_eq!(t.events()[0], key(Key::Ctrl, KeyDirection::Down));
    }

    #[tokio::test]
    async fn double_click_is_a_single_gesture() {
        let (t, e) = emitter();
        e.double_click_at(10, 20).await.unwrap();
        assert_eq!(
            t.events(),
            vec![
                InputEvent::Move { x: 10, y: 20 },
                InputEvent::Button { button: MouseButton::Left, action: ButtonAction::DoubleClick },
            ]
        );
    }

    #[tokio::test]
    async fn drag_releases_even_when_move_fails() {
        let (t, e) = emitter();
        t.fail_on(InputEvent::Move { x: 50, y: 60 });
        assert!(e.drag_from(1, 2, 50, 60).await.is_err());
        assert_eq!(
            t.events().last(),
            Some(&InputEvent::Button { button: MouseButton::Left, action: ButtonAction::Release })
        );
    }

    #[tokio::test]
    async fn empty_text_sends_nothing() {
        let (t, e) = emitter();
        assert_eq!(e.type_string("").await.unwrap(), "Nothing to type");
        assert!(t.events().is_empty());
    }

    #[tokio::test]
    async fn click_message_names_button() {
        let (_, e) = emitter();
        assert_eq!(
            e.click_at(278, 740, MouseButton::Right).await.unwrap(),
            "Clicked right at (278, 740)"
        );
    }
}
