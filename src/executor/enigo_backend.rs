use async_trait::async_trait;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};

use crate::agent_engine::state::MouseButton;
use crate::errors::DeviceError;
use crate::executor::keymap::Key;
use crate::executor::transport::{ButtonAction, InputTransport, KeyDirection};

/// Local input through enigo, for a target whose display is the host's own
/// (e.g. a VM window in fullscreen). Every call runs on a blocking thread.
#[derive(Default)]
pub struct EnigoTransport;

impl EnigoTransport {
    pub fn new() -> Self {
        Self
    }
}

async fn with_enigo<F>(op: F) -> Result<(), DeviceError>
where
    F: FnOnce(&mut Enigo) -> Result<(), enigo::InputError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| DeviceError::Transport(format!("enigo connect: {e}")))?;
        op(&mut enigo).map_err(|e| DeviceError::Transport(e.to_string()))
    })
    .await
    .map_err(|e| DeviceError::Transport(format!("join: {e}")))?
}

fn to_enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Middle => Button::Middle,
        MouseButton::Right => Button::Right,
    }
}

fn to_enigo_key(key: Key) -> Result<enigo::Key, DeviceError> {
    use enigo::Key as K;
    let mapped = match key {
        Key::Enter => K::Return,
        Key::Escape => K::Escape,
        Key::Tab => K::Tab,
        Key::Backspace => K::Backspace,
        Key::Space => K::Space,
        Key::Delete => K::Delete,
        Key::Home => K::Home,
        Key::End => K::End,
        Key::PageUp => K::PageUp,
        Key::PageDown => K::PageDown,
        Key::Up => K::UpArrow,
        Key::Down => K::DownArrow,
        Key::Left => K::LeftArrow,
        Key::Right => K::RightArrow,
        Key::CapsLock => K::CapsLock,
        Key::Ctrl => K::Control,
        Key::Shift => K::Shift,
        Key::Alt => K::Alt,
        Key::Super => K::Meta,
        Key::F(1) => K::F1,
        Key::F(2) => K::F2,
        Key::F(3) => K::F3,
        Key::F(4) => K::F4,
        Key::F(5) => K::F5,
        Key::F(6) => K::F6,
        Key::F(7) => K::F7,
        Key::F(8) => K::F8,
        Key::F(9) => K::F9,
        Key::F(10) => K::F10,
        Key::F(11) => K::F11,
        Key::F(12) => K::F12,
        Key::Char(c) => K::Unicode(c),
        other => {
            return Err(DeviceError::UnknownKey(format!(
                "{} (not supported by the enigo backend)",
                other.keysym()
            )))
        }
    };
    Ok(mapped)
}

#[async_trait]
impl InputTransport for EnigoTransport {
    fn name(&self) -> &str {
        "enigo"
    }

    async fn move_to(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        with_enigo(move |e| e.move_mouse(x, y, Coordinate::Abs)).await
    }

    async fn button(&self, button: MouseButton, action: ButtonAction) -> Result<(), DeviceError> {
        let b = to_enigo_button(button);
        with_enigo(move |e| match action {
            ButtonAction::Press => e.button(b, Direction::Press),
            ButtonAction::Release => e.button(b, Direction::Release),
            ButtonAction::Click => e.button(b, Direction::Click),
            // Both clicks go out from one connection, back to back.
            ButtonAction::DoubleClick => {
                e.button(b, Direction::Click)?;
                e.button(b, Direction::Click)
            }
        })
        .await
    }

    async fn scroll(&self, clicks: i32) -> Result<(), DeviceError> {
        if clicks == 0 {
            return Ok(());
        }
        // enigo scrolls down for positive lengths.
        with_enigo(move |e| e.scroll(-clicks, Axis::Vertical)).await
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        let text = text.to_string();
        with_enigo(move |e| e.text(&text)).await
    }

    async fn key(&self, key: Key, direction: KeyDirection) -> Result<(), DeviceError> {
        let k = to_enigo_key(key)?;
        let dir = match direction {
            KeyDirection::Down => Direction::Press,
            KeyDirection::Up => Direction::Release,
        };
        with_enigo(move |e| e.key(k, dir)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_without_enigo_equivalent_are_rejected() {
        assert!(matches!(to_enigo_key(Key::Insert), Err(DeviceError::UnknownKey(_))));
        assert!(matches!(to_enigo_key(Key::F(4)), Ok(enigo::Key::F4)));
        assert!(matches!(to_enigo_key(Key::Super), Ok(enigo::Key::Meta)));
    }
}
