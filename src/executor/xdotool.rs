use async_trait::async_trait;
use tokio::process::Command;

use crate::agent_engine::state::MouseButton;
use crate::errors::DeviceError;
use crate::executor::keymap::Key;
use crate::executor::transport::{ButtonAction, InputTransport, KeyDirection};

const WHEEL_UP: &str = "4";
const WHEEL_DOWN: &str = "5";
const DOUBLE_CLICK_GAP_MS: u32 = 80;

/// Drives the target through `xdotool`. The argv prefix decides where it runs:
/// `["xdotool"]` for a local display, `["ssh", "vm", "xdotool"]` or a
/// `VBoxManage guestcontrol ... -- xdotool` invocation for a guest.
pub struct XdotoolTransport {
    prefix: Vec<String>,
    type_delay_ms: u64,
}

impl XdotoolTransport {
    pub fn new(prefix: Vec<String>, type_delay_ms: u64) -> Self {
        let prefix = if prefix.is_empty() {
            vec!["xdotool".to_string()]
        } else {
            prefix
        };
        Self { prefix, type_delay_ms }
    }

    /// Full argv for one xdotool sub-command.
    pub fn command_line<I, S>(&self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix
            .iter()
            .cloned()
            .chain(args.into_iter().map(Into::into))
            .collect()
    }

    async fn run(&self, argv: Vec<String>) -> Result<(), DeviceError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(DeviceError::Spawn("empty command line".into()));
        };
        tracing::debug!(program = %program, args = ?args, "xdotool");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| DeviceError::Spawn(format!("{program}: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DeviceError::Transport(format!(
                "{} exited with {}: {}",
                args.first().map(String::as_str).unwrap_or(program),
                output.status,
                stderr.trim()
            )))
        }
    }

    pub fn button_args(button: MouseButton, action: ButtonAction) -> Vec<String> {
        let code = button.code().to_string();
        match action {
            ButtonAction::Press => vec!["mousedown".into(), code],
            ButtonAction::Release => vec!["mouseup".into(), code],
            ButtonAction::Click => vec!["click".into(), code],
            ButtonAction::DoubleClick => vec![
                "click".into(),
                "--repeat".into(),
                "2".into(),
                "--delay".into(),
                DOUBLE_CLICK_GAP_MS.to_string(),
                code,
            ],
        }
    }

    pub fn scroll_args(clicks: i32) -> Vec<String> {
        let wheel = if clicks > 0 { WHEEL_UP } else { WHEEL_DOWN };
        vec![
            "click".into(),
            "--repeat".into(),
            clicks.unsigned_abs().to_string(),
            wheel.into(),
        ]
    }
}

#[async_trait]
impl InputTransport for XdotoolTransport {
    fn name(&self) -> &str {
        "xdotool"
    }

    async fn move_to(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.run(self.command_line(["mousemove".to_string(), x.to_string(), y.to_string()]))
            .await
    }

    async fn button(&self, button: MouseButton, action: ButtonAction) -> Result<(), DeviceError> {
        self.run(self.command_line(Self::button_args(button, action))).await
    }

    async fn scroll(&self, clicks: i32) -> Result<(), DeviceError> {
        if clicks == 0 {
            return Ok(());
        }
        self.run(self.command_line(Self::scroll_args(clicks))).await
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        self.run(self.command_line([
            "type".to_string(),
            "--delay".to_string(),
            self.type_delay_ms.to_string(),
            "--".to_string(),
            text.to_string(),
        ]))
        .await
    }

    async fn key(&self, key: Key, direction: KeyDirection) -> Result<(), DeviceError> {
        let verb = match direction {
            KeyDirection::Down => "keydown",
            KeyDirection::Up => "keyup",
        };
        self.run(self.command_line([verb.to_string(), key.keysym()])).await
    }
}
