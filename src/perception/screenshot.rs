use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::TargetConfig;
use crate::errors::CaptureError;
use crate::perception::traits::FrameSource;
use crate::perception::types::Frame;

/// Captures the VM display through `VBoxManage controlvm <vm> screenshotpng`.
pub struct VBoxScreenshot {
    vboxmanage: String,
    vm_name: String,
    dir: PathBuf,
}

impl VBoxScreenshot {
    pub fn new(vboxmanage: String, vm_name: String, dir: PathBuf) -> Self {
        Self { vboxmanage, vm_name, dir }
    }

    pub fn from_config(cfg: &TargetConfig) -> Self {
        Self::new(cfg.vboxmanage.clone(), cfg.vm_name.clone(), cfg.screenshot_dir.clone())
    }

    fn next_path(&self) -> PathBuf {
        let ts = chrono::Utc::now().timestamp_millis();
        self.dir.join(format!("screenshot_{ts}.png"))
    }
}

#[async_trait]
impl FrameSource for VBoxScreenshot {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| CaptureError::Read {
            path: self.dir.display().to_string(),
            reason: e.to_string(),
        })?;

        // VBoxManage resolves relative paths against its own cwd, so hand it an absolute one.
        let path = std::path::absolute(self.next_path()).map_err(|e| CaptureError::Read {
            path: self.dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let output = Command::new(&self.vboxmanage)
            .args(["controlvm", &self.vm_name, "screenshotpng"])
            .arg(&path)
            .output()
            .await
            .map_err(|e| CaptureError::Command(format!("{}: {e}", self.vboxmanage)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Command(format!(
                "screenshotpng exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&path).await.map_err(|e| CaptureError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Err(CaptureError::Empty);
        }

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "frame captured");
        let mut frame = Frame::from_bytes(bytes);
        frame.path = Some(path);
        Ok(frame)
    }
}
