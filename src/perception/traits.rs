use async_trait::async_trait;

use crate::errors::CaptureError;
use crate::perception::types::Frame;

/// Source of fresh frames from the target. Implementations must not cache.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<Frame, CaptureError>;
}
