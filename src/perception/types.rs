use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One captured frame of the target, PNG-encoded.
#[derive(Debug, Clone)]
pub struct Frame {
    pub path: Option<PathBuf>,
    pub bytes: Vec<u8>,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl Frame {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            path: None,
            bytes,
            captured_at: chrono::Utc::now(),
        }
    }
}

/// Cheap equality-only digest of a frame's leading bytes. Not a perceptual hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameFingerprint(pub i32);

/// What the oracle is told about repeated identical frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagnationSignal {
    pub screen_unchanged: bool,
    pub unchanged_count: u32,
    pub threshold_reached: bool,
}
