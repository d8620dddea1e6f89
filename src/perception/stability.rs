use crate::perception::types::{FrameFingerprint, StagnationSignal};

/// Rolling `h * 31 + b` hash over the first `sample_len` bytes of an encoded frame.
///
/// Only the prefix is read, so a change that lands entirely past it (or is
/// too small to alter the encoder's output there) goes unnoticed. Equality is
/// the only meaningful comparison between two fingerprints.
pub fn fingerprint(frame: &[u8], sample_len: usize) -> FrameFingerprint {
    let sample = &frame[..frame.len().min(sample_len)];
    let hash = sample.iter().fold(0i32, |h, &b| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(b as i32)
    });
    FrameFingerprint(hash)
}

/// Consecutive-unchanged-frame counter.
#[derive(Debug, Clone, Copy)]
pub struct StagnationCounter {
    pub consecutive_unchanged: u32,
    pub threshold: u32,
}

impl StagnationCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_unchanged: 0,
            threshold,
        }
    }

    pub fn bump(&mut self) {
        self.consecutive_unchanged = self.consecutive_unchanged.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.consecutive_unchanged = 0;
    }

    pub fn threshold_reached(&self) -> bool {
        self.threshold > 0 && self.consecutive_unchanged >= self.threshold
    }

    pub fn signal(&self) -> StagnationSignal {
        StagnationSignal {
            screen_unchanged: self.consecutive_unchanged > 0,
            unchanged_count: self.consecutive_unchanged,
            threshold_reached: self.threshold_reached(),
        }
    }
}

/// Result of feeding one frame to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeReport {
    pub fingerprint: FrameFingerprint,
    /// True on the first frame, since there is nothing to compare against.
    pub changed: bool,
    pub first_frame: bool,
    pub signal: StagnationSignal,
}

pub struct ChangeDetector {
    sample_len: usize,
    last: Option<FrameFingerprint>,
    counter: StagnationCounter,
}

impl ChangeDetector {
    pub fn new(sample_len: usize, threshold: u32) -> Self {
        Self {
            sample_len,
            last: None,
            counter: StagnationCounter::new(threshold),
        }
    }

    pub fn observe(&mut self, frame: &[u8]) -> ChangeReport {
        let current = fingerprint(frame, self.sample_len);
        let first_frame = self.last.is_none();
        let changed = self.last != Some(current);

        if changed {
            self.counter.reset();
        } else {
            self.counter.bump();
        }
        self.last = Some(current);

        tracing::debug!(
            fingerprint = current.0,
            changed,
            unchanged = self.counter.consecutive_unchanged,
            "frame fingerprinted"
        );

        ChangeReport {
            fingerprint: current,
            changed,
            first_frame,
            signal: self.counter.signal(),
        }
    }
}
