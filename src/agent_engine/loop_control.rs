use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::errors::OracleError;

/// Operator stop signal. Set from anywhere, polled at the top of each iteration.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Iteration budget. Every loop pass consumes one slot, including failed oracle calls.
pub struct LoopController {
    max_iterations: u32,
    iteration: u32,
}

impl LoopController {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            iteration: 0,
        }
    }

    /// Claims the next iteration slot, or `None` once the cap is spent.
    pub fn next_iteration(&mut self) -> Option<u32> {
        if self.iteration >= self.max_iterations {
            return None;
        }
        self.iteration += 1;
        Some(self.iteration)
    }

    pub fn iterations_used(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }
}

/// Sleep-based pacing against the rate-limited oracle and a slow-to-settle target.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub settle: Duration,
    pub inter_call: Duration,
    pub rate_limit_backoff: Duration,
    pub error_backoff: Duration,
    pub quick_path_settle: Duration,
}

impl Pacing {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self {
            settle: Duration::from_millis(cfg.settle_delay_ms),
            inter_call: Duration::from_millis(cfg.inter_call_delay_ms),
            rate_limit_backoff: Duration::from_millis(cfg.rate_limit_backoff_ms),
            error_backoff: Duration::from_millis(cfg.error_backoff_ms),
            quick_path_settle: Duration::from_millis(cfg.quick_path_settle_ms),
        }
    }

    pub fn backoff_for(&self, err: &OracleError) -> Duration {
        if err.is_rate_limited() {
            self.rate_limit_backoff
        } else {
            self.error_backoff
        }
    }
}

pub async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_hands_out_exactly_max_slots() {
        let mut ctrl = LoopController::new(3);
        assert_eq!(ctrl.next_iteration(), Some(1));
        assert_eq!(ctrl.next_iteration(), Some(2));
        assert_eq!(ctrl.next_iteration(), Some(3));
        assert_eq!(ctrl.next_iteration(), None);
        assert_eq!(ctrl.iterations_used(), 3);
    }

    #[test]
    fn stop_flag_is_shared_between_clones() {
        let flag = StopFlag::new();
        let remote = flag.clone();
        assert!(!flag.is_stopped());
        remote.stop();
        assert!(flag.is_stopped());
    }

    #[test]
    fn rate_limit_gets_the_longer_backoff() {
        let pacing = Pacing::from_config(&AgentConfig::default());
        assert_eq!(
            pacing.backoff_for(&OracleError::RateLimited("429".into())),
            Duration::from_secs(10)
        );
        assert_eq!(
            pacing.backoff_for(&OracleError::MalformedResponse("?".into())),
            Duration::from_secs(2)
        );
    }
}
