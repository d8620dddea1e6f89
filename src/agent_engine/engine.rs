use std::sync::Arc;

use uuid::Uuid;

use crate::agent_engine::event_bus::{ProgressBus, ProgressEvent, ProgressPhase};
use crate::agent_engine::history::RunHistory;
use crate::agent_engine::loop_control::{pause, LoopController, Pacing, StopFlag};
use crate::agent_engine::state::{Action, ActionOutcome, AgentState, RunResult, TerminalState};
use crate::config::AgentConfig;
use crate::executor::dispatcher::Dispatcher;
use crate::executor::validate;
use crate::llm::provider::DecisionOracle;
use crate::llm::types::OracleContext;
use crate::perception::grid::GridMapper;
use crate::perception::stability::ChangeDetector;
use crate::perception::traits::FrameSource;
use crate::perception::types::Frame;
use crate::shortcuts::registry::CapabilityRegistry;
use crate::shortcuts::types::KnownLocation;

/// Drives one task through perceive → decide → act → verify.
///
/// The engine itself is immutable; all per-run state lives in [`RunContext`],
/// so one engine can serve several runs one after another.
pub struct AgentEngine {
    frames: Arc<dyn FrameSource>,
    oracle: Arc<dyn DecisionOracle>,
    dispatcher: Dispatcher,
    registry: CapabilityRegistry,
    pacing: Pacing,
    max_iterations: u32,
    stagnation_threshold: u32,
    fingerprint_sample_bytes: usize,
}

impl AgentEngine {
    pub fn new(
        frames: Arc<dyn FrameSource>,
        oracle: Arc<dyn DecisionOracle>,
        dispatcher: Dispatcher,
        registry: CapabilityRegistry,
        cfg: &AgentConfig,
    ) -> Self {
        Self {
            frames,
            oracle,
            dispatcher,
            registry,
            pacing: Pacing::from_config(cfg),
            max_iterations: cfg.max_iterations.max(1),
            stagnation_threshold: cfg.stagnation_threshold,
            fingerprint_sample_bytes: cfg.fingerprint_sample_bytes,
        }
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    fn grid(&self) -> &GridMapper {
        self.dispatcher.grid()
    }

    /// Run `task` to a terminal state. Never returns an error: every failure
    /// ends up in the returned [`RunResult`].
    pub async fn run_agent(&self, task: &str, progress: &ProgressBus, stop: &StopFlag) -> RunResult {
        let mut run = RunContext::new(task, progress);
        tracing::info!(
            run_id = %run.run_id,
            task = %task,
            oracle = %self.oracle_name(),
            max_iterations = self.max_iterations,
            "run started"
        );
        run.emit(
            ProgressPhase::Start,
            format!("Starting task: {task} (max {} iterations)", self.max_iterations),
            None,
        );

        run.transition(AgentState::QuickPathCheck);
        if let Some(location) = self.registry.lookup(task).cloned() {
            return self.run_quick_path(run, &location).await;
        }

        self.run_loop(run, stop).await
    }

    async fn run_quick_path(&self, mut run: RunContext<'_>, location: &KnownLocation) -> RunResult {
        run.emit(
            ProgressPhase::Quick,
            format!("Found known location: {}", location.description),
            None,
        );
        run.transition(AgentState::QuickPathExecute);
        run.emit(ProgressPhase::Iteration, format!("Iteration 1/{}", self.max_iterations), Some(1));

        let mut detector = ChangeDetector::new(self.fingerprint_sample_bytes, self.stagnation_threshold);
        run.emit(ProgressPhase::Capture, "Taking screenshot...", Some(1));
        match self.frames.capture().await {
            Ok(frame) => {
                run.emit_frame(&frame, 1);
                detector.observe(&frame.bytes);
            }
            Err(e) => tracing::warn!(error = %e, "quick path: initial capture failed"),
        }

        let action = location.to_action();
        run.emit(
            ProgressPhase::Act,
            format!("Clicking {} at ({}, {})", location.description, location.x, location.y),
            Some(1),
        );
        let outcome = self.dispatcher.dispatch(&action).await;
        run.actions_dispatched += 1;
        run.history.record_action(
            1,
            serde_json::to_value(&action).unwrap_or_default(),
            format!("{} - {}", action.describe(), location.description),
            outcome.succeeded,
            outcome.message.clone(),
        );

        pause(self.pacing.quick_path_settle).await;

        run.emit(ProgressPhase::Capture, "Taking verification screenshot...", Some(1));
        match self.frames.capture().await {
            Ok(frame) => {
                run.emit_frame(&frame, 1);
                let report = detector.observe(&frame.bytes);
                if !report.first_frame {
                    run.history.mark_last_screen_changed(report.changed);
                }
            }
            Err(e) => tracing::warn!(error = %e, "quick path: verification capture failed"),
        }

        if outcome.succeeded {
            run.finish(
                TerminalState::Completed,
                format!("Opened {} successfully!", location.match_key),
                1,
            )
        } else {
            run.finish(
                TerminalState::Failed,
                format!("Quick action failed: {}", outcome.message),
                1,
            )
        }
    }

    async fn run_loop(&self, mut run: RunContext<'_>, stop: &StopFlag) -> RunResult {
        let mut ctrl = LoopController::new(self.max_iterations);
        let mut detector = ChangeDetector::new(self.fingerprint_sample_bytes, self.stagnation_threshold);
        let grid_info = self.grid().info();

        loop {
            if stop.is_stopped() {
                tracing::info!(iterations = ctrl.iterations_used(), "stop flag observed");
                return run.finish(
                    TerminalState::StoppedByOperator,
                    "Agent stopped by user".into(),
                    ctrl.iterations_used(),
                );
            }
            let Some(iteration) = ctrl.next_iteration() else {
                break;
            };
            run.emit(
                ProgressPhase::Iteration,
                format!("Iteration {iteration}/{}", ctrl.max_iterations()),
                Some(iteration),
            );

            // Capture
            run.transition(AgentState::Capturing);
            run.emit(ProgressPhase::Capture, "Taking screenshot...", Some(iteration));
            let frame = match self.frames.capture().await {
                Ok(frame) => {
                    run.emit_frame(&frame, iteration);
                    frame
                }
                Err(e) => {
                    tracing::error!(iteration, error = %e, "capture failed; aborting run");
                    run.emit(ProgressPhase::Error, format!("Screenshot failed: {e}"), Some(iteration));
                    return run.finish(
                        TerminalState::Failed,
                        format!("Agent error: Screenshot failed: {e}"),
                        iteration,
                    );
                }
            };

            // Detect
            run.transition(AgentState::DetectingChange);
            let report = detector.observe(&frame.bytes);
            run.history.mark_last_screen_changed(report.changed);
            if !report.changed {
                run.emit(
                    ProgressPhase::Detect,
                    format!(
                        "Screen unchanged ({}/{})",
                        report.signal.unchanged_count, self.stagnation_threshold
                    ),
                    Some(iteration),
                );
                if report.signal.threshold_reached {
                    tracing::warn!(iteration, unchanged = report.signal.unchanged_count, "screen stagnating");
                    run.emit(
                        ProgressPhase::Warning,
                        "Screen not responding to actions. Trying alternative approach...",
                        Some(iteration),
                    );
                }
            } else if !report.first_frame {
                run.emit(ProgressPhase::Detect, "Screen changed - action was effective!", Some(iteration));
            }

            // Decide
            run.transition(AgentState::Deciding);
            run.emit(ProgressPhase::Think, "AI analyzing screen...", Some(iteration));
            let decision = {
                let ctx = OracleContext {
                    history: run.history.entries(),
                    iteration,
                    max_iterations: ctrl.max_iterations(),
                    stagnation: report.signal,
                    grid: &grid_info,
                };
                self.oracle.decide(run.task, &frame, &ctx).await
            };
            let decision = match decision {
                Ok(decision) => decision,
                Err(e) if e.is_fatal() => {
                    tracing::error!(iteration, error = %e, "decision channel unavailable; aborting run");
                    run.emit(ProgressPhase::Error, format!("AI failed: {e}"), Some(iteration));
                    return run.finish(TerminalState::Failed, format!("Agent error: {e}"), iteration);
                }
                Err(e) => {
                    run.oracle_failures += 1;
                    tracing::warn!(iteration, error = %e, rate_limited = e.is_rate_limited(), "oracle call failed");
                    run.emit(ProgressPhase::Error, format!("AI failed: {e}"), Some(iteration));
                    let backoff = self.pacing.backoff_for(&e);
                    if e.is_rate_limited() {
                        run.emit(
                            ProgressPhase::Wait,
                            format!("Rate limited, waiting {} seconds...", backoff.as_secs()),
                            Some(iteration),
                        );
                    }
                    pause(backoff).await;
                    run.history.record_oracle_failure(iteration, e.to_string());
                    continue;
                }
            };
            tracing::info!(iteration, tag = ?decision.tag(), "decision received");
            if let Some(thinking) = decision.thinking.as_deref().filter(|t| !t.is_empty()) {
                run.emit(ProgressPhase::Think, thinking, Some(iteration));
            }

            // Act
            let (description, outcome) = match validate::validate(&decision.action, self.grid()) {
                Ok(Action::Done { message }) => {
                    return run.finish(TerminalState::Completed, message, iteration);
                }
                Ok(Action::Fail { message }) => {
                    return run.finish(TerminalState::Failed, message, iteration);
                }
                Ok(action) => {
                    run.transition(AgentState::Acting);
                    let description = describe_on_grid(&action, self.grid());
                    run.emit(ProgressPhase::Act, format!("Executing: {description}"), Some(iteration));
                    run.actions_dispatched += 1;
                    (description, self.dispatcher.dispatch(&action).await)
                }
                Err(e) => {
                    run.transition(AgentState::Acting);
                    tracing::warn!(iteration, error = %e, "oracle proposed an invalid action");
                    (format!("Invalid action: {e}"), ActionOutcome::failed(e.to_string()))
                }
            };

            run.history.record_action(
                iteration,
                decision.action,
                description.clone(),
                outcome.succeeded,
                outcome.message.clone(),
            );
            run.emit(
                ProgressPhase::Act,
                format!("{description}: {}", outcome.message),
                Some(iteration),
            );
            if !outcome.succeeded {
                run.emit(
                    ProgressPhase::Warning,
                    format!("Action failed: {}", outcome.message),
                    Some(iteration),
                );
            }

            run.emit(ProgressPhase::Wait, "Waiting for screen to update...", Some(iteration));
            pause(self.pacing.settle).await;
            pause(self.pacing.inter_call).await;
        }

        let used = ctrl.iterations_used();
        run.finish(
            TerminalState::TimedOut,
            format!("Reached maximum iterations ({used}). Task may be incomplete."),
            used,
        )
    }
}

/// `Click at (278, 740) [B6]`: the description plus the grid cell it lands in.
fn describe_on_grid(action: &Action, grid: &GridMapper) -> String {
    match action.anchor() {
        Some((x, y)) => format!("{} [{}]", action.describe(), grid.pixel_to_grid(x, y)),
        None => action.describe(),
    }
}

/// Mutable state of a single run.
struct RunContext<'a> {
    run_id: Uuid,
    task: &'a str,
    bus: &'a ProgressBus,
    state: AgentState,
    history: RunHistory,
    actions_dispatched: u32,
    oracle_failures: u32,
}

impl<'a> RunContext<'a> {
    fn new(task: &'a str, bus: &'a ProgressBus) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            task,
            bus,
            state: AgentState::Idle,
            history: RunHistory::new(),
            actions_dispatched: 0,
            oracle_failures: 0,
        }
    }

    fn transition(&mut self, next: AgentState) {
        if self.state != next {
            tracing::debug!(run_id = %self.run_id, from = ?self.state, to = ?next, "state transition");
            self.state = next;
        }
    }

    fn emit(&self, phase: ProgressPhase, message: impl Into<String>, iteration: Option<u32>) {
        self.bus.emit(ProgressEvent {
            run_id: self.run_id,
            phase,
            message: message.into(),
            iteration,
            screenshot: None,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Announce a captured frame, stamped with its capture time.
    fn emit_frame(&self, frame: &Frame, iteration: u32) {
        let message = match &frame.path {
            Some(path) => format!("Screenshot saved: {}", path.display()),
            None => format!("Screenshot captured ({} bytes)", frame.bytes.len()),
        };
        self.bus.emit(ProgressEvent {
            run_id: self.run_id,
            phase: ProgressPhase::Capture,
            message,
            iteration: Some(iteration),
            screenshot: frame.path.clone(),
            timestamp: frame.captured_at,
        });
    }

    fn finish(mut self, terminal: TerminalState, message: String, iterations_used: u32) -> RunResult {
        self.transition(AgentState::Terminal(terminal));
        let phase = match terminal {
            TerminalState::Completed => ProgressPhase::Complete,
            TerminalState::Failed => ProgressPhase::Failed,
            TerminalState::TimedOut => ProgressPhase::Timeout,
            TerminalState::StoppedByOperator => ProgressPhase::Stopped,
        };
        self.emit(phase, message.clone(), Some(iterations_used));

        let succeeded = terminal == TerminalState::Completed;
        tracing::info!(
            run_id = %self.run_id,
            terminal = ?terminal,
            iterations = iterations_used,
            history = self.history.len(),
            actions = self.actions_dispatched,
            oracle_failures = self.oracle_failures,
            "run finished"
        );

        RunResult {
            run_id: self.run_id,
            task: self.task.to_string(),
            succeeded,
            terminal,
            message,
            iterations_used,
            actions_dispatched: self.actions_dispatched,
            oracle_failures: self.oracle_failures,
            history: self.history.into_entries(),
        }
    }
}
