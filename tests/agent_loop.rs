use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use virtuos_lib::agent_engine::engine::AgentEngine;
use virtuos_lib::agent_engine::event_bus::{drain, ProgressBus, ProgressPhase};
use virtuos_lib::agent_engine::loop_control::StopFlag;
use virtuos_lib::agent_engine::state::{MouseButton, TerminalState};
use virtuos_lib::config::AgentConfig;
use virtuos_lib::errors::{CaptureError, OracleError};
use virtuos_lib::executor::dispatcher::Dispatcher;
use virtuos_lib::executor::input::DeviceEmitter;
use virtuos_lib::executor::transport::{ButtonAction, InputEvent, RecordingTransport};
use virtuos_lib::llm::provider::DecisionOracle;
use virtuos_lib::llm::types::{Decision, OracleContext};
use virtuos_lib::perception::grid::GridMapper;
use virtuos_lib::perception::traits::FrameSource;
use virtuos_lib::perception::types::{Frame, StagnationSignal};
use virtuos_lib::shortcuts::registry::CapabilityRegistry;

/// Hands out the scripted frames in order, then repeats the last one.
struct ScriptedFrames {
    frames: Vec<Vec<u8>>,
    fail_on_call: Option<u32>,
    calls: AtomicU32,
}

impl ScriptedFrames {
    fn constant() -> Self {
        Self::sequence(vec![vec![7; 64]])
    }

    fn sequence(frames: Vec<Vec<u8>>) -> Self {
        Self { frames, fail_on_call: None, calls: AtomicU32::new(0) }
    }

    fn changing() -> Self {
        Self::sequence((0u8..32).map(|i| vec![i; 64]).collect())
    }

    fn failing_on(call: u32) -> Self {
        Self { fail_on_call: Some(call), ..Self::constant() }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for ScriptedFrames {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(CaptureError::Command("VBoxManage exited with 1".into()));
        }
        let idx = (call as usize - 1).min(self.frames.len() - 1);
        let mut frame = Frame::from_bytes(self.frames[idx].clone());
        frame.path = Some(shot_path(call));
        Ok(frame)
    }
}

#[derive(Debug, Clone)]
struct SeenContext {
    iteration: u32,
    max_iterations: u32,
    history_len: usize,
    stagnation: StagnationSignal,
}

/// Replays scripted replies, then keeps proposing a short wait.
struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<Decision, OracleError>>>,
    seen: Mutex<Vec<SeenContext>>,
    stop_on_call: Option<(u32, StopFlag)>,
}

impl ScriptedOracle {
    fn new(replies: Vec<Result<Decision, OracleError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
            stop_on_call: None,
        }
    }

    fn stopping_on(call: u32, stop: StopFlag) -> Self {
        Self { stop_on_call: Some((call, stop)), ..Self::new(Vec::new()) }
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn seen(&self) -> Vec<SeenContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(
        &self,
        _task: &str,
        _frame: &Frame,
        ctx: &OracleContext<'_>,
    ) -> Result<Decision, OracleError> {
        let call = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(SeenContext {
                iteration: ctx.iteration,
                max_iterations: ctx.max_iterations,
                history_len: ctx.history.len(),
                stagnation: ctx.stagnation,
            });
            seen.len() as u32
        };
        if let Some((n, stop)) = &self.stop_on_call {
            if *n == call {
                stop.stop();
            }
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(action(json!({"type": "wait", "duration_ms": 10}))))
    }
}

fn shot_path(call: u32) -> PathBuf {
    PathBuf::from(format!("screenshots/screenshot_{call}.png"))
}

fn action(value: serde_json::Value) -> Decision {
    Decision { thinking: Some("scripted".into()), action: value }
}

struct Harness {
    frames: Arc<ScriptedFrames>,
    oracle: Arc<ScriptedOracle>,
    transport: Arc<RecordingTransport>,
    engine: AgentEngine,
}

fn harness(frames: ScriptedFrames, oracle: ScriptedOracle, registry: CapabilityRegistry, cfg: AgentConfig) -> Harness {
    let frames = Arc::new(frames);
    let oracle = Arc::new(oracle);
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = Dispatcher::new(
        DeviceEmitter::new(transport.clone(), Duration::ZERO),
        GridMapper::default(),
    );
    let engine = AgentEngine::new(frames.clone(), oracle.clone(), dispatcher, registry, &cfg);
    Harness { frames, oracle, transport, engine }
}

#[tokio::test(start_paused = true)]
async fn known_location_runs_quick_path_without_oracle() {
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(Vec::new()),
        CapabilityRegistry::builtin(),
        AgentConfig::default(),
    );

    let result = h.engine.run_agent("open terminal", &ProgressBus::new(), &StopFlag::new()).await;

    assert!(result.succeeded);
    assert_eq!(result.terminal, TerminalState::Completed);
    assert_eq!(result.iterations_used, 1);
    assert_eq!(result.actions_dispatched, 1);
    assert_eq!(result.message, "Opened terminal successfully!");
    assert_eq!(h.oracle.calls(), 0);
    assert_eq!(
        h.transport.events(),
        vec![
            InputEvent::Move { x: 278, y: 740 },
            InputEvent::Button { button: MouseButton::Left, action: ButtonAction::Click },
        ]
    );
    assert_eq!(result.history.len(), 1);
    assert!(result.history[0].screen_changed);
    // One observability frame plus one verification frame.
    assert_eq!(h.frames.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn quick_path_device_failure_ends_failed() {
    let h = harness(
        ScriptedFrames::constant(),
        ScriptedOracle::new(Vec::new()),
        CapabilityRegistry::builtin(),
        AgentConfig::default(),
    );
    h.transport.fail_on(InputEvent::Move { x: 278, y: 740 });

    let result = h.engine.run_agent("Open Konsole", &ProgressBus::new(), &StopFlag::new()).await;

    assert!(!result.succeeded);
    assert_eq!(result.terminal, TerminalState::Failed);
    assert_eq!(result.iterations_used, 1);
    assert_eq!(h.oracle.calls(), 0);
    assert!(!result.history[0].succeeded);
}

#[tokio::test(start_paused = true)]
async fn rate_limits_back_off_then_dispatch() {
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(vec![
            Err(OracleError::RateLimited("429".into())),
            Err(OracleError::RateLimited("429".into())),
            Ok(action(json!({"type": "click", "x": 46, "y": 55}))),
            Ok(action(json!({"type": "done", "message": "VLC is open"}))),
        ]),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );

    let start = tokio::time::Instant::now();
    let result = h.engine.run_agent("launch the video app", &ProgressBus::new(), &StopFlag::new()).await;

    assert!(start.elapsed() >= Duration::from_secs(20));
    assert!(result.succeeded);
    assert_eq!(result.message, "VLC is open");
    assert_eq!(result.oracle_failures, 2);
    assert_eq!(result.actions_dispatched, 1);
    // Failed oracle calls still consume iterations.
    assert_eq!(result.iterations_used, 4);

    let history = &result.history;
    assert_eq!(history.len(), 3);
    assert!(!history[0].succeeded && history[0].action.is_none());
    assert!(!history[1].succeeded && history[1].action.is_none());
    assert!(history[0].description.starts_with("Error: rate limited"));
    assert!(history[2].succeeded);
    assert_eq!(history[2].iteration, 3);
    assert_eq!(
        h.transport.events(),
        vec![
            InputEvent::Move { x: 46, y: 55 },
            InputEvent::Button { button: MouseButton::Left, action: ButtonAction::Click },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn done_on_third_iteration() {
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(vec![
            Ok(action(json!({"type": "click", "x": 30, "y": 740}))),
            Ok(action(json!({"type": "type", "text": "firefox"}))),
            Ok(action(json!({"type": "done", "message": "App is open"}))),
        ]),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );

    let result = h.engine.run_agent("launch firefox", &ProgressBus::new(), &StopFlag::new()).await;

    assert!(result.succeeded);
    assert_eq!(result.iterations_used, 3);
    assert_eq!(result.message, "App is open");
    assert_eq!(result.actions_dispatched, 2);
    assert_eq!(result.history.len(), 2);
    assert_eq!(result.history[0].description, "Click at (30, 740) [A6]");
    assert_eq!(result.history[1].description, "Type: \"firefox\"");
    // Each entry learns about the screen change one iteration later.
    assert!(result.history.iter().all(|e| e.screen_changed));
    assert_eq!(h.oracle.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn oracle_fail_ends_failed() {
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(vec![Ok(action(json!({"type": "error", "message": "No such app"})))]),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );

    let result = h.engine.run_agent("launch photoshop", &ProgressBus::new(), &StopFlag::new()).await;

    assert!(!result.succeeded);
    assert_eq!(result.terminal, TerminalState::Failed);
    assert_eq!(result.message, "No such app");
    assert_eq!(result.iterations_used, 1);
    assert!(h.transport.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_flag_is_honoured_before_the_next_iteration() {
    let stop = StopFlag::new();
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::stopping_on(3, stop.clone()),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );

    let result = h.engine.run_agent("do something long", &ProgressBus::new(), &stop).await;

    assert_eq!(result.terminal, TerminalState::StoppedByOperator);
    assert!(!result.succeeded);
    assert_eq!(result.iterations_used, 3);
    assert_eq!(h.oracle.calls(), 3);
    assert_eq!(h.frames.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn stop_before_start_skips_all_io() {
    let stop = StopFlag::new();
    stop.stop();
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(Vec::new()),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );

    let result = h.engine.run_agent("anything", &ProgressBus::new(), &stop).await;

    assert_eq!(result.terminal, TerminalState::StoppedByOperator);
    assert_eq!(result.iterations_used, 0);
    assert_eq!(h.frames.calls(), 0);
    assert_eq!(h.oracle.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn iteration_cap_times_out() {
    let cfg = AgentConfig { max_iterations: 2, ..AgentConfig::default() };
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(Vec::new()),
        CapabilityRegistry::empty(),
        cfg,
    );

    let result = h.engine.run_agent("never finishes", &ProgressBus::new(), &StopFlag::new()).await;

    assert_eq!(result.terminal, TerminalState::TimedOut);
    assert!(!result.succeeded);
    assert_eq!(result.iterations_used, 2);
    assert_eq!(result.message, "Reached maximum iterations (2). Task may be incomplete.");
    let seen = h.oracle.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|c| c.max_iterations == 2));
}

#[tokio::test(start_paused = true)]
async fn capture_failure_is_fatal() {
    let h = harness(
        ScriptedFrames::failing_on(1),
        ScriptedOracle::new(Vec::new()),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );

    let result = h.engine.run_agent("open a browser window", &ProgressBus::new(), &StopFlag::new()).await;

    assert_eq!(result.terminal, TerminalState::Failed);
    assert!(result.message.starts_with("Agent error: Screenshot failed"));
    assert_eq!(result.iterations_used, 1);
    assert_eq!(h.oracle.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unavailable_oracle_aborts_the_run() {
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(vec![Err(OracleError::Unavailable("no API key".into()))]),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );

    let result = h.engine.run_agent("anything", &ProgressBus::new(), &StopFlag::new()).await;

    assert_eq!(result.terminal, TerminalState::Failed);
    assert_eq!(result.iterations_used, 1);
    assert_eq!(result.oracle_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn stagnation_signal_reaches_the_oracle() {
    let cfg = AgentConfig { max_iterations: 5, ..AgentConfig::default() };
    let h = harness(
        ScriptedFrames::constant(),
        ScriptedOracle::new(Vec::new()),
        CapabilityRegistry::empty(),
        cfg,
    );
    let bus = ProgressBus::new();
    let mut rx = bus.subscribe();

    let result = h.engine.run_agent("click the invisible button", &bus, &StopFlag::new()).await;

    let seen = h.oracle.seen();
    let counts: Vec<u32> = seen.iter().map(|c| c.stagnation.unchanged_count).collect();
    assert_eq!(counts, vec![0, 1, 2, 3, 4]);
    assert!(!seen[0].stagnation.screen_unchanged);
    assert!(seen[1].stagnation.screen_unchanged);
    assert!(!seen[2].stagnation.threshold_reached);
    assert!(seen[3].stagnation.threshold_reached);
    assert_eq!(seen.iter().map(|c| c.history_len).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    assert_eq!(seen.iter().map(|c| c.iteration).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);

    // Stagnation alone never ends the run.
    assert_eq!(result.terminal, TerminalState::TimedOut);
    assert!(result.history[..4].iter().all(|e| !e.screen_changed));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| e.phase == ProgressPhase::Warning && e.message.contains("not responding")));
}

#[tokio::test(start_paused = true)]
async fn invalid_actions_are_recorded_and_the_loop_continues() {
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(vec![
            Ok(action(json!({"type": "click", "x": "left", "y": 10}))),
            Ok(action(json!({"type": "teleport"}))),
            Ok(action(json!({"type": "done"}))),
        ]),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );

    let result = h.engine.run_agent("anything", &ProgressBus::new(), &StopFlag::new()).await;

    assert!(result.succeeded);
    assert_eq!(result.message, "Task completed successfully");
    assert_eq!(result.history.len(), 2);
    assert!(!result.history[0].succeeded);
    assert!(result.history[0].outcome_message.contains('x'));
    assert!(result.history[1].outcome_message.contains("teleport"));
    assert_eq!(result.actions_dispatched, 0);
    assert!(h.transport.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn progress_events_trace_the_run() {
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(vec![
            Ok(action(json!({"type": "key_press", "key": "ctrl+alt+t"}))),
            Ok(action(json!({"type": "done", "message": "Terminal open"}))),
        ]),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );
    let bus = ProgressBus::new();
    let mut rx = bus.subscribe();

    let result = h.engine.run_agent("anything", &bus, &StopFlag::new()).await;
    let events = drain(&mut rx);

    assert!(events.iter().all(|e| e.run_id == result.run_id));
    assert_eq!(events.first().map(|e| e.phase), Some(ProgressPhase::Start));
    assert_eq!(events.last().map(|e| e.phase), Some(ProgressPhase::Complete));
    for phase in [
        ProgressPhase::Iteration,
        ProgressPhase::Capture,
        ProgressPhase::Think,
        ProgressPhase::Act,
        ProgressPhase::Wait,
        ProgressPhase::Detect,
    ] {
        assert!(events.iter().any(|e| e.phase == phase), "missing {phase:?}");
    }
    assert_eq!(h.transport.events().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn oracle_is_consulted_before_any_terminal_state() {
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(vec![Ok(action(json!({"type": "done"})))]),
        CapabilityRegistry::builtin(),
        AgentConfig::default(),
    );

    let result = h.engine.run_agent("write a haiku in the text editor", &ProgressBus::new(), &StopFlag::new()).await;

    assert!(result.succeeded);
    assert_eq!(h.oracle.calls(), 1);
    assert_eq!(result.actions_dispatched, 0);
}

#[tokio::test(start_paused = true)]
async fn oversized_wait_cannot_delay_a_stop_request() {
    let stop = StopFlag::new();
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle {
            stop_on_call: Some((1, stop.clone())),
            ..ScriptedOracle::new(vec![Ok(action(json!({"type": "wait", "duration_ms": 864_000_000u64})))])
        },
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );

    let start = tokio::time::Instant::now();
    let result = h.engine.run_agent("wait for the installer", &ProgressBus::new(), &stop).await;

    assert_eq!(result.terminal, TerminalState::StoppedByOperator);
    assert_eq!(result.iterations_used, 1);
    // Capped wait, then the settle and inter-call pauses.
    assert!(start.elapsed() <= Duration::from_secs(10 + 2 + 12 + 1));
    assert_eq!(result.history[0].outcome_message, "Waited 10000ms (capped from 864000000ms)");
}

#[tokio::test(start_paused = true)]
async fn every_capture_announces_its_screenshot() {
    let h = harness(
        ScriptedFrames::changing(),
        ScriptedOracle::new(vec![
            Ok(action(json!({"type": "move", "x": 10, "y": 10}))),
            Ok(action(json!({"type": "done"}))),
        ]),
        CapabilityRegistry::empty(),
        AgentConfig::default(),
    );
    let bus = ProgressBus::new();
    let mut rx = bus.subscribe();

    h.engine.run_agent("anything", &bus, &StopFlag::new()).await;

    let shots: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| e.screenshot.is_some())
        .collect();
    assert_eq!(shots.len(), 2);
    for (i, ev) in shots.iter().enumerate() {
        let call = i as u32 + 1;
        assert_eq!(ev.phase, ProgressPhase::Capture);
        assert_eq!(ev.iteration, Some(call));
        assert_eq!(ev.screenshot, Some(shot_path(call)));
        assert_eq!(
            ev.message,
            format!("Screenshot saved: {}", shot_path(call).display())
        );
    }
}
