pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;
pub mod shortcuts;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use crate::agent_engine::engine::AgentEngine;
use crate::agent_engine::event_bus::ProgressBus;
use crate::agent_engine::loop_control::StopFlag;
use crate::agent_engine::state::{ActionOutcome, RunResult};
use crate::config::{AppConfig, InputBackend, TargetConfig};
use crate::errors::{VirtuosError, VirtuosResult};
use crate::executor::dispatcher::Dispatcher;
use crate::executor::enigo_backend::EnigoTransport;
use crate::executor::input::DeviceEmitter;
use crate::executor::transport::{InputTransport, RecordingTransport};
use crate::executor::xdotool::XdotoolTransport;
use crate::llm::registry::ProviderRegistry;
use crate::perception::grid::GridMapper;
use crate::perception::screenshot::VBoxScreenshot;
use crate::shortcuts::registry::CapabilityRegistry;

/// Install the global tracing subscriber. `RUST_LOG` wins; default is `info`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
}

/// Explicit path, else the standard search. With `allow_missing`, a config
/// that cannot be found (but not one that fails to parse) yields defaults.
pub fn load_app_config(path: Option<&Path>, allow_missing: bool) -> VirtuosResult<AppConfig> {
    if let Some(p) = path {
        return config::load_config_from(p);
    }
    match config::resolve_config_path() {
        Ok(p) => config::load_config_from(&p),
        Err(e) if allow_missing => {
            tracing::debug!(reason = %e, "no config file; using defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e),
    }
}

pub fn build_transport(target: &TargetConfig) -> Arc<dyn InputTransport> {
    tracing::info!(backend = ?target.input_backend, "input backend selected");
    match target.input_backend {
        InputBackend::Xdotool => Arc::new(XdotoolTransport::new(
            target.xdotool_prefix.clone(),
            target.type_delay_ms,
        )),
        InputBackend::Enigo => Arc::new(EnigoTransport::new()),
        InputBackend::DryRun => Arc::new(RecordingTransport::new()),
    }
}

pub fn build_dispatcher(cfg: &AppConfig) -> Dispatcher {
    let emitter = DeviceEmitter::new(
        build_transport(&cfg.target),
        Duration::from_millis(cfg.agent.double_click_settle_ms),
    );
    Dispatcher::new(emitter, GridMapper::from_config(&cfg.grid))
        .with_max_wait(Duration::from_millis(cfg.agent.max_wait_ms))
}

/// Wire the real collaborators: VBoxManage capture, the active oracle, the
/// configured input backend and the shortcut table. `provider` overrides
/// `llm.active_provider`.
pub fn build_engine(cfg: &AppConfig, provider: Option<&str>) -> VirtuosResult<AgentEngine> {
    let mut registry = ProviderRegistry::from_config(cfg);
    if let Some(id) = provider {
        registry.set_active(id.to_string())?;
    }
    tracing::info!(provider = %registry.active_name(), "decision oracle selected");
    let oracle = registry.get_active()?;
    let frames = Arc::new(VBoxScreenshot::from_config(&cfg.target));
    let registry = CapabilityRegistry::from_override(cfg.shortcuts.locations.clone());
    Ok(AgentEngine::new(
        frames,
        oracle,
        build_dispatcher(cfg),
        registry,
        &cfg.agent,
    ))
}

/// Run one task end to end, printing progress. Ctrl-C requests a stop that
/// takes effect at the top of the next iteration.
pub async fn run_task(cfg: &AppConfig, task: &str, provider: Option<&str>) -> VirtuosResult<RunResult> {
    if task.trim().is_empty() {
        return Err(VirtuosError::Agent("task must not be empty".into()));
    }
    let engine = build_engine(cfg, provider)?;
    let progress = ProgressBus::new();
    let stop = StopFlag::new();

    let mut rx = progress.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => match ev.iteration {
                    Some(i) => println!("[{:?}] #{i} {}", ev.phase, ev.message),
                    None => println!("[{:?}] {}", ev.phase, ev.message),
                },
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "progress printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let stop_on_signal = stop.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current step");
            stop_on_signal.stop();
        }
    });

    let result = engine.run_agent(task, &progress, &stop).await;

    signal.abort();
    drop(progress);
    let _ = printer.await;
    Ok(result)
}

/// Validate and dispatch a single JSON action against the configured target.
pub async fn run_single_action(cfg: &AppConfig, raw: &str) -> VirtuosResult<ActionOutcome> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let dispatcher = build_dispatcher(cfg);
    let (_, outcome) = dispatcher.dispatch_raw(&value).await;
    Ok(outcome)
}
