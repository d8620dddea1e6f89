use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{VirtuosError, VirtuosResult};
use crate::shortcuts::types::KnownLocation;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub shortcuts: ShortcutsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            active_provider: String::new(),
            providers: HashMap::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    /// Vision-capable model name sent to the API.
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var VIRTUOS_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_temperature() -> f64 {
    0.1
}

fn default_request_timeout() -> u64 {
    60
}

/// Loop bounds and pacing. All delays are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: u32,
    /// Wait after each dispatched action so the remote UI can settle.
    pub settle_delay_ms: u64,
    /// Extra wait between oracle calls to stay under its request-rate budget.
    pub inter_call_delay_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub error_backoff_ms: u64,
    pub quick_path_settle_ms: u64,
    /// Consecutive unchanged frames before the oracle is warned.
    pub stagnation_threshold: u32,
    /// Bytes of the encoded frame fed to the fingerprint.
    pub fingerprint_sample_bytes: usize,
    pub double_click_settle_ms: u64,
    /// Longest `wait` the oracle may request; longer ones are capped.
    pub max_wait_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            settle_delay_ms: 2000,
            inter_call_delay_ms: 12000,
            rate_limit_backoff_ms: 10000,
            error_backoff_ms: 2000,
            quick_path_settle_ms: 2000,
            stagnation_threshold: 3,
            fingerprint_sample_bytes: 7500,
            double_click_settle_ms: 50,
            max_wait_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputBackend {
    Xdotool,
    Enigo,
    /// Log input events instead of sending them.
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub vm_name: String,
    pub vboxmanage: String,
    pub screenshot_dir: PathBuf,
    pub input_backend: InputBackend,
    /// argv used to launch xdotool, e.g. `["ssh", "vm", "xdotool"]`.
    /// Empty means a plain local `xdotool`.
    pub xdotool_prefix: Vec<String>,
    pub type_delay_ms: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            vm_name: "Arch Linux".into(),
            vboxmanage: default_vboxmanage(),
            screenshot_dir: PathBuf::from("screenshots"),
            input_backend: InputBackend::Xdotool,
            xdotool_prefix: Vec::new(),
            type_delay_ms: 12,
        }
    }
}

fn default_vboxmanage() -> String {
    if cfg!(target_os = "windows") {
        r"C:\Program Files\Oracle\VirtualBox\VBoxManage.exe".into()
    } else {
        "VBoxManage".into()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    pub cols: u32,
    pub rows: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
            cols: 12,
            rows: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShortcutsConfig {
    /// Replaces the built-in table when present. Order is match priority.
    #[serde(default)]
    pub locations: Option<Vec<KnownLocation>>,
}

/// First existing `config.toml`: next to the executable, working directory,
/// then the user config dir.
pub fn resolve_config_path() -> VirtuosResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("virtuos").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(VirtuosError::Config(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

/// Loads `config.toml` from the standard search locations.
pub fn load_config() -> VirtuosResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> VirtuosResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    if let Ok(vbox) = std::env::var("VBOX_PATH") {
        config.target.vboxmanage = vbox;
    }
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

pub fn parse_config(content: &str) -> VirtuosResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if config.agent.max_iterations == 0 {
        return Err(VirtuosError::Config("agent.max_iterations must be at least 1".into()));
    }
    if config.grid.cols == 0 || config.grid.rows == 0 || config.grid.cols > 26 {
        return Err(VirtuosError::Config(
            "grid.cols must be 1..=26 and grid.rows at least 1".into(),
        ));
    }
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> VirtuosResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
