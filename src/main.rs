use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use virtuos_lib::config::{self, AppConfig};
use virtuos_lib::errors::{VirtuosError, VirtuosResult};
use virtuos_lib::llm::registry::ProviderRegistry;
use virtuos_lib::perception::grid::GridMapper;
use virtuos_lib::shortcuts::registry::CapabilityRegistry;

#[derive(Parser, Debug)]
#[command(name = "virtuos", version, about = "Autonomous desktop agent for a VirtualBox guest.")]
struct Cli {
    /// Path to config.toml (defaults to the standard search locations).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a natural-language task against the target.
    Run {
        task: String,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Provider id from `[llm.providers]`; overrides `llm.active_provider`.
        #[arg(long)]
        provider: Option<String>,
        /// Print the full run result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate and execute one JSON action, e.g. '{"type":"click","x":46,"y":55}'.
    Act { action: String },
    /// Convert a grid cell ("C4") to pixels, or "x,y" to a grid cell.
    Grid { reference: String },
    /// List the known-location shortcuts.
    Shortcuts,
    /// List configured decision providers; the active one is starred.
    Providers,
    /// Write a config.toml with default values.
    InitConfig {
        #[arg(default_value = "config.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    virtuos_lib::init_tracing();
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> VirtuosResult<bool> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run { task, max_iterations, provider, json } => {
            let mut cfg = virtuos_lib::load_app_config(config_path, false)?;
            if let Some(n) = max_iterations {
                cfg.agent.max_iterations = n.max(1);
            }
            let result = virtuos_lib::run_task(&cfg, &task, provider.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "{:?}: {} ({} iteration(s), {} action(s), {} oracle failure(s))",
                    result.terminal,
                    result.message,
                    result.iterations_used,
                    result.actions_dispatched,
                    result.oracle_failures
                );
            }
            Ok(result.succeeded)
        }
        Command::Act { action } => {
            let cfg = virtuos_lib::load_app_config(config_path, true)?;
            let outcome = virtuos_lib::run_single_action(&cfg, &action).await?;
            println!("{}", outcome.message);
            Ok(outcome.succeeded)
        }
        Command::Grid { reference } => {
            let cfg = virtuos_lib::load_app_config(config_path, true)?;
            let grid = GridMapper::from_config(&cfg.grid);
            println!("{}", grid_lookup(&grid, &reference)?);
            Ok(true)
        }
        Command::Shortcuts => {
            let cfg = virtuos_lib::load_app_config(config_path, true)?;
            let registry = CapabilityRegistry::from_override(cfg.shortcuts.locations);
            for loc in registry.locations() {
                println!(
                    "{:<18} ({:>4}, {:>4}) {:?}  {}",
                    loc.match_key, loc.x, loc.y, loc.action_kind, loc.description
                );
            }
            Ok(true)
        }
        Command::Providers => {
            let cfg = virtuos_lib::load_app_config(config_path, true)?;
            let registry = ProviderRegistry::from_config(&cfg);
            for name in registry.list_names() {
                let marker = if name == registry.active_name() { "*" } else { " " };
                let model = cfg.llm.providers.get(&name).map(|p| p.model.as_str()).unwrap_or("");
                println!("{marker} {name:<16} {model}");
            }
            Ok(true)
        }
        Command::InitConfig { path } => {
            if path.exists() {
                return Err(VirtuosError::Config(format!(
                    "{} already exists",
                    path.display()
                )));
            }
            config::save_config(&AppConfig::default(), &path)?;
            println!("wrote {}", path.display());
            Ok(true)
        }
    }
}

fn grid_lookup(grid: &GridMapper, reference: &str) -> VirtuosResult<String> {
    if let Some((x, y)) = reference.split_once(',') {
        let parse = |v: &str| {
            v.trim()
                .parse::<i32>()
                .map_err(|_| VirtuosError::Config(format!("invalid coordinate: {v}")))
        };
        let (x, y) = (parse(x)?, parse(y)?);
        return Ok(format!("({x}, {y}) -> {}", grid.pixel_to_grid(x, y)));
    }
    grid.grid_to_pixel(reference)
        .map(|(x, y)| format!("{} -> ({x}, {y})", reference.trim().to_uppercase()))
        .ok_or_else(|| VirtuosError::Config(format!("not a grid cell: {reference}")))
}
