use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cadence_action::InMemoryCatalog;
use cadence_config::{Task, TaskState};
use cadence_engine::{EngineConfig, TaskEngine, TriggerEvent};

/// Cadence - run event-driven tasks against an action catalog
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.cadence)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Engine config file (default: <data-dir>/engine.json when present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Process one trigger event for a task, reading the payload from stdin
  Run {
    /// Path to the task file (JSON)
    task_file: PathBuf,

    /// Local id of the trigger that fired
    #[arg(long)]
    trigger: String,

    /// Action catalog (default: <data-dir>/catalog.json when present)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// State file, read before the run and rewritten after it
    #[arg(long)]
    state: Option<PathBuf>,
  },

  /// Statically validate a task file
  Validate {
    /// Path to the task file (JSON)
    task_file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".cadence"),
  };

  match cli.command {
    Some(Commands::Run {
      task_file,
      trigger,
      catalog,
      state,
    }) => {
      let config = load_engine_config(cli.config.as_deref(), &data_dir)?;
      let catalog = catalog.unwrap_or_else(|| data_dir.join("catalog.json"));
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_task(task_file, trigger, catalog, state, config))?;
    }
    Some(Commands::Validate { task_file }) => {
      let task = read_task(&task_file)?;
      task
        .validate()
        .with_context(|| format!("task '{}' is invalid", task.task_id))?;
      println!("task '{}' is valid", task.task_id);
    }
    None => {
      println!("cadence - use --help to see available commands");
    }
  }

  Ok(())
}

async fn run_task(
  task_file: PathBuf,
  trigger: String,
  catalog_file: PathBuf,
  state_file: Option<PathBuf>,
  config: EngineConfig,
) -> Result<()> {
  let task = read_task(&task_file)?;
  info!(task_id = %task.task_id, task_name = %task.name, "loaded task");

  let state = match &state_file {
    Some(path) if path.exists() => read_state(path)?,
    _ => task.current_state(),
  };

  let catalog = if catalog_file.exists() {
    InMemoryCatalog::load(&catalog_file)
      .with_context(|| format!("failed to load catalog: {}", catalog_file.display()))?
  } else {
    InMemoryCatalog::new()
  };
  info!(actions = catalog.len(), "loaded action catalog");

  let payload = read_payload_from_stdin()?;

  let engine = TaskEngine::with_catalog(Arc::new(catalog), config);
  let outcome = engine
    .process(
      &task,
      state,
      TriggerEvent::new(trigger, payload),
      CancellationToken::new(),
    )
    .await;

  if let Some(path) = &state_file {
    let json = serde_json::to_string_pretty(&outcome.state)?;
    std::fs::write(path, json)
      .with_context(|| format!("failed to write state file: {}", path.display()))?;
  }

  println!("{}", serde_json::to_string_pretty(&outcome)?);
  Ok(())
}

/// Explicit config file, else `<data-dir>/engine.json` if it exists, else
/// defaults.
fn load_engine_config(explicit: Option<&Path>, data_dir: &Path) -> Result<EngineConfig> {
  let path = match explicit {
    Some(path) => path.to_path_buf(),
    None => {
      let path = data_dir.join("engine.json");
      if !path.exists() {
        return Ok(EngineConfig::default());
      }
      path
    }
  };

  let content = std::fs::read_to_string(&path)
    .with_context(|| format!("failed to read engine config: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse engine config: {}", path.display()))
}

fn read_task(path: &Path) -> Result<Task> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read task file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse task file: {}", path.display()))
}

fn read_state(path: &Path) -> Result<TaskState> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read state file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse state file: {}", path.display()))
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
  }
}
