// board_scenarios.rs
// Use it like this:
// board_scenarios list
// board_scenarios run schedule-applies
// board_scenarios run all --db-dir /tmp/board-scenarios
// Look for "Scenario registration" below for available scenarios.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use timeless::{DocumentStore, MemoryStore, SqliteStore};

mod test_news;
mod test_runner;
mod test_stocks;

// --- Scenario Definition Infrastructure ---

// Every scenario gets a fresh, empty store.
type ScenarioFn = fn(store: Arc<dyn DocumentStore>) -> Result<()>;

#[derive(Debug, Clone)]
pub struct ScenarioDefinition {
  pub name: &'static str,
  pub func: ScenarioFn,
}

inventory::collect!(ScenarioDefinition);

static SCENARIO_REGISTRY: Lazy<BTreeMap<&'static str, &'static ScenarioDefinition>> = Lazy::new(|| {
  inventory::iter::<ScenarioDefinition>
    .into_iter()
    .map(|def| (def.name, def))
    .collect()
});

// --- CLI Argument Parsing ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs end-to-end board scenarios", long_about = None)]
struct Args {
  #[clap(subcommand)]
  command: Command,
}

#[derive(Parser, Debug)]
enum Command {
  /// List registered scenarios.
  List,
  /// Run one scenario by name, or "all".
  Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
  /// Scenario name (e.g., news-selection) or "all".
  #[arg()]
  scenario_or_all: String,

  /// Run against SQLite files in this directory (one `<scenario>.db` each, recreated per
  /// run) instead of an in-memory store.
  #[arg(long)]
  db_dir: Option<PathBuf>,
}

// --- Scenario Registration ---
inventory::submit! { ScenarioDefinition { name: "news-provision", func: test_news::provision_impl } }
inventory::submit! { ScenarioDefinition { name: "news-selection", func: test_news::selection_impl } }
inventory::submit! { ScenarioDefinition { name: "news-clear", func: test_news::clear_impl } }
inventory::submit! { ScenarioDefinition { name: "stock-lifecycle", func: test_stocks::lifecycle_impl } }
inventory::submit! { ScenarioDefinition { name: "schedule-applies", func: test_stocks::schedule_applies_impl } }
inventory::submit! { ScenarioDefinition { name: "board-filter", func: test_stocks::board_filter_impl } }
inventory::submit! { ScenarioDefinition { name: "runner-push", func: test_runner::push_impl } }
inventory::submit! { ScenarioDefinition { name: "runner-tick", func: test_runner::tick_impl } }

// --- Helper Functions ---

fn create_store(db_dir: Option<&Path>, scenario: &str) -> Result<Arc<dyn DocumentStore>> {
  let Some(dir) = db_dir else {
    return Ok(MemoryStore::new());
  };
  std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {:?}", dir))?;
  let path = dir.join(format!("{}.db", scenario));
  for suffix in ["", "-wal", "-shm"] {
    let file = PathBuf::from(format!("{}{}", path.display(), suffix));
    if file.exists() {
      std::fs::remove_file(&file).with_context(|| format!("Failed to remove stale {:?}", file))?;
    }
  }
  info!("Using SQLite store at {:?}", path);
  let store = SqliteStore::open(&path).with_context(|| format!("Failed to open {:?}", path))?;
  Ok(store)
}

fn run_one(def: &ScenarioDefinition, db_dir: Option<&Path>) -> bool {
  info!("===== Running Scenario: {} =====", def.name);
  let result = create_store(db_dir, def.name).and_then(|store| (def.func)(store));
  match result {
    Ok(()) => {
      info!("Scenario PASSED: {}", def.name);
      true
    }
    Err(e) => {
      error!("Scenario FAILED: {}: {:#}", def.name, e);
      false
    }
  }
}

// --- Main Execution Logic ---

fn main() -> Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  Lazy::force(&SCENARIO_REGISTRY);

  let args = Args::parse();
  let run_args = match args.command {
    Command::List => {
      for name in SCENARIO_REGISTRY.keys() {
        println!("{}", name);
      }
      return Ok(());
    }
    Command::Run(r) => r,
  };

  let selected: Vec<&'static ScenarioDefinition> = if run_args.scenario_or_all.eq_ignore_ascii_case("all") {
    SCENARIO_REGISTRY.values().copied().collect()
  } else {
    match SCENARIO_REGISTRY.get(run_args.scenario_or_all.as_str()) {
      Some(def) => vec![*def],
      None => {
        return Err(anyhow!(
          "Unknown scenario: '{}'. Available scenarios: {:?}",
          run_args.scenario_or_all,
          SCENARIO_REGISTRY.keys().collect::<Vec<_>>()
        ))
      }
    }
  };
  if selected.is_empty() {
    warn!("No scenarios registered.");
    return Ok(());
  }

  let mut failed = Vec::new();
  for def in &selected {
    if !run_one(def, run_args.db_dir.as_deref()) {
      failed.push(def.name);
    }
  }

  if failed.is_empty() {
    info!("Overall Result: PASSED ({} scenarios)", selected.len());
    Ok(())
  } else {
    Err(anyhow!("{} of {} scenarios FAILED: {:?}", failed.len(), selected.len(), failed))
  }
}
