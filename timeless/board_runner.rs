// timeless/board_runner.rs
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use timeless::{BoardConfig, RunnerEvent, RunnerSession, SqliteStore};

/// Runner display: prints the current headline and price board whenever they change.
#[derive(Parser, Debug)]
#[clap(author, version, about = "The Timeless runner display")]
struct CliArgs {
  /// JSON configuration file
  #[clap(long)]
  config: Option<PathBuf>,

  /// Board database (overrides the config file)
  #[clap(long)]
  db_path: Option<PathBuf>,

  /// IANA timezone for local time labels (overrides the config file)
  #[clap(long)]
  tz: Option<String>,

  /// Refresh interval in milliseconds (overrides the config file)
  #[clap(long)]
  refresh_ms: Option<u64>,

  /// Print a single frame and exit
  #[clap(long)]
  once: bool,
}

fn resolve_config(args: &CliArgs) -> Result<BoardConfig> {
  let mut config = BoardConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
  if let Some(path) = &args.db_path {
    config.db_path = path.clone();
  }
  if let Some(tz) = &args.tz {
    config.display_timezone = tz.clone();
  }
  if let Some(ms) = args.refresh_ms {
    config.refresh_interval = Duration::from_millis(ms);
  }
  config.validate().context("Invalid configuration")?;
  Ok(config)
}

fn main() -> Result<()> {
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
  let args = CliArgs::parse();
  let config = resolve_config(&args)?;

  info!("Starting runner display (timeless {})", timeless::VERSION);
  info!("Reading board from: {:?}", config.db_path);
  let store = SqliteStore::open(&config.db_path)
    .with_context(|| format!("Failed to open board database {:?}", config.db_path))?;
  let mut session = RunnerSession::start(store, &config).context("Failed to start runner session")?;

  if args.once {
    print!("{}", session.current_view(Utc::now()).render());
    session.close()?;
    return Ok(());
  }

  for event in session.events().iter() {
    match event {
      RunnerEvent::ViewUpdate { view, timestamp } => {
        info!("View updated at {}", timestamp);
        println!("\n{}", "=".repeat(64));
        print!("{}", view.render());
      }
      RunnerEvent::Error { error, .. } => {
        error!("Board store error: {}", error);
      }
      RunnerEvent::Closed { .. } => {
        warn!("Runner session closed.");
        break;
      }
    }
  }
  Ok(())
}
