// timeless/board_admin.rs
// Use it like this:
// board_admin init
// board_admin news set n2 --headline "Rates hold" --publish-at 2024-06-01T09:30
// board_admin stock set acme --delta 5 --scheduled-delta 20 --apply-at 2024-06-01T10:00

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use timeless::{
  instrument::ScheduleState,
  time_value::{from_input_value, input_value_of, to_input_value},
  view::{admin_preview, format_pct, format_price},
  BoardConfig, BoardManager, SlotId, SqliteStore, TimeValue, resolve_instrument,
};

/// Admin console for the news slots and the price board.
#[derive(Parser, Debug)]
#[command(author, version, about = "The Timeless admin console", long_about = None)]
struct Args {
  /// JSON configuration file
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Board database (overrides the config file)
  #[arg(long, global = true)]
  db_path: Option<PathBuf>,

  /// IANA timezone for editor times (overrides the config file)
  #[arg(long, global = true)]
  tz: Option<String>,

  #[clap(subcommand)]
  command: Command,
}

#[derive(Parser, Debug)]
enum Command {
  /// Create the five news slots if they do not exist yet.
  Init,
  /// News slot operations.
  #[clap(subcommand)]
  News(NewsCommand),
  /// Instrument operations.
  #[clap(subcommand)]
  Stock(StockCommand),
}

#[derive(Parser, Debug)]
enum NewsCommand {
  /// Show all five slots.
  Show,
  /// Edit one slot. Omitted options keep their current value.
  Set(NewsSetArgs),
  /// Blank a slot's headline, body and publish time.
  Clear {
    /// Slot (n1..n5)
    slot: String,
  },
  /// Show which headline the runner is displaying now.
  Preview,
}

#[derive(Parser, Debug)]
struct NewsSetArgs {
  /// Slot (n1..n5)
  slot: String,
  #[arg(long)]
  headline: Option<String>,
  #[arg(long)]
  body: Option<String>,
  /// Local time as YYYY-MM-DDTHH:MM; an empty value unschedules the slot
  #[arg(long)]
  publish_at: Option<String>,
}

#[derive(Parser, Debug)]
enum StockCommand {
  /// List every instrument, published or not.
  List,
  /// Add an instrument with default values.
  Add {
    /// Document id; generated when omitted
    id: Option<String>,
  },
  /// Edit an instrument. Omitted options keep their current value.
  Set(StockSetArgs),
  /// Delete an instrument.
  Rm {
    id: String,
  },
}

#[derive(Parser, Debug)]
struct StockSetArgs {
  id: String,
  #[arg(long)]
  name: Option<String>,
  #[arg(long)]
  description: Option<String>,
  /// Display-only sector label; an empty value removes it
  #[arg(long)]
  sector: Option<String>,
  #[arg(long)]
  base_price: Option<f64>,
  /// Current delta in percent
  #[arg(long, allow_hyphen_values = true)]
  delta: Option<f64>,
  #[arg(long)]
  order: Option<i64>,
  #[arg(long)]
  published: Option<bool>,
  /// Delta in percent applied from --apply-at on
  #[arg(long, allow_hyphen_values = true)]
  scheduled_delta: Option<f64>,
  /// Local time as YYYY-MM-DDTHH:MM
  #[arg(long)]
  apply_at: Option<String>,
  /// Remove the scheduled delta and its time
  #[arg(long, conflicts_with_all = ["scheduled_delta", "apply_at"])]
  clear_schedule: bool,
}

fn resolve_config(args: &Args) -> Result<BoardConfig> {
  let mut config = BoardConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
  if let Some(path) = &args.db_path {
    config.db_path = path.clone();
  }
  if let Some(tz) = &args.tz {
    config.display_timezone = tz.clone();
  }
  config.validate().context("Invalid configuration")?;
  Ok(config)
}

/// Editor value to a time: empty clears, anything else must parse.
fn parse_input_time(value: &str, tz: &Tz) -> Result<TimeValue> {
  if value.trim().is_empty() {
    return Ok(TimeValue::Null);
  }
  from_input_value(value, tz)
    .map(TimeValue::Date)
    .ok_or_else(|| anyhow!("'{}' is not a valid local time (expected YYYY-MM-DDTHH:MM in {})", value, tz))
}

fn run_news(manager: &BoardManager, command: NewsCommand, tz: &Tz) -> Result<()> {
  match command {
    NewsCommand::Show => {
      for slot in manager.load_news_slots()? {
        let at = input_value_of(&slot.publish_at, tz);
        println!(
          "{} (order {})  {:<16}  {}",
          slot.id,
          slot.order,
          if at.is_empty() { "-" } else { at.as_str() },
          if slot.headline.is_empty() { "(untitled)" } else { slot.headline.as_str() }
        );
        if !slot.body.is_empty() {
          println!("    {}", slot.body);
        }
      }
    }
    NewsCommand::Set(set) => {
      let id = SlotId::parse(&set.slot)?;
      let mut slots = manager.load_news_slots()?;
      let slot = slots
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| anyhow!("slot {} missing from load", id))?;
      if let Some(headline) = set.headline {
        slot.headline = headline;
      }
      if let Some(body) = set.body {
        slot.body = body;
      }
      if let Some(at) = set.publish_at {
        slot.publish_at = parse_input_time(&at, tz)?;
      }
      manager.save_news_slot(slot)?;
      println!("{} saved", id);
    }
    NewsCommand::Clear { slot } => {
      let id = SlotId::parse(&slot)?;
      manager.clear_news_slot(id)?;
      println!("{} cleared", id);
    }
    NewsCommand::Preview => {
      let slots = manager.load_news_slots()?;
      println!("{}", admin_preview(&slots, Utc::now()));
    }
  }
  Ok(())
}

fn run_stock(manager: &BoardManager, command: StockCommand, tz: &Tz) -> Result<()> {
  match command {
    StockCommand::List => {
      let now = Utc::now();
      for instrument in manager.load_instruments()? {
        let resolution = resolve_instrument(&instrument, now);
        let schedule = match resolution.schedule {
          ScheduleState::Unscheduled => String::new(),
          ScheduleState::Pending { delta, at } => format!("  -> {} at {}", format_pct(delta), to_input_value(at, tz)),
          ScheduleState::Applied { delta, at } => format!("  = {} since {}", format_pct(delta), to_input_value(at, tz)),
        };
        println!(
          "{:<14} {:<24} order {:<4} {:<6} base {:>10}  {:>5}  now {:>12}{}",
          instrument.id,
          instrument.name,
          instrument.order.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string()),
          if instrument.is_visible() { "shown" } else { "hidden" },
          instrument.base_price,
          format_pct(instrument.delta_pct),
          format_price(&resolution.current_price),
          schedule
        );
      }
    }
    StockCommand::Add { id } => {
      let instrument = manager.add_instrument(id.as_deref())?;
      println!("added {} (order {})", instrument.id, instrument.order.unwrap_or_default());
    }
    StockCommand::Set(set) => {
      let mut instrument = manager.get_instrument(&set.id)?;
      if let Some(name) = set.name {
        instrument.name = name;
      }
      if let Some(description) = set.description {
        instrument.description = description;
      }
      if let Some(sector) = set.sector {
        instrument.sector = if sector.trim().is_empty() { None } else { Some(sector) };
      }
      if let Some(base_price) = set.base_price {
        instrument.base_price = base_price;
      }
      if let Some(delta) = set.delta {
        instrument.delta_pct = delta;
      }
      if let Some(order) = set.order {
        instrument.order = Some(order);
      }
      if let Some(published) = set.published {
        instrument.is_published = Some(published);
      }
      if let Some(scheduled) = set.scheduled_delta {
        instrument.scheduled_delta = Some(scheduled);
      }
      if let Some(at) = set.apply_at {
        instrument.apply_at = parse_input_time(&at, tz)?;
      }
      if set.clear_schedule {
        instrument.scheduled_delta = None;
        instrument.apply_at = TimeValue::Null;
      }
      manager.save_instrument(&instrument)?;
      println!("{} saved", instrument.id);
    }
    StockCommand::Rm { id } => {
      if manager.remove_instrument(&id)? {
        println!("{} removed", id);
      } else {
        println!("{} did not exist", id);
      }
    }
  }
  Ok(())
}

fn main() -> Result<()> {
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
  let args = Args::parse();
  let config = resolve_config(&args)?;
  let tz = config.timezone()?;

  info!("Opening board database {:?}", config.db_path);
  let store = SqliteStore::open(&config.db_path)
    .with_context(|| format!("Failed to open board database {:?}", config.db_path))?;
  let manager = BoardManager::with_config(store, &config);

  match args.command {
    Command::Init => {
      let created = manager.provision_news_slots()?;
      println!("{} news slots created", created);
    }
    Command::News(news) => run_news(&manager, news, &tz)?,
    Command::Stock(stock) => run_stock(&manager, stock, &tz)?,
  }
  Ok(())
}
