// timeless/test_runner.rs
use anyhow::{anyhow, ensure, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use timeless::{
  view::RunnerView,
  BoardConfig, BoardManager, DocumentStore, RunnerEvent, RunnerSession, TimeValue,
};

fn scenario_config(refresh_ms: u64) -> BoardConfig {
  BoardConfig {
    display_timezone: "UTC".to_string(),
    refresh_interval: Duration::from_millis(refresh_ms),
    ..Default::default()
  }
}

/// Waits for the next view that satisfies `accept`, skipping intermediate ones.
fn wait_for_view<F>(session: &RunnerSession, timeout: Duration, accept: F) -> Result<RunnerView>
where
  F: Fn(&RunnerView) -> bool,
{
  let events = session.events();
  let deadline = std::time::Instant::now() + timeout;
  loop {
    let remaining = deadline.saturating_duration_since(std::time::Instant::now());
    match events.recv_timeout(remaining) {
      Ok(RunnerEvent::ViewUpdate { view, .. }) => {
        if accept(&view) {
          return Ok(view);
        }
        debug!("Skipping intermediate view with {} rows", view.board.len());
      }
      Ok(RunnerEvent::Error { error, .. }) => return Err(anyhow!("runner reported an error: {}", error)),
      Ok(RunnerEvent::Closed { .. }) => return Err(anyhow!("runner closed unexpectedly")),
      Err(_) => return Err(anyhow!("no matching view within {:?}", timeout)),
    }
  }
}

pub(super) fn push_impl(store: Arc<dyn DocumentStore>) -> Result<()> {
  info!("--- Runner Follows Admin Writes ---");
  let manager = BoardManager::new(store.clone());
  manager.provision_news_slots()?;
  let mut session = RunnerSession::start(store, &scenario_config(60_000)).context("Failed to start runner")?;

  let initial = wait_for_view(&session, Duration::from_secs(2), |_| true)?;
  ensure!(initial.current_news.is_none() && initial.board.is_empty(), "fresh board should be empty");
  print!("{}", initial.render());

  let mut acme = manager.add_instrument(Some("acme"))?;
  acme.delta_pct = -3.0;
  manager.save_instrument(&acme)?;
  let view = wait_for_view(&session, Duration::from_secs(2), |v| {
    v.board.first().map(|r| r.effective_delta == -3.0).unwrap_or(false)
  })?;
  ensure!(view.board[0].price_text() == "970", "unexpected price {}", view.board[0].price_text());

  let mut slots = manager.load_news_slots()?;
  slots[3].headline = "Markets rally".to_string();
  slots[3].publish_at = TimeValue::Date(Utc::now() - ChronoDuration::seconds(1));
  manager.save_news_slot(&slots[3])?;
  let view = wait_for_view(&session, Duration::from_secs(2), |v| v.current_news.is_some())?;
  print!("{}", view.render());

  session.close()?;
  Ok(())
}

pub(super) fn tick_impl(store: Arc<dyn DocumentStore>) -> Result<()> {
  info!("--- Runner Re-derives The Board On Its Clock ---");
  let manager = BoardManager::new(store.clone());
  let mut acme = manager.add_instrument(Some("acme"))?;
  acme.delta_pct = 5.0;
  acme.scheduled_delta = Some(20.0);
  acme.apply_at = TimeValue::Date(Utc::now() + ChronoDuration::milliseconds(500));
  manager.save_instrument(&acme)?;

  let mut session = RunnerSession::start(store, &scenario_config(100)).context("Failed to start runner")?;
  let before = wait_for_view(&session, Duration::from_secs(2), |_| true)?;
  ensure!(before.board[0].effective_delta == 5.0, "schedule applied too early");

  // No write happens from here on; only the ticker can produce the next view.
  let after = wait_for_view(&session, Duration::from_secs(5), |v| v.board[0].effective_delta == 20.0)?;
  ensure!(after.board[0].price_text() == "1,200", "unexpected price {}", after.board[0].price_text());
  print!("{}", after.render());

  session.close()?;
  Ok(())
}
