// timeless/test_stocks.rs
use anyhow::{ensure, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use log::info;
use serde_json::json;
use std::sync::Arc;
use timeless::{
  instrument::{instruments_from_snapshot, published_board, ScheduleState},
  store::STOCKS_COLLECTION,
  view::format_price,
  BoardManager, DocumentStore, Price, TimeValue, resolve_instrument,
};

pub(super) fn lifecycle_impl(store: Arc<dyn DocumentStore>) -> Result<()> {
  info!("--- Instrument Add / Save / Remove ---");
  let manager = BoardManager::new(store.clone());

  let mut acme = manager.add_instrument(Some("acme")).context("Failed to add acme")?;
  let generated = manager.add_instrument(None).context("Failed to add generated instrument")?;
  info!("Added '{}' (order {:?}) and '{}' (order {:?})", acme.id, acme.order, generated.id, generated.order);
  ensure!(acme.order == Some(1) && generated.order == Some(2), "new instruments must append in order");
  ensure!(manager.add_instrument(Some("acme")).is_err(), "duplicate id was accepted");

  acme.name = "Acme Corp".to_string();
  acme.sector = Some("Industrials".to_string());
  acme.delta_pct = 5.0;
  manager.save_instrument(&acme)?;
  let stored = manager.get_instrument("acme")?;
  ensure!(stored == acme, "saved instrument differs: {:?}", stored);

  let price = resolve_instrument(&stored, Utc::now()).current_price;
  ensure!(format_price(&price) == "1,050", "unexpected price {}", price);

  ensure!(manager.remove_instrument(&generated.id)?, "remove reported nothing deleted");
  ensure!(manager.load_instruments()?.len() == 1, "removed instrument still listed");
  Ok(())
}

pub(super) fn schedule_applies_impl(store: Arc<dyn DocumentStore>) -> Result<()> {
  info!("--- Scheduled Delta Takes Over At Its Time ---");
  let manager = BoardManager::new(store);
  let mut acme = manager.add_instrument(Some("acme"))?;
  let apply_at = Utc::now() + ChronoDuration::minutes(10);
  acme.delta_pct = 5.0;
  acme.scheduled_delta = Some(20.0);
  acme.apply_at = TimeValue::Date(apply_at);
  manager.save_instrument(&acme)?;

  let stored = manager.get_instrument("acme")?;
  let before = resolve_instrument(&stored, apply_at - ChronoDuration::seconds(1));
  ensure!(before.effective_delta == 5.0, "schedule applied early: {:?}", before);
  ensure!(matches!(before.schedule, ScheduleState::Pending { .. }), "expected pending schedule");

  let after = resolve_instrument(&stored, apply_at);
  ensure!(after.effective_delta == 20.0, "schedule not applied at its time: {:?}", after);
  ensure!(after.current_price.as_f64() == Some(1200.0), "unexpected price {}", after.current_price);

  // Resolution never writes the scheduled value back.
  ensure!(manager.get_instrument("acme")?.delta_pct == 5.0, "deltaPct was modified");
  Ok(())
}

pub(super) fn board_filter_impl(store: Arc<dyn DocumentStore>) -> Result<()> {
  info!("--- Published Board Filter And Order ---");
  let docs = [
    ("c-hidden", json!({"name": "Hidden", "basePrice": 10, "deltaPct": 0, "order": 1, "isPublished": false})),
    ("b-second", json!({"name": "Second", "basePrice": 2000, "deltaPct": -3, "order": 2})),
    ("a-unordered", json!({"name": "Unordered", "basePrice": "oops", "deltaPct": 1})),
    ("d-first", json!({"name": "First", "basePrice": "1000", "deltaPct": "0.0125", "order": 1})),
  ];
  for (id, fields) in docs {
    let fields = fields.as_object().cloned().unwrap_or_default();
    store.upsert(STOCKS_COLLECTION, id, fields)?;
  }

  let instruments = instruments_from_snapshot(&store.get_all(STOCKS_COLLECTION)?);
  let board = published_board(&instruments);
  let ids: Vec<&str> = board.iter().map(|i| i.id.as_str()).collect();
  ensure!(ids == ["d-first", "b-second", "a-unordered"], "unexpected board order {:?}", ids);

  let now = Utc::now();
  let prices: Vec<Price> = board.iter().map(|i| resolve_instrument(i, now).current_price).collect();
  info!("Board prices: {:?}", prices.iter().map(format_price).collect::<Vec<_>>());
  ensure!(format_price(&prices[0]) == "1,000.13", "midpoint must round away from zero, got {}", prices[0]);
  ensure!(format_price(&prices[1]) == "1,940", "unexpected price {}", prices[1]);
  ensure!(prices[2] == Price::Unavailable, "non-numeric base price must be unavailable");
  Ok(())
}
