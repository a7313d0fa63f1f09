// timeless/test_news.rs
use anyhow::{anyhow, ensure, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use log::info;
use std::sync::Arc;
use timeless::{
  store::NEWS_COLLECTION,
  time_value::StoreTimestamp,
  view::admin_preview,
  BoardManager, DocumentStore, SlotId, TimeValue,
};

pub(super) fn provision_impl(store: Arc<dyn DocumentStore>) -> Result<()> {
  info!("--- Provisioning News Slots ---");
  let manager = BoardManager::new(store.clone());
  let created = manager.provision_news_slots().context("First provisioning failed")?;
  ensure!(created == 5, "expected 5 slots to be created, got {}", created);

  let again = manager.provision_news_slots().context("Second provisioning failed")?;
  ensure!(again == 0, "provisioning is not idempotent: created {} more", again);

  let snapshot = store.get_all(NEWS_COLLECTION)?;
  let ids: Vec<&str> = snapshot.documents.iter().map(|d| d.id.as_str()).collect();
  ensure!(ids == ["n1", "n2", "n3", "n4", "n5"], "unexpected slot ids {:?}", ids);
  for doc in &snapshot.documents {
    ensure!(doc.get("updatedAt").is_some(), "slot {} was written without updatedAt", doc.id);
  }
  info!("Provisioned slots: {:?}", ids);
  Ok(())
}

pub(super) fn selection_impl(store: Arc<dyn DocumentStore>) -> Result<()> {
  info!("--- Selecting The Current Headline ---");
  let manager = BoardManager::new(store);
  manager.provision_news_slots()?;
  let now = Utc::now();

  let mut slots = manager.load_news_slots()?;
  ensure!(manager.preview_current_news(now)?.is_none(), "empty slots must not select anything");

  // N5 is published before N1, so N1 wins even though its order is lower.
  slots[4].headline = "Earlier announcement".to_string();
  slots[4].publish_at = TimeValue::Date(now - ChronoDuration::minutes(30));
  slots[0].headline = "Later announcement".to_string();
  slots[0].publish_at = TimeValue::Date(now - ChronoDuration::minutes(5));
  slots[2].headline = "Future announcement".to_string();
  slots[2].publish_at = TimeValue::Text((now + ChronoDuration::hours(1)).to_rfc3339());
  manager.save_all_news_slots(&slots)?;

  let current = manager
    .preview_current_news(now)?
    .ok_or_else(|| anyhow!("no headline selected"))?;
  ensure!(current.id == SlotId::N1, "expected N1, got {}", current.id);
  info!("Now showing: {}", admin_preview(&manager.load_news_slots()?, now));

  let in_two_hours = now + ChronoDuration::hours(2);
  let future = manager.preview_current_news(in_two_hours)?.map(|s| s.id);
  ensure!(future == Some(SlotId::N3), "expected N3 once its time passes, got {:?}", future);
  Ok(())
}

pub(super) fn clear_impl(store: Arc<dyn DocumentStore>) -> Result<()> {
  info!("--- Clearing A News Slot ---");
  let manager = BoardManager::new(store.clone());
  manager.provision_news_slots()?;
  let mut slots = manager.load_news_slots()?;
  slots[1].headline = "Temporary".to_string();
  slots[1].body = "Will be cleared".to_string();
  slots[1].publish_at = TimeValue::Store(StoreTimestamp::from_date(Utc::now()));
  manager.save_news_slot(&slots[1])?;
  ensure!(manager.preview_current_news(Utc::now())?.is_some(), "saved slot should be showing");

  manager.clear_news_slot(SlotId::N2)?;
  ensure!(manager.preview_current_news(Utc::now())?.is_none(), "cleared slot is still showing");
  let doc = store
    .get(NEWS_COLLECTION, "n2")?
    .ok_or_else(|| anyhow!("slot n2 disappeared"))?;
  ensure!(doc.get("order") == Some(&serde_json::json!(2)), "clearing must keep the slot order");
  Ok(())
}
