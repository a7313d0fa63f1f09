// timeless/src/board_manager.rs

//! Typed admin operations over the two board collections.
//!
//! The `BoardManager` is what the admin console drives:
//! -   News: provision the five slots, load them, save one or all, clear one.
//! -   Instruments: load, add (with a generated id if none is given), save, remove.
//!
//! Every write goes through [`DocumentStore::upsert`] (merge semantics) and stamps an
//! `updatedAt` store timestamp. Nothing is re-read after a write; subscribers get the new
//! snapshot pushed by the store.
//!
//! # Example
//!
//! ```no_run
//! use timeless::{BoardManager, MemoryStore, SlotId};
//! use chrono::Utc;
//!
//! fn main() -> Result<(), timeless::BoardError> {
//!     let manager = BoardManager::new(MemoryStore::new());
//!     manager.provision_news_slots()?;
//!
//!     let mut slots = manager.load_news_slots()?;
//!     slots[0].headline = "Markets open".to_string();
//!     slots[0].publish_at = Utc::now().into();
//!     manager.save_news_slot(&slots[0])?;
//!
//!     let stock = manager.add_instrument(Some("acme"))?;
//!     println!("added {} at order {:?}", stock.id, stock.order);
//!     manager.clear_news_slot(SlotId::N1)?;
//!     Ok(())
//! }
//! ```

use crate::base::BoardError;
use crate::config::BoardConfig;
use crate::instrument::{next_order, Instrument};
use crate::news::{select_current_news, slots_from_snapshot, NewsSlot, SlotId};
use crate::store::{DocumentStore, Fields, NEWS_COLLECTION, STOCKS_COLLECTION};
use crate::time_value::StoreTimestamp;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Default id offered for a new instrument: `stock-` plus four random base-36 characters.
pub fn generate_instrument_id() -> String {
  let mut rng = rand::rng();
  let suffix: String = (0..4)
    .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
    .collect();
  format!("stock-{}", suffix)
}

fn stamped(mut fields: Fields) -> Fields {
  fields.insert("updatedAt".to_string(), StoreTimestamp::now().to_json());
  fields
}

fn check_slot_order(slot: &NewsSlot) -> Result<(), BoardError> {
  if slot.order != slot.id.rank() {
    return Err(BoardError::InvalidParameter(format!(
      "news slot {} must keep order {}, got {}",
      slot.id,
      slot.id.rank(),
      slot.order
    )));
  }
  Ok(())
}

pub struct BoardManager {
  store: Arc<dyn DocumentStore>,
  default_base_price: f64,
}

impl BoardManager {
  pub fn new(store: Arc<dyn DocumentStore>) -> Self {
    Self::with_config(store, &BoardConfig::default())
  }

  pub fn with_config(store: Arc<dyn DocumentStore>, config: &BoardConfig) -> Self {
    BoardManager { store, default_base_price: config.default_base_price }
  }

  pub fn store(&self) -> &Arc<dyn DocumentStore> {
    &self.store
  }

  // --- News slots ---

  /// Writes an empty document for every slot that does not exist yet. Existing slots are
  /// left untouched. Returns how many were created.
  pub fn provision_news_slots(&self) -> Result<usize, BoardError> {
    info!("Provisioning news slots");
    let snapshot = self.store.get_all(NEWS_COLLECTION)?;
    let mut created = 0;
    for id in SlotId::ALL {
      if snapshot.find(id.key()).is_none() {
        self.store.upsert(NEWS_COLLECTION, id.key(), stamped(NewsSlot::empty(id).to_fields()))?;
        created += 1;
      }
    }
    debug!("Provisioned {} of {} news slots", created, SlotId::ALL.len());
    Ok(created)
  }

  /// The five slots, stored values merged over the empty defaults, sorted by order.
  pub fn load_news_slots(&self) -> Result<Vec<NewsSlot>, BoardError> {
    let snapshot = self.store.get_all(NEWS_COLLECTION)?;
    Ok(slots_from_snapshot(&snapshot))
  }

  /// Writes one slot. A slot's order is fixed to its rank; any other order is rejected.
  pub fn save_news_slot(&self, slot: &NewsSlot) -> Result<(), BoardError> {
    info!("Saving news slot {}: order={}, headline='{}'", slot.id, slot.order, slot.headline);
    check_slot_order(slot)?;
    if !slot.publish_at.is_null() && slot.publish_instant().is_none() {
      warn!("News slot {} has an unreadable publish time {:?}; saving it as unscheduled", slot.id, slot.publish_at);
    }
    self.store.upsert(NEWS_COLLECTION, slot.id.key(), stamped(slot.to_fields()))
  }

  /// Saves every given slot. Orders are checked before anything is written; a store
  /// failure stops at that slot and earlier slots stay written.
  pub fn save_all_news_slots(&self, slots: &[NewsSlot]) -> Result<(), BoardError> {
    info!("Saving {} news slots", slots.len());
    for slot in slots {
      check_slot_order(slot)?;
    }
    for slot in slots {
      self.store.upsert(NEWS_COLLECTION, slot.id.key(), stamped(slot.to_fields()))?;
    }
    Ok(())
  }

  /// Blanks the slot's headline, body and publish time. Its order is kept.
  pub fn clear_news_slot(&self, id: SlotId) -> Result<(), BoardError> {
    info!("Clearing news slot {}", id);
    let mut fields = Fields::new();
    fields.insert("headline".to_string(), Value::String(String::new()));
    fields.insert("body".to_string(), Value::String(String::new()));
    fields.insert("publishAt".to_string(), Value::Null);
    self.store.upsert(NEWS_COLLECTION, id.key(), stamped(fields))
  }

  /// The slot the runner would be showing at `now`.
  pub fn preview_current_news(&self, now: DateTime<Utc>) -> Result<Option<NewsSlot>, BoardError> {
    let slots = self.load_news_slots()?;
    Ok(select_current_news(&slots, now).cloned())
  }

  // --- Instruments ---

  /// All instruments, published or not, sorted by order with a missing order counted as 0.
  pub fn load_instruments(&self) -> Result<Vec<Instrument>, BoardError> {
    let snapshot = self.store.get_all(STOCKS_COLLECTION)?;
    let mut instruments: Vec<Instrument> = snapshot.documents.iter().map(Instrument::from_document).collect();
    instruments.sort_by_key(|i| i.order.unwrap_or(0));
    Ok(instruments)
  }

  pub fn get_instrument(&self, id: &str) -> Result<Instrument, BoardError> {
    match self.store.get(STOCKS_COLLECTION, id)? {
      Some(doc) => Ok(Instrument::from_document(&doc)),
      None => Err(BoardError::NotFound { collection: STOCKS_COLLECTION.to_string(), id: id.to_string() }),
    }
  }

  /// Creates an instrument with the default values, appended after the last order.
  /// Without an id one is generated. An id that is already taken is rejected.
  pub fn add_instrument(&self, id: Option<&str>) -> Result<Instrument, BoardError> {
    let id = match id {
      Some(id) => id.trim().to_string(),
      None => generate_instrument_id(),
    };
    info!("Adding instrument '{}'", id);
    if self.store.get(STOCKS_COLLECTION, &id)?.is_some() {
      return Err(BoardError::InvalidParameter(format!("instrument '{}' already exists", id)));
    }
    let existing = self.load_instruments()?;
    let instrument = Instrument {
      base_price: self.default_base_price,
      order: Some(next_order(&existing)),
      ..Instrument::new(id)
    };
    self.store.upsert(STOCKS_COLLECTION, &instrument.id, stamped(instrument.to_fields()))?;
    Ok(instrument)
  }

  /// Writes every editable field of an existing instrument.
  pub fn save_instrument(&self, instrument: &Instrument) -> Result<(), BoardError> {
    info!(
      "Saving instrument '{}': base={}, delta={}%, scheduled={:?}",
      instrument.id, instrument.base_price, instrument.delta_pct, instrument.scheduled_delta
    );
    if self.store.get(STOCKS_COLLECTION, &instrument.id)?.is_none() {
      return Err(BoardError::NotFound {
        collection: STOCKS_COLLECTION.to_string(),
        id: instrument.id.clone(),
      });
    }
    self.store.upsert(STOCKS_COLLECTION, &instrument.id, stamped(instrument.to_fields()))
  }

  /// Deletes an instrument. Returns `false` if there was nothing to delete.
  pub fn remove_instrument(&self, id: &str) -> Result<bool, BoardError> {
    info!("Removing instrument '{}'", id);
    let removed = self.store.delete(STOCKS_COLLECTION, id)?;
    if !removed {
      warn!("Instrument '{}' did not exist", id);
    }
    Ok(removed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::news::initial_slots;
  use crate::store::{Document, MockDocumentStore, Snapshot};
  use crate::store_memory::MemoryStore;
  use crate::time_value::TimeValue;
  use chrono::TimeZone;
  use parking_lot::Mutex;
  use serde_json::json;

  fn memory_manager() -> BoardManager {
    BoardManager::new(MemoryStore::new())
  }

  #[test]
  fn test_provision_creates_missing_slots_only() {
    let manager = memory_manager();
    assert_eq!(manager.provision_news_slots().unwrap(), 5);
    let mut slots = manager.load_news_slots().unwrap();
    slots[1].headline = "kept".to_string();
    manager.save_news_slot(&slots[1]).unwrap();
    assert_eq!(manager.provision_news_slots().unwrap(), 0);
    assert_eq!(manager.load_news_slots().unwrap()[1].headline, "kept");
  }

  #[test]
  fn test_save_and_clear_slot() {
    let manager = memory_manager();
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let slot = NewsSlot {
      headline: "Rate cut".to_string(),
      body: "Central bank moves".to_string(),
      publish_at: TimeValue::Date(at),
      ..NewsSlot::empty(SlotId::N2)
    };
    manager.save_news_slot(&slot).unwrap();

    let doc = manager.store().get(NEWS_COLLECTION, "n2").unwrap().unwrap();
    assert_eq!(doc.get("publishAt"), Some(&json!({"seconds": at.timestamp(), "nanoseconds": 0})));
    assert!(doc.get("updatedAt").is_some());
    assert_eq!(manager.preview_current_news(at).unwrap().unwrap().headline, "Rate cut");

    manager.clear_news_slot(SlotId::N2).unwrap();
    let cleared = manager.load_news_slots().unwrap();
    assert_eq!(cleared[1], NewsSlot::empty(SlotId::N2));
    assert_eq!(manager.preview_current_news(at).unwrap(), None);
  }

  #[test]
  fn test_slot_order_is_fixed_to_rank() {
    let mut store = MockDocumentStore::new();
    store.expect_upsert().never();
    let manager = BoardManager::new(Arc::new(store));

    let moved = NewsSlot { order: 9, headline: "Jump the queue".to_string(), ..NewsSlot::empty(SlotId::N2) };
    assert!(matches!(manager.save_news_slot(&moved), Err(BoardError::InvalidParameter(_))));

    let mut slots = initial_slots();
    slots[4].order = 1;
    assert!(matches!(manager.save_all_news_slots(&slots), Err(BoardError::InvalidParameter(_))));
  }

  #[test]
  fn test_add_instrument_appends_with_defaults() {
    let manager = memory_manager();
    let first = manager.add_instrument(Some("acme")).unwrap();
    assert_eq!(first.order, Some(1));
    assert_eq!(first.base_price, 1000.0);
    assert_eq!(first.name, "New instrument");

    let second = manager.add_instrument(None).unwrap();
    assert!(second.id.starts_with("stock-"));
    assert_eq!(second.id.len(), "stock-".len() + 4);
    assert_eq!(second.order, Some(2));

    assert!(matches!(manager.add_instrument(Some("acme")), Err(BoardError::InvalidParameter(_))));
    assert_eq!(manager.load_instruments().unwrap().len(), 2);
  }

  #[test]
  fn test_save_and_remove_instrument() {
    let manager = memory_manager();
    let mut acme = manager.add_instrument(Some("acme")).unwrap();
    acme.delta_pct = 5.0;
    acme.scheduled_delta = Some(-3.5);
    manager.save_instrument(&acme).unwrap();
    assert_eq!(manager.get_instrument("acme").unwrap(), acme);

    assert!(manager.remove_instrument("acme").unwrap());
    assert!(!manager.remove_instrument("acme").unwrap());
    assert!(matches!(manager.get_instrument("acme"), Err(BoardError::NotFound { .. })));
  }

  #[test]
  fn test_load_instruments_counts_missing_order_as_zero() {
    let manager = memory_manager();
    let store = manager.store();
    store.upsert(STOCKS_COLLECTION, "b", json!({"order": 2}).as_object().unwrap().clone()).unwrap();
    store.upsert(STOCKS_COLLECTION, "a", json!({"order": 1}).as_object().unwrap().clone()).unwrap();
    store.upsert(STOCKS_COLLECTION, "z", Fields::new()).unwrap();
    let ids: Vec<String> = manager.load_instruments().unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["z", "a", "b"]);
  }

  #[test]
  fn test_save_missing_instrument_does_not_write() {
    let mut store = MockDocumentStore::new();
    store.expect_get().times(1).returning(|_, _| Ok(None));
    store.expect_upsert().never();
    let manager = BoardManager::new(Arc::new(store));
    let result = manager.save_instrument(&Instrument::new("ghost"));
    assert_eq!(
      result,
      Err(BoardError::NotFound { collection: STOCKS_COLLECTION.to_string(), id: "ghost".to_string() })
    );
  }

  #[test]
  fn test_store_failure_propagates() {
    let mut store = MockDocumentStore::new();
    store
      .expect_get_all()
      .returning(|_| Err(BoardError::StoreError("disk full".to_string())));
    store.expect_upsert().never();
    let manager = BoardManager::new(Arc::new(store));
    assert!(matches!(manager.provision_news_slots(), Err(BoardError::StoreError(_))));
    assert!(manager.load_news_slots().is_err());
  }

  #[test]
  fn test_provision_writes_stamped_defaults() {
    let written: Arc<Mutex<Vec<(String, Fields)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = written.clone();
    let mut store = MockDocumentStore::new();
    store.expect_get_all().returning(|collection| {
      let mut snapshot = Snapshot::empty(collection);
      snapshot.documents.push(Document::new("n1", Fields::new()));
      Ok(snapshot)
    });
    store.expect_upsert().times(4).returning(move |_, id, fields| {
      sink.lock().push((id.to_string(), fields));
      Ok(())
    });
    let manager = BoardManager::new(Arc::new(store));
    assert_eq!(manager.provision_news_slots().unwrap(), 4);

    let written = written.lock();
    let ids: Vec<&str> = written.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["n2", "n3", "n4", "n5"]);
    let (_, fields) = &written[0];
    assert_eq!(fields.get("order"), Some(&json!(2)));
    assert_eq!(fields.get("publishAt"), Some(&Value::Null));
    assert!(fields.get("updatedAt").is_some());
  }

  #[test]
  fn test_generated_ids_use_base36() {
    for _ in 0..20 {
      let id = generate_instrument_id();
      let suffix = id.strip_prefix("stock-").unwrap();
      assert!(suffix.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }
  }
}
