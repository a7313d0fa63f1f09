// timeless/src/store.rs

//! The document store abstraction both screens read from and write to.
//!
//! A store holds named collections of JSON documents keyed by id. Readers either fetch a
//! [`Snapshot`] with [`DocumentStore::get_all`] or register a [`SnapshotObserver`] with
//! [`DocumentStore::subscribe`]; observers receive the full current snapshot right away and
//! again after every write to that collection.
//!
//! Observers are held by `Weak` pointers, so the caller must keep a strong reference
//! (`Arc`) alive for as long as it wants updates.

use crate::base::BoardError;

use log::{debug, trace, warn};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Collection holding the five news slots.
pub const NEWS_COLLECTION: &str = "newsQueue";
/// Collection holding the instruments shown on the price board.
pub const STOCKS_COLLECTION: &str = "stocks";

/// Field map of one document.
pub type Fields = Map<String, Value>;

/// Unique identifier for a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub usize);

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  pub id: String,
  pub fields: Fields,
}

impl Document {
  pub fn new(id: impl Into<String>, fields: Fields) -> Self {
    Document { id: id.into(), fields }
  }

  pub fn get(&self, field: &str) -> Option<&Value> {
    self.fields.get(field)
  }
}

/// Full state of a collection at one point, documents ordered by id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
  pub collection: String,
  pub documents: Vec<Document>,
}

impl Snapshot {
  pub fn empty(collection: &str) -> Self {
    Snapshot { collection: collection.to_string(), documents: Vec::new() }
  }

  pub fn find(&self, id: &str) -> Option<&Document> {
    self.documents.iter().find(|d| d.id == id)
  }

  pub fn len(&self) -> usize {
    self.documents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.documents.is_empty()
  }
}

/// Receives pushed snapshots of one collection.
pub trait SnapshotObserver: Send + Sync {
  /// Called with the full collection state after subscribing and after every write.
  fn on_snapshot(&self, snapshot: &Snapshot);
  /// Called when the store could not produce a snapshot for this observer.
  #[allow(unused_variables)]
  fn on_error(&self, collection: &str, error: &BoardError) {}
}

/// Create/read/update/delete plus push-based change subscription, per named collection.
#[cfg_attr(test, mockall::automock)]
pub trait DocumentStore: Send + Sync {
  /// Returns every document of `collection`. Unknown collections are empty.
  fn get_all(&self, collection: &str) -> Result<Snapshot, BoardError>;

  /// Returns one document, if present.
  fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BoardError>;

  /// Registers `observer` for `collection` and immediately delivers the current snapshot.
  fn subscribe(&self, collection: &str, observer: Arc<dyn SnapshotObserver>) -> Result<ObserverId, BoardError>;

  /// Removes an observer. Returns `false` if the id was unknown.
  fn unsubscribe(&self, observer_id: ObserverId) -> bool;

  /// Creates the document or merges `fields` into it: given fields overwrite, others stay.
  fn upsert(&self, collection: &str, id: &str, fields: Fields) -> Result<(), BoardError>;

  /// Deletes the document. Returns `false` if it did not exist.
  fn delete(&self, collection: &str, id: &str) -> Result<bool, BoardError>;

  /// Picks up writes made outside this store instance and pushes fresh snapshots to the
  /// affected observers. Stores that see every write themselves have nothing to do.
  fn poll_changes(&self) -> Result<(), BoardError> {
    Ok(())
  }
}

/// Observer bookkeeping shared by the store implementations.
pub(crate) struct ObserverRegistry {
  observers: RwLock<HashMap<ObserverId, (String, Weak<dyn SnapshotObserver>)>>,
  next_observer_id: AtomicUsize,
}

impl ObserverRegistry {
  pub(crate) fn new() -> Self {
    ObserverRegistry {
      observers: RwLock::new(HashMap::new()),
      next_observer_id: AtomicUsize::new(1),
    }
  }

  pub(crate) fn add(&self, collection: &str, observer: &Arc<dyn SnapshotObserver>) -> ObserverId {
    let observer_id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::SeqCst));
    let mut observers_map = self.observers.write();
    // Clean up dead observers before adding a new one
    observers_map.retain(|_, (_, weak)| weak.strong_count() > 0);
    observers_map.insert(observer_id, (collection.to_string(), Arc::downgrade(observer)));
    debug!("Added snapshot observer {:?} for collection '{}'", observer_id, collection);
    observer_id
  }

  pub(crate) fn remove(&self, observer_id: ObserverId) -> bool {
    let mut observers_map = self.observers.write();
    let removed = observers_map.remove(&observer_id).is_some();
    if removed {
      debug!("Removed snapshot observer {:?}", observer_id);
    } else {
      warn!("Attempted to remove non-existent snapshot observer {:?}", observer_id);
    }
    observers_map.retain(|_, (_, weak)| weak.strong_count() > 0);
    removed
  }

  /// Live observers of `collection`. Upgraded outside of any store lock by the caller.
  fn live_observers(&self, collection: &str) -> Vec<Arc<dyn SnapshotObserver>> {
    let observers_map = self.observers.read();
    observers_map
      .values()
      .filter(|(c, _)| c == collection)
      .filter_map(|(_, weak)| weak.upgrade())
      .collect()
  }

  /// Collections that currently have at least one live observer.
  pub(crate) fn observed_collections(&self) -> Vec<String> {
    let observers_map = self.observers.read();
    let mut collections: Vec<String> = observers_map
      .values()
      .filter(|(_, weak)| weak.strong_count() > 0)
      .map(|(c, _)| c.clone())
      .collect();
    collections.sort();
    collections.dedup();
    collections
  }

  pub(crate) fn has_observers(&self, collection: &str) -> bool {
    let observers_map = self.observers.read();
    observers_map.values().any(|(c, weak)| c == collection && weak.strong_count() > 0)
  }

  pub(crate) fn notify(&self, snapshot: &Snapshot) {
    for observer in self.live_observers(&snapshot.collection) {
      trace!("Notifying observer about '{}' snapshot ({} docs)", snapshot.collection, snapshot.len());
      observer.on_snapshot(snapshot);
    }
  }

  pub(crate) fn notify_error(&self, collection: &str, error: &BoardError) {
    for observer in self.live_observers(collection) {
      observer.on_error(collection, error);
    }
  }

  pub(crate) fn count(&self) -> usize {
    self.observers.read().values().filter(|(_, weak)| weak.strong_count() > 0).count()
  }
}

/// Rejects ids the stores cannot key documents by.
pub(crate) fn check_key(collection: &str, id: &str) -> Result<(), BoardError> {
  if collection.trim().is_empty() {
    return Err(BoardError::InvalidParameter("collection name must not be empty".to_string()));
  }
  if id.trim().is_empty() || id.contains('/') {
    return Err(BoardError::InvalidParameter(format!("invalid document id '{}'", id)));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;

  struct Recorder {
    seen: Mutex<Vec<usize>>,
  }

  impl SnapshotObserver for Recorder {
    fn on_snapshot(&self, snapshot: &Snapshot) {
      self.seen.lock().push(snapshot.len());
    }
  }

  #[test]
  fn test_registry_routes_by_collection() {
    let registry = ObserverRegistry::new();
    let news = Arc::new(Recorder { seen: Mutex::new(vec![]) });
    let stocks = Arc::new(Recorder { seen: Mutex::new(vec![]) });
    let news_dyn: Arc<dyn SnapshotObserver> = news.clone();
    let stocks_dyn: Arc<dyn SnapshotObserver> = stocks.clone();
    registry.add(NEWS_COLLECTION, &news_dyn);
    registry.add(STOCKS_COLLECTION, &stocks_dyn);

    let mut snapshot = Snapshot::empty(NEWS_COLLECTION);
    snapshot.documents.push(Document::new("n1", Fields::new()));
    registry.notify(&snapshot);

    assert_eq!(*news.seen.lock(), vec![1]);
    assert!(stocks.seen.lock().is_empty());
  }

  #[test]
  fn test_dropped_observer_is_pruned() {
    let registry = ObserverRegistry::new();
    let observer: Arc<dyn SnapshotObserver> = Arc::new(Recorder { seen: Mutex::new(vec![]) });
    let id = registry.add(NEWS_COLLECTION, &observer);
    assert_eq!(registry.count(), 1);
    drop(observer);
    assert_eq!(registry.count(), 0);
    assert!(!registry.has_observers(NEWS_COLLECTION));
    assert!(registry.remove(id));
    assert!(!registry.remove(id));
  }

  #[test]
  fn test_check_key() {
    assert!(check_key("stocks", "abc").is_ok());
    assert!(check_key("stocks", "").is_err());
    assert!(check_key("stocks", "a/b").is_err());
    assert!(check_key(" ", "a").is_err());
  }
}
