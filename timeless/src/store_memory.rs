// timeless/src/store_memory.rs

//! In-process [`DocumentStore`]. Used by tests, scenarios, and single-process demos.

use crate::base::BoardError;
use crate::store::{check_key, Document, DocumentStore, Fields, ObserverId, ObserverRegistry, Snapshot, SnapshotObserver};

use log::{debug, info};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

type Collection = BTreeMap<String, Fields>;

/// Document store kept entirely in memory.
pub struct MemoryStore {
  collections: RwLock<HashMap<String, Collection>>,
  observers: ObserverRegistry,
}

impl MemoryStore {
  pub fn new() -> Arc<Self> {
    Arc::new(MemoryStore {
      collections: RwLock::new(HashMap::new()),
      observers: ObserverRegistry::new(),
    })
  }

  /// Number of live observers across all collections.
  pub fn observer_count(&self) -> usize {
    self.observers.count()
  }

  fn snapshot_of(&self, collection: &str) -> Snapshot {
    let collections = self.collections.read();
    match collections.get(collection) {
      Some(docs) => Snapshot {
        collection: collection.to_string(),
        documents: docs.iter().map(|(id, fields)| Document::new(id.clone(), fields.clone())).collect(),
      },
      None => Snapshot::empty(collection),
    }
  }

  fn publish(&self, collection: &str) {
    if !self.observers.has_observers(collection) {
      return;
    }
    let snapshot = self.snapshot_of(collection);
    self.observers.notify(&snapshot);
  }
}

impl DocumentStore for MemoryStore {
  fn get_all(&self, collection: &str) -> Result<Snapshot, BoardError> {
    Ok(self.snapshot_of(collection))
  }

  fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BoardError> {
    let collections = self.collections.read();
    Ok(collections
      .get(collection)
      .and_then(|docs| docs.get(id))
      .map(|fields| Document::new(id, fields.clone())))
  }

  fn subscribe(&self, collection: &str, observer: Arc<dyn SnapshotObserver>) -> Result<ObserverId, BoardError> {
    let observer_id = self.observers.add(collection, &observer);
    let snapshot = self.snapshot_of(collection);
    observer.on_snapshot(&snapshot);
    info!("Subscribed observer {:?} to '{}' ({} docs)", observer_id, collection, snapshot.len());
    Ok(observer_id)
  }

  fn unsubscribe(&self, observer_id: ObserverId) -> bool {
    self.observers.remove(observer_id)
  }

  fn upsert(&self, collection: &str, id: &str, fields: Fields) -> Result<(), BoardError> {
    check_key(collection, id)?;
    {
      let mut collections = self.collections.write();
      let docs = collections.entry(collection.to_string()).or_default();
      let existing = docs.entry(id.to_string()).or_default();
      for (k, v) in fields {
        existing.insert(k, v);
      }
    }
    debug!("Upserted {}/{}", collection, id);
    self.publish(collection);
    Ok(())
  }

  fn delete(&self, collection: &str, id: &str) -> Result<bool, BoardError> {
    check_key(collection, id)?;
    let removed = {
      let mut collections = self.collections.write();
      collections.get_mut(collection).map(|docs| docs.remove(id).is_some()).unwrap_or(false)
    };
    if removed {
      debug!("Deleted {}/{}", collection, id);
      self.publish(collection);
    }
    Ok(removed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{NEWS_COLLECTION, STOCKS_COLLECTION};
  use parking_lot::Mutex;
  use serde_json::json;

  struct Recorder {
    snapshots: Mutex<Vec<Snapshot>>,
  }

  impl SnapshotObserver for Recorder {
    fn on_snapshot(&self, snapshot: &Snapshot) {
      self.snapshots.lock().push(snapshot.clone());
    }
  }

  fn fields(v: serde_json::Value) -> Fields {
    v.as_object().unwrap().clone()
  }

  #[test]
  fn test_upsert_merges_fields() {
    let store = MemoryStore::new();
    store.upsert(STOCKS_COLLECTION, "acme", fields(json!({"name": "Acme", "basePrice": 1000}))).unwrap();
    store.upsert(STOCKS_COLLECTION, "acme", fields(json!({"basePrice": 1200}))).unwrap();

    let doc = store.get(STOCKS_COLLECTION, "acme").unwrap().unwrap();
    assert_eq!(doc.get("name"), Some(&json!("Acme")));
    assert_eq!(doc.get("basePrice"), Some(&json!(1200)));
  }

  #[test]
  fn test_snapshot_is_ordered_by_id() {
    let store = MemoryStore::new();
    for id in ["n3", "n1", "n2"] {
      store.upsert(NEWS_COLLECTION, id, Fields::new()).unwrap();
    }
    let ids: Vec<_> = store.get_all(NEWS_COLLECTION).unwrap().documents.into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["n1", "n2", "n3"]);
    assert!(store.get_all("unknown").unwrap().is_empty());
  }

  #[test]
  fn test_subscribe_pushes_initial_and_updates() {
    let store = MemoryStore::new();
    store.upsert(STOCKS_COLLECTION, "a", Fields::new()).unwrap();
    let recorder = Arc::new(Recorder { snapshots: Mutex::new(vec![]) });
    let id = store.subscribe(STOCKS_COLLECTION, recorder.clone()).unwrap();

    store.upsert(STOCKS_COLLECTION, "b", Fields::new()).unwrap();
    store.upsert(NEWS_COLLECTION, "n1", Fields::new()).unwrap();
    assert!(store.delete(STOCKS_COLLECTION, "a").unwrap());
    assert!(!store.delete(STOCKS_COLLECTION, "missing").unwrap());

    let lens: Vec<_> = recorder.snapshots.lock().iter().map(|s| s.len()).collect();
    assert_eq!(lens, vec![1, 2, 1]);

    assert!(store.unsubscribe(id));
    store.upsert(STOCKS_COLLECTION, "c", Fields::new()).unwrap();
    assert_eq!(recorder.snapshots.lock().len(), 3);
  }

  #[test]
  fn test_invalid_ids_are_rejected() {
    let store = MemoryStore::new();
    assert!(matches!(store.upsert(STOCKS_COLLECTION, "", Fields::new()), Err(BoardError::InvalidParameter(_))));
    assert!(store.delete(STOCKS_COLLECTION, "a/b").is_err());
  }
}
