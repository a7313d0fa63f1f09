// timeless/src/store_sqlite.rs

//! SQLite-backed [`DocumentStore`], so the runner and the admin console can share one
//! database file from separate processes.
//!
//! Each document is one row of the `documents` table, its fields kept as JSON text.
//! Writes made through this instance notify observers directly. Writes made by another
//! process are picked up by [`DocumentStore::poll_changes`], which compares SQLite's
//! `data_version` against the last value seen.

use crate::base::BoardError;
use crate::store::{check_key, Document, DocumentStore, Fields, ObserverId, ObserverRegistry, Snapshot, SnapshotObserver};

use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection as DbConnection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

pub struct SqliteStore {
  db: Mutex<DbConnection>,
  last_data_version: Mutex<i64>,
  observers: ObserverRegistry,
}

impl SqliteStore {
  /// Opens (or creates) the database at `db_path` and ensures the schema exists.
  pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Arc<Self>, BoardError> {
    info!("Opening board database at path: {:?}", db_path.as_ref());
    let db = DbConnection::open(db_path)
      .map_err(|e| BoardError::ConfigurationError(format!("Failed to open board database: {}", e)))?;
    db.pragma_update(None, "journal_mode", "WAL")
      .map_err(|e| BoardError::ConfigurationError(format!("Failed to set WAL mode: {}", e)))?;
    Self::from_connection(db)
  }

  /// Database that lives only as long as this store. Handy for tests.
  pub fn open_in_memory() -> Result<Arc<Self>, BoardError> {
    let db = DbConnection::open_in_memory()
      .map_err(|e| BoardError::ConfigurationError(format!("Failed to open in-memory database: {}", e)))?;
    Self::from_connection(db)
  }

  fn from_connection(db: DbConnection) -> Result<Arc<Self>, BoardError> {
    Self::create_tables(&db)?;
    let data_version = Self::data_version(&db)?;
    Ok(Arc::new(SqliteStore {
      db: Mutex::new(db),
      last_data_version: Mutex::new(data_version),
      observers: ObserverRegistry::new(),
    }))
  }

  fn create_tables(db: &DbConnection) -> Result<(), BoardError> {
    db.execute_batch(
      "BEGIN;
             CREATE TABLE IF NOT EXISTS documents (
                 collection          TEXT NOT NULL,
                 id                  TEXT NOT NULL,
                 fields_json         TEXT NOT NULL,
                 written_unix_ms     INTEGER NOT NULL,
                 PRIMARY KEY (collection, id)
             );
             CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection);
             COMMIT;"
    ).map_err(|e| BoardError::ConfigurationError(format!("Failed to create board tables: {}", e)))?;
    Ok(())
  }

  fn data_version(db: &DbConnection) -> Result<i64, BoardError> {
    Ok(db.query_row("PRAGMA data_version", [], |row| row.get(0))?)
  }

  fn decode_fields(collection: &str, id: &str, text: &str) -> Fields {
    match serde_json::from_str::<serde_json::Value>(text) {
      Ok(serde_json::Value::Object(map)) => map,
      Ok(_) | Err(_) => {
        warn!("Document {}/{} holds malformed JSON; treating it as empty", collection, id);
        Fields::new()
      }
    }
  }

  fn load_snapshot(db: &DbConnection, collection: &str) -> Result<Snapshot, BoardError> {
    let mut stmt = db.prepare(
      "SELECT id, fields_json FROM documents WHERE collection = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![collection], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut documents = Vec::new();
    for row in rows {
      let (id, text) = row?;
      let fields = Self::decode_fields(collection, &id, &text);
      documents.push(Document::new(id, fields));
    }
    Ok(Snapshot { collection: collection.to_string(), documents })
  }

  fn publish(&self, collection: &str) {
    if !self.observers.has_observers(collection) {
      return;
    }
    let snapshot = {
      let db = self.db.lock();
      Self::load_snapshot(&db, collection)
    };
    match snapshot {
      Ok(snapshot) => self.observers.notify(&snapshot),
      Err(e) => {
        error!("Failed to load snapshot of '{}' for observers: {}", collection, e);
        self.observers.notify_error(collection, &e);
      }
    }
  }
}

impl DocumentStore for SqliteStore {
  fn get_all(&self, collection: &str) -> Result<Snapshot, BoardError> {
    let db = self.db.lock();
    Self::load_snapshot(&db, collection)
  }

  fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BoardError> {
    let db = self.db.lock();
    let text: Option<String> = db
      .query_row(
        "SELECT fields_json FROM documents WHERE collection = ?1 AND id = ?2",
        params![collection, id],
        |row| row.get(0),
      )
      .optional()?;
    Ok(text.map(|t| Document::new(id, Self::decode_fields(collection, id, &t))))
  }

  fn subscribe(&self, collection: &str, observer: Arc<dyn SnapshotObserver>) -> Result<ObserverId, BoardError> {
    let snapshot = self.get_all(collection)?;
    let observer_id = self.observers.add(collection, &observer);
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
      let mut db = self.db.lock();
      let tx = db.transaction()?;
      let existing: Option<String> = tx
        .query_row(
          "SELECT fields_json FROM documents WHERE collection = ?1 AND id = ?2",
          params![collection, id],
          |row| row.get(0),
        )
        .optional()?;
      let mut merged = existing.map(|t| Self::decode_fields(collection, id, &t)).unwrap_or_default();
      for (k, v) in fields {
        merged.insert(k, v);
      }
      let text = serde_json::to_string(&merged)?;
      tx.execute(
        "INSERT INTO documents (collection, id, fields_json, written_unix_ms) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET fields_json = excluded.fields_json,
                                                         written_unix_ms = excluded.written_unix_ms",
        params![collection, id, text, Utc::now().timestamp_millis()],
      )?;
      tx.commit()?;
    }
    debug!("Upserted {}/{}", collection, id);
    self.publish(collection);
    Ok(())
  }

  fn delete(&self, collection: &str, id: &str) -> Result<bool, BoardError> {
    check_key(collection, id)?;
    let deleted = {
      let db = self.db.lock();
      db.execute("DELETE FROM documents WHERE collection = ?1 AND id = ?2", params![collection, id])?
    };
    if deleted > 0 {
      debug!("Deleted {}/{}", collection, id);
      self.publish(collection);
    }
    Ok(deleted > 0)
  }

  fn poll_changes(&self) -> Result<(), BoardError> {
    let current = {
      let db = self.db.lock();
      Self::data_version(&db)?
    };
    let changed = {
      let mut last = self.last_data_version.lock();
      let changed = *last != current;
      *last = current;
      changed
    };
    if changed {
      debug!("External change detected (data_version {}); refreshing observers", current);
      for collection in self.observers.observed_collections() {
        self.publish(&collection);
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{NEWS_COLLECTION, STOCKS_COLLECTION};
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Counter {
    calls: AtomicUsize,
  }

  impl SnapshotObserver for Counter {
    fn on_snapshot(&self, _snapshot: &Snapshot) {
      self.calls.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn fields(v: serde_json::Value) -> Fields {
    v.as_object().unwrap().clone()
  }

  #[test]
  fn test_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.db");
    {
      let store = SqliteStore::open(&path).unwrap();
      store.upsert(STOCKS_COLLECTION, "acme", fields(json!({"name": "Acme", "basePrice": 1000}))).unwrap();
      store.upsert(STOCKS_COLLECTION, "acme", fields(json!({"deltaPct": 5}))).unwrap();
    }
    let store = SqliteStore::open(&path).unwrap();
    let doc = store.get(STOCKS_COLLECTION, "acme").unwrap().unwrap();
    assert_eq!(doc.get("name"), Some(&json!("Acme")));
    assert_eq!(doc.get("deltaPct"), Some(&json!(5)));
    assert!(store.get(STOCKS_COLLECTION, "other").unwrap().is_none());
  }

  #[test]
  fn test_delete_and_snapshot_order() {
    let store = SqliteStore::open_in_memory().unwrap();
    for id in ["n2", "n1"] {
      store.upsert(NEWS_COLLECTION, id, Fields::new()).unwrap();
    }
    let ids: Vec<_> = store.get_all(NEWS_COLLECTION).unwrap().documents.into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["n1", "n2"]);
    assert!(store.delete(NEWS_COLLECTION, "n1").unwrap());
    assert!(!store.delete(NEWS_COLLECTION, "n1").unwrap());
    assert_eq!(store.get_all(NEWS_COLLECTION).unwrap().len(), 1);
  }

  #[test]
  fn test_poll_sees_other_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let runner_side = SqliteStore::open(&path).unwrap();
    let admin_side = SqliteStore::open(&path).unwrap();

    let counter = Arc::new(Counter { calls: AtomicUsize::new(0) });
    runner_side.subscribe(STOCKS_COLLECTION, counter.clone()).unwrap();
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);

    runner_side.poll_changes().unwrap();
    let baseline = counter.calls.load(Ordering::SeqCst);
    runner_side.poll_changes().unwrap();
    assert_eq!(counter.calls.load(Ordering::SeqCst), baseline);

    admin_side.upsert(STOCKS_COLLECTION, "acme", Fields::new()).unwrap();
    runner_side.poll_changes().unwrap();
    assert_eq!(counter.calls.load(Ordering::SeqCst), baseline + 1);
    assert_eq!(runner_side.get_all(STOCKS_COLLECTION).unwrap().len(), 1);
  }
}
