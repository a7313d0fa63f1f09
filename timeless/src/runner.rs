// timeless/src/runner.rs

//! The runner screen as a long-lived session.
//!
//! A [`RunnerSession`] subscribes to the news and stocks collections, keeps the last
//! snapshot of each, and re-derives the [`RunnerView`] whenever a snapshot is pushed and on
//! every clock tick. The tick matters because time alone changes the view: a news slot
//! reaches its publish time, or a scheduled delta its apply time, without any write.
//!
//! Views are delivered as [`RunnerEvent`]s over a channel, only when their content differs
//! from the previously emitted one.
//!
//! # Example
//!
//! ```no_run
//! use timeless::{BoardConfig, MemoryStore, RunnerEvent, RunnerSession};
//!
//! fn main() -> Result<(), timeless::BoardError> {
//!     let store = MemoryStore::new();
//!     let mut session = RunnerSession::start(store, &BoardConfig::default())?;
//!     for event in session.events().iter().take(3) {
//!         if let RunnerEvent::ViewUpdate { view, .. } = event {
//!             print!("{}", view.render());
//!         }
//!     }
//!     session.close()?;
//!     Ok(())
//! }
//! ```

use crate::base::BoardError;
use crate::config::BoardConfig;
use crate::store::{DocumentStore, ObserverId, Snapshot, SnapshotObserver, NEWS_COLLECTION, STOCKS_COLLECTION};
use crate::view::{runner_view, RunnerView};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Events emitted by a [`RunnerSession`].
#[derive(Debug, Clone)]
pub enum RunnerEvent {
  /// The runner view changed, either from a pushed snapshot or from the clock.
  ViewUpdate {
    view: RunnerView,
    timestamp: DateTime<Utc>,
  },
  /// The store failed to deliver a snapshot or to check for changes.
  Error {
    error: BoardError,
    timestamp: DateTime<Utc>,
  },
  /// Emitted once when the session is closed.
  Closed {
    timestamp: DateTime<Utc>,
  },
}

struct SessionState {
  tz: Tz,
  event_sender: Sender<RunnerEvent>,
  is_closed: AtomicBool,
  news_cache: RwLock<Option<Snapshot>>,
  stocks_cache: RwLock<Option<Snapshot>>,
  last_view: Mutex<Option<RunnerView>>,
}

impl SessionState {
  fn store_snapshot(&self, snapshot: &Snapshot) {
    match snapshot.collection.as_str() {
      NEWS_COLLECTION => *self.news_cache.write() = Some(snapshot.clone()),
      STOCKS_COLLECTION => *self.stocks_cache.write() = Some(snapshot.clone()),
      other => warn!("RunnerSession: ignoring snapshot of unexpected collection '{}'", other),
    }
  }

  fn view_at(&self, now: DateTime<Utc>) -> RunnerView {
    let news = self.news_cache.read().clone().unwrap_or_else(|| Snapshot::empty(NEWS_COLLECTION));
    let stocks = self.stocks_cache.read().clone().unwrap_or_else(|| Snapshot::empty(STOCKS_COLLECTION));
    runner_view(&news, &stocks, now, &self.tz)
  }

  /// Recomputes the view and emits it if its content changed.
  fn refresh(&self, now: DateTime<Utc>) {
    if self.is_closed.load(Ordering::SeqCst) {
      return;
    }
    // Nothing is emitted until both collections have delivered their first snapshot.
    if self.news_cache.read().is_none() || self.stocks_cache.read().is_none() {
      return;
    }
    // The view is computed under the lock so concurrent refreshes cannot emit out of order,
    // and the clock never runs behind the view already emitted.
    let mut last = self.last_view.lock();
    let now = match last.as_ref() {
      Some(prev) if prev.as_of > now => prev.as_of,
      _ => now,
    };
    let view = self.view_at(now);
    let changed = match last.as_ref() {
      Some(prev) => prev.current_news != view.current_news || prev.board != view.board,
      None => true,
    };
    if !changed {
      trace!("RunnerSession: view unchanged at {}", now);
      return;
    }
    *last = Some(view.clone());
    if self.event_sender.send(RunnerEvent::ViewUpdate { view, timestamp: Utc::now() }).is_err() {
      warn!("RunnerSession: Failed to send ViewUpdate event, receiver likely dropped.");
    }
  }

  fn report_error(&self, error: BoardError) {
    if self.event_sender.send(RunnerEvent::Error { error, timestamp: Utc::now() }).is_err() {
      warn!("RunnerSession: Failed to send Error event, receiver likely dropped.");
    }
  }
}

struct InnerSnapshotObserver {
  state: Arc<SessionState>,
}

impl SnapshotObserver for InnerSnapshotObserver {
  fn on_snapshot(&self, snapshot: &Snapshot) {
    debug!("InnerSnapshotObserver: '{}' snapshot with {} docs", snapshot.collection, snapshot.len());
    self.state.store_snapshot(snapshot);
    self.state.refresh(Utc::now());
  }

  fn on_error(&self, collection: &str, error: &BoardError) {
    error!("InnerSnapshotObserver: store error on '{}': {}", collection, error);
    self.state.report_error(error.clone());
  }
}

/// Live runner view over a [`DocumentStore`], with a ticker thread that re-derives the view
/// every `refresh_interval`.
pub struct RunnerSession {
  store: Arc<dyn DocumentStore>,
  state: Arc<SessionState>,
  event_receiver: Receiver<RunnerEvent>,
  // The store only keeps a weak reference.
  _observer: Arc<dyn SnapshotObserver>,
  observer_ids: Vec<ObserverId>,
  stop_sender: Option<Sender<()>>,
  ticker: Option<JoinHandle<()>>,
}

impl RunnerSession {
  /// Subscribes to both collections and starts the ticker.
  ///
  /// The stores deliver the current snapshots during subscription, so the first
  /// `ViewUpdate` is already queued when this returns.
  pub fn start(store: Arc<dyn DocumentStore>, config: &BoardConfig) -> Result<Self, BoardError> {
    config.validate()?;
    info!(
      "Starting RunnerSession (zone {}, refresh every {:?})",
      config.display_timezone, config.refresh_interval
    );
    let (event_sender, event_receiver) = crossbeam_channel::unbounded();
    let state = Arc::new(SessionState {
      tz: config.timezone()?,
      event_sender,
      is_closed: AtomicBool::new(false),
      news_cache: RwLock::new(None),
      stocks_cache: RwLock::new(None),
      last_view: Mutex::new(None),
    });

    let observer: Arc<dyn SnapshotObserver> = Arc::new(InnerSnapshotObserver { state: Arc::clone(&state) });
    let mut observer_ids = Vec::with_capacity(2);
    for collection in [NEWS_COLLECTION, STOCKS_COLLECTION] {
      match store.subscribe(collection, Arc::clone(&observer)) {
        Ok(id) => observer_ids.push(id),
        Err(e) => {
          for id in observer_ids {
            store.unsubscribe(id);
          }
          return Err(e);
        }
      }
    }

    let (stop_sender, stop_receiver) = crossbeam_channel::bounded::<()>(1);
    let ticker = Self::spawn_ticker(Arc::clone(&store), Arc::clone(&state), stop_receiver, config.refresh_interval)
      .map_err(|e| {
        for id in &observer_ids {
          store.unsubscribe(*id);
        }
        e
      })?;

    Ok(RunnerSession {
      store,
      state,
      event_receiver,
      _observer: observer,
      observer_ids,
      stop_sender: Some(stop_sender),
      ticker: Some(ticker),
    })
  }

  fn spawn_ticker(
    store: Arc<dyn DocumentStore>,
    state: Arc<SessionState>,
    stop_receiver: Receiver<()>,
    interval: Duration,
  ) -> Result<JoinHandle<()>, BoardError> {
    thread::Builder::new()
      .name("board-ticker".to_string())
      .spawn(move || {
        debug!("Ticker thread started.");
        loop {
          match stop_receiver.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
              if let Err(e) = store.poll_changes() {
                error!("Ticker: failed to poll store changes: {}", e);
                state.report_error(e);
              }
              state.refresh(Utc::now());
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
          }
        }
        debug!("Ticker thread stopped.");
      })
      .map_err(|e| BoardError::InternalError(format!("Failed to spawn ticker thread: {}", e)))
  }

  /// The view at `now` from the cached snapshots, without touching the store.
  pub fn current_view(&self, now: DateTime<Utc>) -> RunnerView {
    self.state.view_at(now)
  }

  /// The most recently emitted view.
  pub fn last_emitted_view(&self) -> Option<RunnerView> {
    self.state.last_view.lock().clone()
  }

  /// Blocks until the next event.
  pub fn next_event(&self) -> Result<RunnerEvent, RecvError> {
    self.event_receiver.recv()
  }

  pub fn try_next_event(&self) -> Result<RunnerEvent, TryRecvError> {
    self.event_receiver.try_recv()
  }

  /// A clone of the event receiver, for `select!` or a separate consumer thread.
  pub fn events(&self) -> Receiver<RunnerEvent> {
    self.event_receiver.clone()
  }

  /// Unsubscribes from the store, stops the ticker and emits [`RunnerEvent::Closed`].
  /// Closing twice is a no-op.
  pub fn close(&mut self) -> Result<(), BoardError> {
    if self.state.is_closed.compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed).is_err() {
      debug!("RunnerSession already closed or being closed.");
      return Ok(());
    }
    info!("Closing RunnerSession.");

    for id in self.observer_ids.drain(..) {
      if !self.store.unsubscribe(id) {
        warn!("RunnerSession: Failed to remove observer {:?}. It might have already been removed.", id);
      }
    }

    if let Some(stop) = self.stop_sender.take() {
      let _ = stop.send(());
    }
    if let Some(handle) = self.ticker.take() {
      handle
        .join()
        .map_err(|_| BoardError::InternalError("Ticker thread panicked".to_string()))?;
    }

    if self.state.event_sender.send(RunnerEvent::Closed { timestamp: Utc::now() }).is_err() {
      debug!("RunnerSession: Could not send Closed event, receiver likely dropped.");
    }
    Ok(())
  }
}

impl Drop for RunnerSession {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      error!("Error closing RunnerSession on drop: {:?}", e);
    }
  }
}
