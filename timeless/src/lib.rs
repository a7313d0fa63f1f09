// timeless/src/lib.rs
// Main entry point for the board library

//! # The Timeless
//!
//! A news slot and price board dashboard with two screens sharing one document store:
//!
//! - The runner shows the one headline currently published and a board of instruments
//!   with their effective delta and derived price
//! - The admin console edits five scheduled news slots and the instrument list, including
//!   delta changes scheduled for a later time
//!
//! The core rules are pure functions: [`select_current_news`], [`resolve_instrument`] and
//! [`to_instant`]. Everything else is plumbing around a [`DocumentStore`].

mod base;
mod coerce;
pub mod config;
pub mod time_value;
pub mod news;
pub mod instrument;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod board_manager;
pub mod view;
pub mod runner;

pub use base::BoardError;
pub use board_manager::BoardManager;
pub use config::BoardConfig;
pub use instrument::{resolve_instrument, Instrument, Price, Resolution};
pub use news::{select_current_news, NewsSlot, SlotId};
pub use runner::{RunnerEvent, RunnerSession};
pub use store::{DocumentStore, Snapshot, SnapshotObserver};
pub use store_memory::MemoryStore;
pub use store_sqlite::SqliteStore;
pub use time_value::{to_instant, TimeValue};
pub use view::RunnerView;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
