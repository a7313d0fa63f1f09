// timeless/src/news.rs

//! The five scheduled news slots and the rule that picks the one currently showing.

use crate::base::BoardError;
use crate::coerce;
use crate::store::{Document, Fields, Snapshot};
use crate::time_value::{to_instant, TimeValue};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::fmt;

/// Number of news slots. Slots are provisioned once and never added or removed.
pub const SLOT_COUNT: usize = 5;

/// Fixed key of a news slot, `n1` through `n5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotId {
  N1,
  N2,
  N3,
  N4,
  N5,
}

impl SlotId {
  pub const ALL: [SlotId; SLOT_COUNT] = [SlotId::N1, SlotId::N2, SlotId::N3, SlotId::N4, SlotId::N5];

  /// Document key in the news collection.
  pub fn key(&self) -> &'static str {
    match self {
      SlotId::N1 => "n1",
      SlotId::N2 => "n2",
      SlotId::N3 => "n3",
      SlotId::N4 => "n4",
      SlotId::N5 => "n5",
    }
  }

  /// Default rank, 1 through 5.
  pub fn rank(&self) -> i64 {
    *self as i64 + 1
  }

  pub fn from_key(key: &str) -> Option<SlotId> {
    SlotId::ALL.iter().copied().find(|s| s.key() == key)
  }

  /// Accepts `n3`, `N3`, or `3`.
  pub fn parse(text: &str) -> Result<SlotId, BoardError> {
    let t = text.trim().to_ascii_lowercase();
    let key = if t.starts_with('n') { t } else { format!("n{}", t) };
    SlotId::from_key(&key)
      .ok_or_else(|| BoardError::InvalidParameter(format!("unknown news slot '{}', expected n1..n5", text)))
  }
}

impl fmt::Display for SlotId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.key().to_ascii_uppercase())
  }
}

/// One news announcement container.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsSlot {
  pub id: SlotId,
  pub order: i64,
  pub headline: String,
  pub body: String,
  /// Raw publish time; a slot whose value does not coerce to an instant is never shown.
  pub publish_at: TimeValue,
}

impl NewsSlot {
  pub fn empty(id: SlotId) -> Self {
    NewsSlot {
      id,
      order: id.rank(),
      headline: String::new(),
      body: String::new(),
      publish_at: TimeValue::Null,
    }
  }

  pub fn publish_instant(&self) -> Option<DateTime<Utc>> {
    to_instant(&self.publish_at)
  }

  /// Decodes a news document. Documents whose id is not a slot key are ignored.
  pub fn from_document(doc: &Document) -> Option<NewsSlot> {
    let id = SlotId::from_key(&doc.id)?;
    Some(NewsSlot {
      id,
      order: coerce::opt_int(doc.get("order")).unwrap_or_else(|| id.rank()),
      headline: coerce::text_or_empty(doc.get("headline")),
      body: coerce::text_or_empty(doc.get("body")),
      publish_at: TimeValue::from_json(doc.get("publishAt")),
    })
  }

  /// Fields written for this slot. The publish time is normalized to a store timestamp.
  pub fn to_fields(&self) -> Fields {
    let mut fields = Fields::new();
    fields.insert("order".to_string(), json!(self.order));
    fields.insert("headline".to_string(), Value::String(self.headline.clone()));
    fields.insert("body".to_string(), Value::String(self.body.clone()));
    fields.insert("publishAt".to_string(), self.publish_at.to_store_json());
    fields
  }
}

/// The five empty slots every board starts with.
pub fn initial_slots() -> Vec<NewsSlot> {
  SlotId::ALL.iter().map(|id| NewsSlot::empty(*id)).collect()
}

/// Slots from a news snapshot, merged over the empty defaults so that exactly five come
/// back, sorted by `order` and then slot key.
pub fn slots_from_snapshot(snapshot: &Snapshot) -> Vec<NewsSlot> {
  let mut slots: Vec<NewsSlot> = initial_slots()
    .into_iter()
    .map(|slot| {
      snapshot
        .find(slot.id.key())
        .and_then(NewsSlot::from_document)
        .unwrap_or(slot)
    })
    .collect();
  slots.sort_by_key(|s| (s.order, s.id));
  slots
}

/// Picks the slot currently showing at `now`.
///
/// Only slots whose publish time has been reached qualify; among them the latest publish
/// time wins regardless of slot order, so a later announcement preempts an earlier one as
/// soon as its time arrives. Equal publish times go to the highest `order`, then the
/// highest slot key.
pub fn select_current_news(slots: &[NewsSlot], now: DateTime<Utc>) -> Option<&NewsSlot> {
  slots
    .iter()
    .filter_map(|slot| slot.publish_instant().map(|at| (at, slot)))
    .filter(|(at, _)| *at <= now)
    .max_by_key(|(at, slot)| (*at, slot.order, slot.id))
    .map(|(_, slot)| slot)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::NEWS_COLLECTION;
  use crate::time_value::StoreTimestamp;
  use chrono::{Duration, TimeZone};

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
  }

  fn slot(id: SlotId, headline: &str, at: Option<DateTime<Utc>>) -> NewsSlot {
    NewsSlot { headline: headline.to_string(), publish_at: at.into(), ..NewsSlot::empty(id) }
  }

  #[test]
  fn test_no_publish_times_selects_nothing() {
    assert_eq!(select_current_news(&initial_slots(), now()), None);
    assert_eq!(select_current_news(&[], now()), None);
  }

  #[test]
  fn test_single_reached_slot_is_selected() {
    let slots = vec![
      slot(SlotId::N1, "future", Some(now() + Duration::hours(1))),
      slot(SlotId::N2, "reached", Some(now() - Duration::minutes(5))),
      slot(SlotId::N3, "unset", None),
    ];
    assert_eq!(select_current_news(&slots, now()).unwrap().headline, "reached");
  }

  #[test]
  fn test_latest_reached_time_wins_regardless_of_order() {
    let slots = vec![
      slot(SlotId::N1, "later", Some(now() - Duration::minutes(1))),
      slot(SlotId::N5, "earlier", Some(now() - Duration::hours(2))),
    ];
    assert_eq!(select_current_news(&slots, now()).unwrap().id, SlotId::N1);

    let exact = vec![slot(SlotId::N2, "exact", Some(now()))];
    assert_eq!(select_current_news(&exact, now()).unwrap().headline, "exact");
  }

  #[test]
  fn test_equal_times_go_to_highest_order() {
    let at = Some(now() - Duration::minutes(3));
    let slots = vec![slot(SlotId::N4, "four", at), slot(SlotId::N2, "two", at)];
    assert_eq!(select_current_news(&slots, now()).unwrap().id, SlotId::N4);
  }

  #[test]
  fn test_equal_time_and_order_go_to_highest_slot() {
    let at = Some(now() - Duration::minutes(3));
    let mut four = slot(SlotId::N4, "four", at);
    let mut two = slot(SlotId::N2, "two", at);
    four.order = 3;
    two.order = 3;
    assert_eq!(select_current_news(&[four.clone(), two.clone()], now()).unwrap().id, SlotId::N4);
    assert_eq!(select_current_news(&[two, four], now()).unwrap().id, SlotId::N4);
  }

  #[test]
  fn test_malformed_publish_time_is_never_eligible() {
    let mut s = NewsSlot::empty(SlotId::N1);
    s.publish_at = TimeValue::Text("soon".to_string());
    assert_eq!(select_current_news(&[s], now()), None);
  }

  #[test]
  fn test_selection_is_idempotent() {
    let slots = vec![
      slot(SlotId::N1, "a", Some(now() - Duration::minutes(10))),
      slot(SlotId::N2, "b", Some(now() - Duration::minutes(1))),
    ];
    let before = slots.clone();
    let first = select_current_news(&slots, now()).cloned();
    let second = select_current_news(&slots, now()).cloned();
    assert_eq!(first, second);
    assert_eq!(slots, before);
  }

  #[test]
  fn test_snapshot_merges_over_defaults() {
    let at = now() - Duration::minutes(1);
    let mut snapshot = Snapshot::empty(NEWS_COLLECTION);
    let mut fields = Fields::new();
    fields.insert("order".to_string(), json!(3));
    fields.insert("headline".to_string(), json!("Markets open"));
    fields.insert("publishAt".to_string(), StoreTimestamp::from_date(at).to_json());
    snapshot.documents.push(Document::new("n3", fields));
    snapshot.documents.push(Document::new("stray", Fields::new()));

    let slots = slots_from_snapshot(&snapshot);
    assert_eq!(slots.len(), SLOT_COUNT);
    assert_eq!(slots[2].headline, "Markets open");
    assert_eq!(slots[2].publish_instant(), Some(at));
    assert_eq!(slots[0], NewsSlot::empty(SlotId::N1));
  }

  #[test]
  fn test_slot_id_parse() {
    assert_eq!(SlotId::parse("N2").unwrap(), SlotId::N2);
    assert_eq!(SlotId::parse("5").unwrap(), SlotId::N5);
    assert!(SlotId::parse("n6").is_err());
    assert_eq!(SlotId::N3.to_string(), "N3");
  }
}
