// timeless/src/instrument.rs

//! Synthetic instruments and the rules that turn their raw fields into what the price
//! board shows: the effective delta at an instant, the derived price, and the display
//! filter/sort.
//!
//! A scheduled delta is never written back into `deltaPct`; the effective value is
//! recomputed from the raw fields on every call.

use crate::coerce;
use crate::store::{Document, Fields, Snapshot};
use crate::time_value::{to_instant, TimeValue};

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_BASE_PRICE: f64 = 1000.0;
pub const DEFAULT_NAME: &str = "New instrument";
pub const DEFAULT_DESCRIPTION: &str = "Description";
/// Decimal places kept in a derived price.
pub const PRICE_DECIMALS: u32 = 2;

/// One row of the price board as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
  pub id: String,
  pub name: String,
  pub description: String,
  /// Display-only grouping label.
  pub sector: Option<String>,
  pub base_price: f64,
  /// Current delta in percent.
  pub delta_pct: f64,
  pub order: Option<i64>,
  /// `None` counts as published.
  pub is_published: Option<bool>,
  /// Delta in percent that takes over once `apply_at` is reached.
  pub scheduled_delta: Option<f64>,
  pub apply_at: TimeValue,
}

impl Instrument {
  /// A freshly added instrument with the default placeholder values.
  pub fn new(id: impl Into<String>) -> Self {
    Instrument {
      id: id.into(),
      name: DEFAULT_NAME.to_string(),
      description: DEFAULT_DESCRIPTION.to_string(),
      sector: None,
      base_price: DEFAULT_BASE_PRICE,
      delta_pct: 0.0,
      order: None,
      is_published: Some(true),
      scheduled_delta: None,
      apply_at: TimeValue::Null,
    }
  }

  /// Decodes a stored document. Missing or non-numeric prices become `NaN` and resolve
  /// to an unavailable price rather than failing.
  pub fn from_document(doc: &Document) -> Instrument {
    Instrument {
      id: doc.id.clone(),
      name: coerce::text_or_empty(doc.get("name")),
      description: coerce::text_or_empty(doc.get("description")),
      sector: coerce::opt_text(doc.get("sector")),
      base_price: coerce::number_or_nan(doc.get("basePrice")),
      delta_pct: coerce::number_or_nan(doc.get("deltaPct")),
      order: coerce::opt_int(doc.get("order")),
      is_published: coerce::opt_bool(doc.get("isPublished")),
      scheduled_delta: coerce::opt_number_or_nan(doc.get("scheduledDelta")),
      apply_at: TimeValue::from_json(doc.get("applyAt")),
    }
  }

  /// Fields written when the instrument is saved. The schedule time is normalized to a
  /// store timestamp, an unset publish flag is written as `true`.
  pub fn to_fields(&self) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::String(self.name.clone()));
    fields.insert("description".to_string(), Value::String(self.description.clone()));
    if let Some(sector) = &self.sector {
      fields.insert("sector".to_string(), Value::String(sector.clone()));
    }
    fields.insert("basePrice".to_string(), coerce::number_value(self.base_price));
    fields.insert("deltaPct".to_string(), coerce::number_value(self.delta_pct));
    fields.insert("order".to_string(), self.order.map(|o| json!(o)).unwrap_or(Value::Null));
    fields.insert("isPublished".to_string(), Value::Bool(self.is_published.unwrap_or(true)));
    fields.insert(
      "scheduledDelta".to_string(),
      self.scheduled_delta.map(coerce::number_value).unwrap_or(Value::Null),
    );
    fields.insert("applyAt".to_string(), self.apply_at.to_store_json());
    fields
  }

  /// Shown on the board unless explicitly unpublished.
  pub fn is_visible(&self) -> bool {
    self.is_published != Some(false)
  }
}

/// Derived price, or the explicit marker for "cannot be computed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Price {
  Available(Decimal),
  Unavailable,
}

impl Price {
  pub fn is_available(&self) -> bool {
    matches!(self, Price::Available(_))
  }

  pub fn value(&self) -> Option<Decimal> {
    match self {
      Price::Available(d) => Some(*d),
      Price::Unavailable => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    self.value().and_then(|d| d.to_f64())
  }
}

impl fmt::Display for Price {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Price::Available(d) => write!(f, "{}", d.normalize()),
      Price::Unavailable => write!(f, "—"),
    }
  }
}

/// Where an instrument's schedule stands at an instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleState {
  /// No scheduled delta, or no usable time for it.
  Unscheduled,
  Pending { delta: f64, at: DateTime<Utc> },
  Applied { delta: f64, at: DateTime<Utc> },
}

/// Effective delta and price of one instrument at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
  pub effective_delta: f64,
  pub current_price: Price,
  pub schedule: ScheduleState,
}

pub fn schedule_state(instrument: &Instrument, now: DateTime<Utc>) -> ScheduleState {
  match (instrument.scheduled_delta, to_instant(&instrument.apply_at)) {
    (Some(delta), Some(at)) if at <= now => ScheduleState::Applied { delta, at },
    (Some(delta), Some(at)) => ScheduleState::Pending { delta, at },
    _ => ScheduleState::Unscheduled,
  }
}

/// Shortest decimal form of a float, so `0.0125` stays `0.0125` instead of picking up
/// binary noise.
fn to_decimal(n: f64) -> Option<Decimal> {
  Decimal::from_str(&n.to_string()).ok().or_else(|| Decimal::from_f64(n))
}

/// `round(base * (1 + delta / 100), 2)` in decimal arithmetic, halves rounded away from
/// zero. A base price that is not a finite non-negative number, or a non-finite delta,
/// gives [`Price::Unavailable`]. So does any value past what `Decimal` holds (about
/// 7.9e28), whether the base price itself or the product.
pub fn compute_price(base_price: f64, delta_pct: f64) -> Price {
  if !base_price.is_finite() || base_price < 0.0 || !delta_pct.is_finite() {
    return Price::Unavailable;
  }
  let (Some(base), Some(delta)) = (to_decimal(base_price), to_decimal(delta_pct)) else {
    return Price::Unavailable;
  };
  let factor = delta
    .checked_div(Decimal::ONE_HUNDRED)
    .and_then(|d| Decimal::ONE.checked_add(d));
  match factor.and_then(|f| base.checked_mul(f)) {
    Some(price) => Price::Available(
      price.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero),
    ),
    None => Price::Unavailable,
  }
}

/// Resolves the delta in force at `now` and the price derived from it.
///
/// The scheduled delta applies only when both it and its time are set and the time has
/// been reached; otherwise the current `delta_pct` is used.
pub fn resolve_instrument(instrument: &Instrument, now: DateTime<Utc>) -> Resolution {
  let schedule = schedule_state(instrument, now);
  let effective_delta = match schedule {
    ScheduleState::Applied { delta, .. } => delta,
    _ => instrument.delta_pct,
  };
  Resolution {
    effective_delta,
    current_price: compute_price(instrument.base_price, effective_delta),
    schedule,
  }
}

/// Instruments of a snapshot in fetch order.
pub fn instruments_from_snapshot(snapshot: &Snapshot) -> Vec<Instrument> {
  snapshot.documents.iter().map(Instrument::from_document).collect()
}

/// Visible instruments sorted by `order`. Ties and instruments without an order keep
/// fetch order; unordered ones come after all ordered ones.
pub fn published_board(instruments: &[Instrument]) -> Vec<&Instrument> {
  let mut board: Vec<&Instrument> = instruments.iter().filter(|i| i.is_visible()).collect();
  board.sort_by_key(|i| match i.order {
    Some(o) => (0, o),
    None => (1, 0),
  });
  board
}

/// Order for an instrument appended at the end of the board.
pub fn next_order(instruments: &[Instrument]) -> i64 {
  instruments.iter().filter_map(|i| i.order).max().unwrap_or(0).saturating_add(1)
}
