// timeless/src/view.rs

//! Pure view models for the two screens.
//!
//! [`runner_view`] turns the latest news and stocks snapshots into what the runner shows
//! at an instant; [`admin_preview`] is the one-line "what is showing now" summary of the
//! admin console. Neither touches the store, so any snapshot pair and instant always maps
//! to the same view.

use crate::instrument::{instruments_from_snapshot, published_board, resolve_instrument, Price, ScheduleState};
use crate::news::{select_current_news, slots_from_snapshot, NewsSlot, SlotId};
use crate::store::Snapshot;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt::Write;

const UNTITLED: &str = "(untitled)";
const WAITING_HEADLINE: &str = "(waiting)";
const WAITING_BODY: &str = "News will appear here once its scheduled time is reached.";
const EMPTY_BOARD: &str = "No published instruments.";
const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sign of an effective delta, used to color the percent column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Up,
  Down,
  Flat,
}

impl Direction {
  pub fn of(delta_pct: f64) -> Direction {
    if delta_pct > 0.0 {
      Direction::Up
    } else if delta_pct < 0.0 {
      Direction::Down
    } else {
      Direction::Flat
    }
  }

  fn marker(&self) -> char {
    match self {
      Direction::Up => '▲',
      Direction::Down => '▼',
      Direction::Flat => '·',
    }
  }
}

/// The news headline currently showing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsCard {
  pub slot: SlotId,
  /// Headline, or `(untitled)` when the slot has none.
  pub headline: String,
  pub body: String,
  pub published_at: DateTime<Utc>,
  /// `published_at` in the display zone.
  pub published_label: String,
}

/// One row of the price board.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentRow {
  pub id: String,
  pub name: String,
  pub description: String,
  pub sector: Option<String>,
  pub effective_delta: f64,
  pub direction: Direction,
  pub price: Price,
  pub schedule: ScheduleState,
}

impl InstrumentRow {
  pub fn delta_text(&self) -> String {
    format_pct(self.effective_delta)
  }

  pub fn price_text(&self) -> String {
    format_price(&self.price)
  }
}

/// Everything the runner screen shows at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerView {
  pub as_of: DateTime<Utc>,
  pub current_news: Option<NewsCard>,
  pub board: Vec<InstrumentRow>,
}

/// Derives the runner view from the two collection snapshots.
pub fn runner_view(news: &Snapshot, stocks: &Snapshot, now: DateTime<Utc>, tz: &Tz) -> RunnerView {
  let slots = slots_from_snapshot(news);
  let current_news = select_current_news(&slots, now).and_then(|slot| news_card(slot, tz));

  let instruments = instruments_from_snapshot(stocks);
  let board = published_board(&instruments)
    .into_iter()
    .map(|instrument| {
      let resolution = resolve_instrument(instrument, now);
      InstrumentRow {
        id: instrument.id.clone(),
        name: instrument.name.clone(),
        description: instrument.description.clone(),
        sector: instrument.sector.clone().filter(|s| !s.trim().is_empty()),
        effective_delta: resolution.effective_delta,
        direction: Direction::of(resolution.effective_delta),
        price: resolution.current_price,
        schedule: resolution.schedule,
      }
    })
    .collect();

  RunnerView { as_of: now, current_news, board }
}

fn news_card(slot: &NewsSlot, tz: &Tz) -> Option<NewsCard> {
  let published_at = slot.publish_instant()?;
  Some(NewsCard {
    slot: slot.id,
    headline: headline_or_untitled(&slot.headline),
    body: slot.body.clone(),
    published_at,
    published_label: published_at.with_timezone(tz).format(LOCAL_TIME_FORMAT).to_string(),
  })
}

fn headline_or_untitled(headline: &str) -> String {
  if headline.trim().is_empty() {
    UNTITLED.to_string()
  } else {
    headline.to_string()
  }
}

impl RunnerView {
  /// Plain-text frame for a terminal.
  pub fn render(&self) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "THE TIMELESS");
    let _ = writeln!(out);
    let _ = writeln!(out, "== Headline ==");
    match &self.current_news {
      Some(card) => {
        let _ = writeln!(out, "[{}] {}", card.slot, card.headline);
        if !card.body.is_empty() {
          let _ = writeln!(out, "{}", card.body);
        }
        let _ = writeln!(out, "Published: {}", card.published_label);
      }
      None => {
        let _ = writeln!(out, "{}", WAITING_HEADLINE);
        let _ = writeln!(out, "{}", WAITING_BODY);
      }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "== Market ==");
    if self.board.is_empty() {
      let _ = writeln!(out, "{}", EMPTY_BOARD);
    }
    for row in &self.board {
      let name = match &row.sector {
        Some(sector) => format!("{} [{}]", row.name, sector),
        None => row.name.clone(),
      };
      let _ = writeln!(
        out,
        "{:<32} {} {:>6} {:>14}",
        name,
        row.direction.marker(),
        row.delta_text(),
        row.price_text()
      );
      if !row.description.is_empty() {
        let _ = writeln!(out, "  {}", row.description);
      }
    }
    out
  }
}

/// One-line summary of the slot that is showing at `now`.
pub fn admin_preview(slots: &[NewsSlot], now: DateTime<Utc>) -> String {
  match select_current_news(slots, now) {
    Some(slot) => format!("{} — {}", slot.id, headline_or_untitled(&slot.headline)),
    None => "No news has reached its publish time yet.".to_string(),
  }
}

/// Whole-percent delta with an explicit `+` for gains: `+5%`, `-3%`, `0%`.
pub fn format_pct(delta_pct: f64) -> String {
  if !delta_pct.is_finite() {
    return "—".to_string();
  }
  let rounded = delta_pct.round();
  if rounded == 0.0 {
    "0%".to_string()
  } else if rounded > 0.0 {
    format!("+{}%", rounded)
  } else {
    format!("{}%", rounded)
  }
}

/// Price with thousands separators and at most two decimals, `—` when unavailable.
pub fn format_price(price: &Price) -> String {
  let Some(value) = price.value() else {
    return "—".to_string();
  };
  let text = value.normalize().to_string();
  let (sign, unsigned) = match text.strip_prefix('-') {
    Some(rest) => ("-", rest),
    None => ("", text.as_str()),
  };
  let (int_part, frac_part) = match unsigned.split_once('.') {
    Some((i, f)) => (i, Some(f)),
    None => (unsigned, None),
  };
  let mut grouped = String::new();
  for (i, ch) in int_part.chars().enumerate() {
    if i > 0 && (int_part.len() - i) % 3 == 0 {
      grouped.push(',');
    }
    grouped.push(ch);
  }
  match frac_part {
    Some(f) => format!("{}{}.{}", sign, grouped, f),
    None => format!("{}{}", sign, grouped),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{Document, Fields, NEWS_COLLECTION, STOCKS_COLLECTION};
  use crate::time_value::StoreTimestamp;
  use chrono::{Duration, TimeZone};
  use rust_decimal::Decimal;
  use serde_json::json;
  use std::str::FromStr;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
  }

  fn doc(id: &str, v: serde_json::Value) -> Document {
    Document::new(id, v.as_object().cloned().unwrap_or_else(Fields::new))
  }

  fn stocks() -> Snapshot {
    Snapshot {
      collection: STOCKS_COLLECTION.to_string(),
      documents: vec![
        doc("acme", json!({"name": "Acme", "basePrice": 1000, "deltaPct": 5, "order": 2, "sector": "Tech"})),
        doc("hidden", json!({"name": "Hidden", "basePrice": 10, "deltaPct": 0, "order": 1, "isPublished": false})),
        doc("zeta", json!({
          "name": "Zeta", "basePrice": 2500, "deltaPct": 0, "order": 1,
          "scheduledDelta": -10,
          "applyAt": StoreTimestamp::from_date(now() + Duration::minutes(30)).to_json()
        })),
        doc("broken", json!({"name": "Broken", "deltaPct": 2})),
      ],
    }
  }

  fn news() -> Snapshot {
    Snapshot {
      collection: NEWS_COLLECTION.to_string(),
      documents: vec![
        doc("n1", json!({"order": 1, "headline": "Old", "publishAt": StoreTimestamp::from_date(now() - Duration::hours(2)).to_json()})),
        doc("n2", json!({"order": 2, "headline": "", "body": "Body only", "publishAt": StoreTimestamp::from_date(now() - Duration::minutes(5)).to_json()})),
        doc("n3", json!({"order": 3, "headline": "Later", "publishAt": StoreTimestamp::from_date(now() + Duration::hours(1)).to_json()})),
      ],
    }
  }

  #[test]
  fn test_runner_view_board_order_and_prices() {
    let view = runner_view(&news(), &stocks(), now(), &chrono_tz::UTC);
    let ids: Vec<&str> = view.board.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["zeta", "acme", "broken"]);

    assert_eq!(view.board[0].price_text(), "2,500");
    assert_eq!(view.board[0].direction, Direction::Flat);
    assert_eq!(view.board[1].delta_text(), "+5%");
    assert_eq!(view.board[1].price_text(), "1,050");
    assert_eq!(view.board[1].sector.as_deref(), Some("Tech"));
    assert_eq!(view.board[2].price, Price::Unavailable);
    assert_eq!(view.board[2].price_text(), "—");
  }

  #[test]
  fn test_runner_view_follows_schedule_without_writes() {
    let later = now() + Duration::hours(1);
    let view = runner_view(&news(), &stocks(), later, &chrono_tz::UTC);
    let zeta = &view.board[0];
    assert_eq!(zeta.effective_delta, -10.0);
    assert_eq!(zeta.direction, Direction::Down);
    assert_eq!(zeta.price_text(), "2,250");
    assert_eq!(view.current_news.unwrap().headline, "Later");
  }

  #[test]
  fn test_news_card_labels() {
    let view = runner_view(&news(), &Snapshot::empty(STOCKS_COLLECTION), now(), &chrono_tz::Asia::Seoul);
    let card = view.current_news.clone().unwrap();
    assert_eq!(card.slot, SlotId::N2);
    assert_eq!(card.headline, "(untitled)");
    assert_eq!(card.published_label, "2024-06-01 20:55:00");
    assert!(view.board.is_empty());
    assert!(view.render().contains("No published instruments."));
  }

  #[test]
  fn test_waiting_frame() {
    let view = runner_view(&Snapshot::empty(NEWS_COLLECTION), &stocks(), now(), &chrono_tz::UTC);
    assert_eq!(view.current_news, None);
    let frame = view.render();
    assert!(frame.contains("(waiting)"));
    assert!(frame.contains("Acme [Tech]"));
  }

  #[test]
  fn test_admin_preview() {
    let slots = slots_from_snapshot(&news());
    assert_eq!(admin_preview(&slots, now()), "N2 — (untitled)");
    assert_eq!(admin_preview(&slots, now() + Duration::hours(2)), "N3 — Later");
    assert_eq!(admin_preview(&slots, now() - Duration::days(1)), "No news has reached its publish time yet.");
  }

  #[test]
  fn test_format_pct() {
    assert_eq!(format_pct(5.0), "+5%");
    assert_eq!(format_pct(-3.0), "-3%");
    assert_eq!(format_pct(0.0), "0%");
    assert_eq!(format_pct(-0.4), "0%");
    assert_eq!(format_pct(2.5), "+3%");
    assert_eq!(format_pct(f64::NAN), "—");
  }

  #[test]
  fn test_format_price() {
    let p = |s: &str| Price::Available(Decimal::from_str(s).unwrap());
    assert_eq!(format_price(&p("1234567.50")), "1,234,567.5");
    assert_eq!(format_price(&p("999.99")), "999.99");
    assert_eq!(format_price(&p("1000.00")), "1,000");
    assert_eq!(format_price(&p("0")), "0");
    assert_eq!(format_price(&p("-1234.5")), "-1,234.5");
    assert_eq!(format_price(&Price::Unavailable), "—");
  }
}
