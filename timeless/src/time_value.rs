// timeless/src/time_value.rs

//! Normalizes the time shapes that reach the board into a single instant type.
//!
//! Documents written by different tools carry times in different shapes: a store-native
//! timestamp (`{"seconds": .., "nanoseconds": ..}`), a date/time string, or nothing at all.
//! Editors additionally hold native `DateTime<Utc>` values. [`TimeValue`] captures all of
//! them and [`to_instant`] is the one place that turns them into `Option<DateTime<Utc>>`.
//!
//! Coercion is total: unparseable input yields `None`, which callers treat as
//! "not scheduled".

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Formats accepted for date/time text without an explicit offset.
const NAIVE_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M",
];

/// Form value layout used by the admin editor (`datetime-local` style).
const INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Capability of converting a store-native value into a date.
pub trait ToDate {
  fn to_date(&self) -> Option<DateTime<Utc>>;
}

/// Store-native timestamp: seconds since the Unix epoch plus a nanosecond remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreTimestamp {
  pub seconds: i64,
  #[serde(default)]
  pub nanoseconds: u32,
}

impl StoreTimestamp {
  pub fn from_date(date: DateTime<Utc>) -> Self {
    StoreTimestamp {
      seconds: date.timestamp(),
      nanoseconds: date.timestamp_subsec_nanos(),
    }
  }

  /// Timestamp for "now", used for `updatedAt` stamps.
  pub fn now() -> Self {
    Self::from_date(Utc::now())
  }

  pub fn to_json(&self) -> Value {
    json!({ "seconds": self.seconds, "nanoseconds": self.nanoseconds })
  }

  /// Reads the wire shape. Both `seconds`/`nanoseconds` and the underscored
  /// `_seconds`/`_nanoseconds` spelling are accepted.
  pub fn from_json(value: &Value) -> Option<Self> {
    let obj = value.as_object()?;
    let seconds = obj.get("seconds").or_else(|| obj.get("_seconds"))?.as_i64()?;
    let nanoseconds = match obj.get("nanoseconds").or_else(|| obj.get("_nanoseconds")) {
      Some(n) => u32::try_from(n.as_u64()?).ok()?,
      None => 0,
    };
    Some(StoreTimestamp { seconds, nanoseconds })
  }
}

impl ToDate for StoreTimestamp {
  fn to_date(&self) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(self.seconds, self.nanoseconds).single()
  }
}

/// A raw time value as it was found in a document or an editor.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TimeValue {
  /// Store-native timestamp.
  Store(StoreTimestamp),
  /// Native date, typically produced by an editor.
  Date(DateTime<Utc>),
  /// Date/time text of unknown validity.
  Text(String),
  /// Null or absent.
  #[default]
  Null,
}

impl TimeValue {
  /// Decodes a document field. Shapes other than timestamp objects and strings are
  /// treated as null.
  pub fn from_json(value: Option<&Value>) -> TimeValue {
    match value {
      None | Some(Value::Null) => TimeValue::Null,
      Some(Value::String(s)) => TimeValue::Text(s.clone()),
      Some(v @ Value::Object(_)) => match StoreTimestamp::from_json(v) {
        Some(ts) => TimeValue::Store(ts),
        None => TimeValue::Null,
      },
      Some(_) => TimeValue::Null,
    }
  }

  /// Normalized field value for writing: a store timestamp when the value coerces to an
  /// instant, null otherwise.
  pub fn to_store_json(&self) -> Value {
    match to_instant(self) {
      Some(d) => StoreTimestamp::from_date(d).to_json(),
      None => Value::Null,
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, TimeValue::Null)
  }
}

impl From<DateTime<Utc>> for TimeValue {
  fn from(d: DateTime<Utc>) -> Self {
    TimeValue::Date(d)
  }
}

impl From<Option<DateTime<Utc>>> for TimeValue {
  fn from(d: Option<DateTime<Utc>>) -> Self {
    d.map(TimeValue::Date).unwrap_or(TimeValue::Null)
  }
}

/// Coerces any raw time value into an instant.
///
/// Text is tried as RFC 3339 first, then as a naive date/time (taken as UTC), then as a
/// plain `YYYY-MM-DD` date at UTC midnight. Returns `None` for anything else.
pub fn to_instant(raw: &TimeValue) -> Option<DateTime<Utc>> {
  match raw {
    TimeValue::Store(ts) => ts.to_date(),
    TimeValue::Date(d) => Some(*d),
    TimeValue::Text(s) => parse_text(s),
    TimeValue::Null => None,
  }
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
  let text = text.trim();
  if text.is_empty() {
    return None;
  }
  if let Ok(d) = DateTime::parse_from_rfc3339(text) {
    return Some(d.with_timezone(&Utc));
  }
  for fmt in NAIVE_FORMATS {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(text, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

/// Renders an instant as the editor's `YYYY-MM-DDTHH:MM` value in `tz`.
pub fn to_input_value(date: DateTime<Utc>, tz: &Tz) -> String {
  date.with_timezone(tz).format(INPUT_FORMAT).to_string()
}

/// Parses an editor value (`YYYY-MM-DDTHH:MM`, seconds optional) as local time in `tz`.
/// Empty input clears the value. Ambiguous local times take the earlier instant; local
/// times skipped by a DST jump yield `None`.
pub fn from_input_value(value: &str, tz: &Tz) -> Option<DateTime<Utc>> {
  let value = value.trim();
  if value.is_empty() {
    return None;
  }
  let naive = NaiveDateTime::parse_from_str(value, INPUT_FORMAT)
    .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
    .ok()?;
  tz.from_local_datetime(&naive).earliest().map(|d| d.with_timezone(&Utc))
}

/// Editor value for a raw time; empty when it does not coerce to an instant.
pub fn input_value_of(raw: &TimeValue, tz: &Tz) -> String {
  to_instant(raw).map(|d| to_input_value(d, tz)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_store_timestamp_coerces() {
    let raw = TimeValue::from_json(Some(&json!({"seconds": 1_700_000_000, "nanoseconds": 500})));
    let d = to_instant(&raw).unwrap();
    assert_eq!(d.timestamp(), 1_700_000_000);
    assert_eq!(d.timestamp_subsec_nanos(), 500);

    let underscored = TimeValue::from_json(Some(&json!({"_seconds": 10, "_nanoseconds": 0})));
    assert_eq!(to_instant(&underscored).unwrap().timestamp(), 10);
  }

  #[test]
  fn test_text_shapes() {
    let rfc = TimeValue::Text("2024-05-01T09:30:00+09:00".to_string());
    assert_eq!(to_instant(&rfc).unwrap(), Utc.with_ymd_and_hms(2024, 5, 1, 0, 30, 0).unwrap());

    let naive = TimeValue::Text("2024-05-01T09:30".to_string());
    assert_eq!(to_instant(&naive).unwrap(), Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap());

    let date_only = TimeValue::Text("2024-05-01".to_string());
    assert_eq!(to_instant(&date_only).unwrap(), Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
  }

  #[test]
  fn test_malformed_input_is_none() {
    assert_eq!(to_instant(&TimeValue::Text("not a date".to_string())), None);
    assert_eq!(to_instant(&TimeValue::Text("".to_string())), None);
    assert_eq!(to_instant(&TimeValue::Null), None);
    assert_eq!(TimeValue::from_json(Some(&json!(12345))), TimeValue::Null);
    assert_eq!(TimeValue::from_json(Some(&json!({"foo": 1}))), TimeValue::Null);
    assert_eq!(TimeValue::from_json(Some(&json!({"seconds": "x"}))), TimeValue::Null);
    assert_eq!(TimeValue::from_json(None), TimeValue::Null);
  }

  #[test]
  fn test_input_value_in_zone() {
    let tz: Tz = "Asia/Seoul".parse().unwrap();
    let d = from_input_value("2024-05-01T09:30", &tz).unwrap();
    assert_eq!(d, Utc.with_ymd_and_hms(2024, 5, 1, 0, 30, 0).unwrap());
    assert_eq!(to_input_value(d, &tz), "2024-05-01T09:30");
    assert_eq!(from_input_value("  ", &tz), None);
    assert_eq!(from_input_value("tomorrow", &tz), None);
  }

  #[test]
  fn test_input_value_of_raw() {
    let tz = chrono_tz::UTC;
    let d = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 0).unwrap();
    assert_eq!(input_value_of(&TimeValue::Store(StoreTimestamp::from_date(d)), &tz), "2024-01-02T03:04");
    assert_eq!(input_value_of(&TimeValue::Text("draft".to_string()), &tz), "");
    assert_eq!(input_value_of(&TimeValue::Null, &tz), "");
  }

  #[test]
  fn test_store_json_normalizes() {
    let d = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(TimeValue::Date(d).to_store_json(), json!({"seconds": d.timestamp(), "nanoseconds": 0}));
    assert_eq!(TimeValue::Text("garbage".to_string()).to_store_json(), Value::Null);
  }
}
