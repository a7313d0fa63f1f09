// timeless/src/coerce.rs
// Basic type coercion for document fields

use serde_json::Value;

/// Number from a JSON number or a numeric string. Anything else is `None`.
pub fn opt_number(value: Option<&Value>) -> Option<f64> {
  match value? {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => {
      let s = s.trim();
      if s.is_empty() { None } else { s.parse::<f64>().ok() }
    }
    _ => None,
  }
}

/// Like [`opt_number`] but yields `NaN` instead of `None`, for required numeric fields.
pub fn number_or_nan(value: Option<&Value>) -> f64 {
  opt_number(value).unwrap_or(f64::NAN)
}

/// Optional number that was present but unreadable stays visible as `NaN`; only null or
/// absent values are `None`.
pub fn opt_number_or_nan(value: Option<&Value>) -> Option<f64> {
  match value {
    None | Some(Value::Null) => None,
    v => Some(number_or_nan(v)),
  }
}

/// Integer rank. Fractional numbers are truncated; non-finite values are `None`.
pub fn opt_int(value: Option<&Value>) -> Option<i64> {
  opt_number(value).filter(|n| n.is_finite()).map(|n| n.trunc() as i64)
}

/// Text field; non-string values are `None`.
pub fn opt_text(value: Option<&Value>) -> Option<String> {
  match value? {
    Value::String(s) => Some(s.clone()),
    _ => None,
  }
}

pub fn text_or_empty(value: Option<&Value>) -> String {
  opt_text(value).unwrap_or_default()
}

/// Boolean field; only JSON booleans count.
pub fn opt_bool(value: Option<&Value>) -> Option<bool> {
  value?.as_bool()
}

/// JSON value for a number that may be non-finite. JSON has no NaN, so those become null.
pub fn number_value(n: f64) -> Value {
  serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}
