// timeless/src/config.rs
//! Configuration for the board binaries and the runner session.
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a valid
//! configuration. Command-line flags in the binaries override values read from the file.

use crate::base::BoardError;

use chrono_tz::Tz;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the board.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
  /// SQLite database shared by the runner and the admin console (default: timeless_board.db)
  pub db_path: PathBuf,
  /// IANA zone used for local time labels and editor values (default: Asia/Seoul)
  pub display_timezone: String,
  /// How often the runner re-derives its view without a store change (default: 1s)
  #[serde(with = "duration_millis")]
  pub refresh_interval: Duration,
  /// Base price given to newly added instruments (default: 1000)
  pub default_base_price: f64,
}

impl Default for BoardConfig {
  fn default() -> Self {
    Self {
      db_path: PathBuf::from("timeless_board.db"),
      display_timezone: "Asia/Seoul".to_string(),
      refresh_interval: Duration::from_secs(1),
      default_base_price: 1000.0,
    }
  }
}

impl BoardConfig {
  /// Reads a JSON configuration file. Missing keys keep their defaults.
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BoardError> {
    let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
      BoardError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    let config: BoardConfig = serde_json::from_str(&text)
      .map_err(|e| BoardError::ConfigurationError(format!("Invalid config {:?}: {}", path.as_ref(), e)))?;
    config.validate()?;
    info!("Loaded board configuration from {:?}", path.as_ref());
    Ok(config)
  }

  /// Loads `path` if given, otherwise the defaults.
  pub fn load(path: Option<&Path>) -> Result<Self, BoardError> {
    match path {
      Some(p) => Self::from_file(p),
      None => Ok(Self::default()),
    }
  }

  pub fn validate(&self) -> Result<(), BoardError> {
    self.timezone()?;
    if self.refresh_interval.is_zero() {
      return Err(BoardError::ConfigurationError("refresh_interval must be positive".to_string()));
    }
    if !self.default_base_price.is_finite() || self.default_base_price < 0.0 {
      return Err(BoardError::ConfigurationError(format!(
        "default_base_price must be a non-negative number, got {}", self.default_base_price
      )));
    }
    Ok(())
  }

  pub fn timezone(&self) -> Result<Tz, BoardError> {
    self.display_timezone.parse::<Tz>().map_err(|e| {
      BoardError::ConfigurationError(format!("Unknown timezone '{}': {}", self.display_timezone, e))
    })
  }
}

mod duration_millis {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults_are_valid() {
    let config = BoardConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.timezone().unwrap(), chrono_tz::Asia::Seoul);
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"display_timezone": "UTC", "refresh_interval": 250}}"#).unwrap();
    let config = BoardConfig::from_file(file.path()).unwrap();
    assert_eq!(config.display_timezone, "UTC");
    assert_eq!(config.refresh_interval, Duration::from_millis(250));
    assert_eq!(config.db_path, PathBuf::from("timeless_board.db"));
  }

  #[test]
  fn test_invalid_values_are_rejected() {
    let bad_zone = BoardConfig { display_timezone: "Mars/Olympus".to_string(), ..Default::default() };
    assert!(matches!(bad_zone.validate(), Err(BoardError::ConfigurationError(_))));
    let zero_tick = BoardConfig { refresh_interval: Duration::ZERO, ..Default::default() };
    assert!(zero_tick.validate().is_err());
    let bad_price = BoardConfig { default_base_price: -5.0, ..Default::default() };
    assert!(bad_price.validate().is_err());
    assert!(BoardConfig::from_file("/nonexistent/board.json").is_err());
  }
}
