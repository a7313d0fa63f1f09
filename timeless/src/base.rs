// timeless/src/base.rs
// Error definitions shared by the stores, the board manager and the runner

use thiserror::Error;

/// Errors that can occur while reading or editing the board
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoardError {
  #[error("Configuration error: {0}")]
  ConfigurationError(String),

  #[error("Store error: {0}")]
  StoreError(String),

  #[error("Document not found: {collection}/{id}")]
  NotFound { collection: String, id: String },

  #[error("Invalid parameter: {0}")]
  InvalidParameter(String),

  #[error("Parse error: {0}")]
  ParseError(String),

  #[error("Internal error: {0}")]
  InternalError(String),
}

impl From<rusqlite::Error> for BoardError {
  fn from(e: rusqlite::Error) -> Self {
    BoardError::StoreError(e.to_string())
  }
}

impl From<serde_json::Error> for BoardError {
  fn from(e: serde_json::Error) -> Self {
    BoardError::ParseError(e.to_string())
  }
}
