//! Error type for `drop-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] drop_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value no longer fits its domain type.
  #[error("corrupt row: {0}")]
  Decode(String),

  /// A freshly inserted or updated row could not be read back.
  #[error("row vanished after write: {0}")]
  MissingRow(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
