//! Error types for `drop-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid email address")]
  InvalidEmail,

  #[error("invalid period: month {month}, year {year}")]
  InvalidPeriod { month: u32, year: i32 },

  #[error("unknown asset kind: {0:?}")]
  UnknownAssetKind(String),

  #[error("unknown ledger source: {0:?}")]
  UnknownSource(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
