//! Content bundles ("drops") and the assets they own.
//!
//! A bundle is published once for a calendar period and never edited
//! afterwards; the only permitted change is attaching more assets.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Period ──────────────────────────────────────────────────────────────────

/// The calendar month a bundle belongs to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub struct Period {
  // Field order gives chronological `Ord`.
  pub year:  i32,
  pub month: u32,
}

impl Period {
  pub fn new(month: u32, year: i32) -> Result<Self> {
    if !(1..=12).contains(&month) {
      return Err(Error::InvalidPeriod { month, year });
    }
    Ok(Self { year, month })
  }

  /// The period containing `at` (UTC).
  pub fn containing(at: DateTime<Utc>) -> Self {
    Self { year: at.year(), month: at.month() }
  }
}

impl fmt::Display for Period {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04}-{:02}", self.year, self.month)
  }
}

// ─── Bundle ──────────────────────────────────────────────────────────────────

/// A published content bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBundle {
  pub bundle_id:    Uuid,
  pub title:        String,
  pub period:       Period,
  /// Unlock price in the currency's minor unit.
  pub price_cents:  i64,
  /// ISO 4217 code, e.g. `"USD"`.
  pub currency:     String,
  pub published_at: DateTime<Utc>,
}

/// Input to [`crate::store::DropStore::publish_bundle`].
#[derive(Debug, Clone)]
pub struct NewBundle {
  pub title:       String,
  pub period:      Period,
  pub price_cents: i64,
  pub currency:    String,
}

// ─── Asset ───────────────────────────────────────────────────────────────────

/// What an asset is, which decides whether it needs an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
  Preview,
  /// Full-resolution master.
  Master,
  /// Print-ready export.
  Print,
  /// Archive of the whole bundle.
  Archive,
}

impl AssetKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Preview => "preview",
      Self::Master => "master",
      Self::Print => "print",
      Self::Archive => "archive",
    }
  }

  /// Previews are public; everything else is gated by the ledger.
  pub fn requires_entitlement(&self) -> bool { !matches!(self, Self::Preview) }
}

impl fmt::Display for AssetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AssetKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "preview" => Ok(Self::Preview),
      "master" => Ok(Self::Master),
      "print" => Ok(Self::Print),
      "archive" => Ok(Self::Archive),
      other => Err(Error::UnknownAssetKind(other.to_owned())),
    }
  }
}

/// A downloadable file belonging to exactly one bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
  pub asset_id:     Uuid,
  pub bundle_id:    Uuid,
  pub kind:         AssetKind,
  pub size_bytes:   u64,
  pub content_type: String,
  /// Blob-store key. Never sent to clients.
  #[serde(skip_serializing)]
  pub locator:      String,
}

/// Input to [`crate::store::DropStore::add_asset`].
#[derive(Debug, Clone)]
pub struct NewAsset {
  pub bundle_id:    Uuid,
  pub kind:         AssetKind,
  pub size_bytes:   u64,
  pub content_type: String,
  pub locator:      String,
}
