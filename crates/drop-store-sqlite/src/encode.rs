//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Enums are stored as their snake_case names.

use chrono::{DateTime, Utc};
use drop_core::{
  bundle::{Asset, AssetKind, ContentBundle, Period},
  ledger::{GrantSource, LedgerEntry},
  session::Session,
  user::{Email, User},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `users` row.
pub struct RawUser {
  pub user_id:    String,
  pub email:      String,
  pub created_at: String,
}

impl RawUser {
  pub const COLUMNS: &'static str = "user_id, email, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:    row.get(0)?,
      email:      row.get(1)?,
      created_at: row.get(2)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:    decode_uuid(&self.user_id)?,
      email:      Email::parse(&self.email)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `sessions` row.
pub struct RawSession {
  pub token_hash:     String,
  pub user_id:        String,
  pub created_at:     String,
  pub expires_at:     String,
  pub invalidated_at: Option<String>,
}

impl RawSession {
  pub const COLUMNS: &'static str =
    "token_hash, user_id, created_at, expires_at, invalidated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      token_hash:     row.get(0)?,
      user_id:        row.get(1)?,
      created_at:     row.get(2)?,
      expires_at:     row.get(3)?,
      invalidated_at: row.get(4)?,
    })
  }

  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      token_hash:     self.token_hash,
      user_id:        decode_uuid(&self.user_id)?,
      created_at:     decode_dt(&self.created_at)?,
      expires_at:     decode_dt(&self.expires_at)?,
      invalidated_at: self.invalidated_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw values read directly from a `bundles` row.
pub struct RawBundle {
  pub bundle_id:    String,
  pub title:        String,
  pub period_year:  i64,
  pub period_month: i64,
  pub price_cents:  i64,
  pub currency:     String,
  pub published_at: String,
}

impl RawBundle {
  pub const COLUMNS: &'static str =
    "bundle_id, title, period_year, period_month, price_cents, currency, published_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      bundle_id:    row.get(0)?,
      title:        row.get(1)?,
      period_year:  row.get(2)?,
      period_month: row.get(3)?,
      price_cents:  row.get(4)?,
      currency:     row.get(5)?,
      published_at: row.get(6)?,
    })
  }

  pub fn into_bundle(self) -> Result<ContentBundle> {
    let year = i32::try_from(self.period_year)
      .map_err(|_| Error::Decode(format!("year {}", self.period_year)))?;
    let month = u32::try_from(self.period_month)
      .map_err(|_| Error::Decode(format!("month {}", self.period_month)))?;

    Ok(ContentBundle {
      bundle_id:    decode_uuid(&self.bundle_id)?,
      title:        self.title,
      period:       Period::new(month, year)?,
      price_cents:  self.price_cents,
      currency:     self.currency,
      published_at: decode_dt(&self.published_at)?,
    })
  }
}

/// Raw values read directly from an `assets` row.
pub struct RawAsset {
  pub asset_id:     String,
  pub bundle_id:    String,
  pub kind:         String,
  pub size_bytes:   i64,
  pub content_type: String,
  pub locator:      String,
}

impl RawAsset {
  pub const COLUMNS: &'static str =
    "asset_id, bundle_id, kind, size_bytes, content_type, locator";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      asset_id:     row.get(0)?,
      bundle_id:    row.get(1)?,
      kind:         row.get(2)?,
      size_bytes:   row.get(3)?,
      content_type: row.get(4)?,
      locator:      row.get(5)?,
    })
  }

  pub fn into_asset(self) -> Result<Asset> {
    Ok(Asset {
      asset_id:     decode_uuid(&self.asset_id)?,
      bundle_id:    decode_uuid(&self.bundle_id)?,
      kind:         self.kind.parse::<AssetKind>()?,
      size_bytes:   u64::try_from(self.size_bytes)
        .map_err(|_| Error::Decode(format!("size {}", self.size_bytes)))?,
      content_type: self.content_type,
      locator:      self.locator,
    })
  }
}

/// Raw values read directly from a `ledger` row.
pub struct RawEntry {
  pub entry_id:           String,
  pub user_id:            String,
  pub bundle_id:          String,
  pub source:             String,
  pub external_reference: String,
  pub recorded_at:        String,
}

impl RawEntry {
  pub const COLUMNS: &'static str =
    "entry_id, user_id, bundle_id, source, external_reference, recorded_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:           row.get(0)?,
      user_id:            row.get(1)?,
      bundle_id:          row.get(2)?,
      source:             row.get(3)?,
      external_reference: row.get(4)?,
      recorded_at:        row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
      entry_id:           decode_uuid(&self.entry_id)?,
      user_id:            decode_uuid(&self.user_id)?,
      bundle_id:          decode_uuid(&self.bundle_id)?,
      source:             self.source.parse::<GrantSource>()?,
      external_reference: self.external_reference,
      recorded_at:        decode_dt(&self.recorded_at)?,
    })
  }
}
