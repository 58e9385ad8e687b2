//! Ledger entries: the append-only proof that a user unlocked a bundle.
//!
//! Entries are never updated or deleted. Whether a user may fetch a gated
//! asset is computed from the existence of any entry for the (user, bundle)
//! pair; the entitlement itself is never stored.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// How the user paid for the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
  Subscription,
  OneOff,
}

impl GrantSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Subscription => "subscription",
      Self::OneOff => "one_off",
    }
  }
}

impl fmt::Display for GrantSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for GrantSource {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "subscription" => Ok(Self::Subscription),
      "one_off" => Ok(Self::OneOff),
      other => Err(Error::UnknownSource(other.to_owned())),
    }
  }
}

/// An immutable unlock record.
///
/// At most one entry exists per `(user_id, bundle_id, external_reference)`
/// (enforced by a UNIQUE constraint), which makes webhook replays harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
  pub entry_id:           Uuid,
  pub user_id:            Uuid,
  pub bundle_id:          Uuid,
  pub source:             GrantSource,
  /// The provider's payment id.
  pub external_reference: String,
  pub recorded_at:        DateTime<Utc>,
}

/// Input to [`crate::store::DropStore::append_entry`].
/// `recorded_at` is always set by the store.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
  pub user_id:            Uuid,
  pub bundle_id:          Uuid,
  pub source:             GrantSource,
  pub external_reference: String,
}

/// Result of an idempotent grant.
#[derive(Debug, Clone)]
pub enum GrantOutcome {
  Granted(LedgerEntry),
  /// An entry with the same (user, bundle, reference) already exists.
  AlreadyGranted,
}

impl GrantOutcome {
  pub fn is_new(&self) -> bool { matches!(self, Self::Granted(_)) }
}
