//! User — the identity that sessions and ledger entries point at.
//!
//! Users are created on the first login attempt with a given address. The
//! `user_id` never changes; the contact address may be replaced by the user.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Longest address accepted, per the SMTP path limit.
const MAX_EMAIL_LEN: usize = 254;

/// A normalised contact address: trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
  /// Normalise and validate `raw`.
  ///
  /// Only the shape is checked (one `@`, non-empty local part, a dotted
  /// domain, no whitespace or control characters); deliverability is not.
  pub fn parse(raw: &str) -> Result<Self> {
    let normalised = raw.trim().to_lowercase();
    if normalised.is_empty() || normalised.len() > MAX_EMAIL_LEN {
      return Err(Error::InvalidEmail);
    }
    if normalised
      .chars()
      .any(|c| c.is_whitespace() || c.is_control())
    {
      return Err(Error::InvalidEmail);
    }

    let (local, domain) =
      normalised.split_once('@').ok_or(Error::InvalidEmail)?;
    if local.is_empty() || domain.contains('@') {
      return Err(Error::InvalidEmail);
    }
    let dotted = domain
      .split('.')
      .collect::<Vec<_>>();
    if dotted.len() < 2 || dotted.iter().any(|label| label.is_empty()) {
      return Err(Error::InvalidEmail);
    }

    Ok(Self(normalised))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Email {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for Email {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::parse(&value) }
}

impl From<Email> for String {
  fn from(value: Email) -> Self { value.0 }
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:    Uuid,
  pub email:      Email,
  pub created_at: DateTime<Utc>,
}

/// Result of asking the store to change a user's contact address.
#[derive(Debug, Clone)]
pub enum EmailUpdate {
  Updated(User),
  /// Another user already holds the address.
  Taken,
  /// The user does not exist (e.g. deleted between validation and update).
  UnknownUser,
}
