//! Session records as persisted by the store.
//!
//! The opaque token handed to the browser is never stored. Rows are keyed by
//! the token's SHA-256 digest, so a leaked database does not yield live
//! credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored session. Only `invalidated_at` ever changes, and only once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
  /// Lowercase hex SHA-256 of the opaque token.
  pub token_hash:     String,
  pub user_id:        Uuid,
  pub created_at:     DateTime<Utc>,
  pub expires_at:     DateTime<Utc>,
  pub invalidated_at: Option<DateTime<Utc>>,
}

impl Session {
  /// Whether the session may still authenticate a request at `now`.
  pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
    self.invalidated_at.is_none() && now < self.expires_at
  }
}

/// Input to [`crate::store::DropStore::create_session`] and
/// [`crate::store::DropStore::rotate_session`].
#[derive(Debug, Clone)]
pub struct NewSession {
  pub token_hash: String,
  pub user_id:    Uuid,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl From<NewSession> for Session {
  fn from(s: NewSession) -> Self {
    Session {
      token_hash:     s.token_hash,
      user_id:        s.user_id,
      created_at:     s.created_at,
      expires_at:     s.expires_at,
      invalidated_at: None,
    }
  }
}

/// Result of a conditional rotation.
#[derive(Debug, Clone)]
pub enum Rotation {
  /// The old session was invalidated and the replacement stored.
  Rotated(Session),
  /// The old session was already invalidated (a concurrent rotation or a
  /// logout won); nothing was written.
  Conflict,
}
