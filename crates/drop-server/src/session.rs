//! Session Authority: issues, validates, rotates, and revokes session tokens.
//!
//! Tokens are 32 random bytes from the OS CSPRNG, base64url-encoded. Only the
//! SHA-256 digest of a token reaches the store. A session is never edited;
//! rotation invalidates the old row and inserts a new one in one transaction.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{DateTime, Duration, Utc};
use drop_core::{
  session::{NewSession, Rotation, Session},
  store::DropStore,
  user::User,
};
use rand_core::{OsRng, RngCore};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Error;

const TOKEN_BYTES: usize = 32;
/// Length of a base64url (no padding) encoding of [`TOKEN_BYTES`].
const TOKEN_LEN: usize = 43;

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SessionConfig {
  pub cookie_name:        String,
  /// Absolute lifetime of a session.
  pub ttl_secs:           i64,
  /// Age after which a valid session is replaced on its next use.
  pub refresh_after_secs: i64,
  /// Emit the `Secure` cookie attribute. Only disable for plain-HTTP
  /// development.
  pub secure_cookie:      bool,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      cookie_name:        "drop_session".to_string(),
      ttl_secs:           30 * 24 * 60 * 60,
      refresh_after_secs: 24 * 60 * 60,
      secure_cookie:      true,
    }
  }
}

// ─── Results ──────────────────────────────────────────────────────────────────

/// A freshly minted session together with what the browser must receive.
#[derive(Debug, Clone)]
pub struct IssuedSession {
  pub token:   String,
  pub session: Session,
  /// Complete `Set-Cookie` header value.
  pub cookie:  String,
}

/// Outcome of validating a presented token.
#[derive(Debug, Clone)]
pub enum SessionCheck {
  /// Not authenticated. `clear_cookie` is set when the client presented a
  /// token that is dead, so the response should remove it.
  Anonymous { clear_cookie: bool },
  Valid { user: User, session: Session, token: String },
  /// The session was stale and has been replaced; the new cookie must be
  /// set on the response.
  Rotated { user: User, issued: IssuedSession },
}

// ─── Authority ────────────────────────────────────────────────────────────────

pub struct SessionAuthority<S> {
  store:  Arc<S>,
  config: Arc<SessionConfig>,
}

impl<S> Clone for SessionAuthority<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), config: self.config.clone() }
  }
}

impl<S> SessionAuthority<S>
where
  S: DropStore,
{
  pub fn new(store: Arc<S>, config: SessionConfig) -> Self {
    Self { store, config: Arc::new(config) }
  }

  pub fn config(&self) -> &SessionConfig { &self.config }

  /// Issue a new session for `user_id`.
  pub async fn create_session(&self, user_id: Uuid) -> Result<IssuedSession, Error> {
    self.create_session_at(user_id, Utc::now()).await
  }

  pub async fn create_session_at(
    &self,
    user_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<IssuedSession, Error> {
    let (token, new) = self.mint(user_id, now);
    let session = self
      .store
      .create_session(new)
      .await
      .map_err(Error::store)?;
    tracing::debug!(user_id = %user_id, "session created");
    Ok(self.issued(token, session))
  }

  /// Validate `token` (the raw cookie value, if any).
  ///
  /// Malformed and unknown tokens are `Anonymous`, never errors. Store
  /// failures are errors, as is losing a rotation race.
  pub async fn validate_session(
    &self,
    token: Option<&str>,
  ) -> Result<SessionCheck, Error> {
    self.validate_session_at(token, Utc::now()).await
  }

  pub async fn validate_session_at(
    &self,
    token: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<SessionCheck, Error> {
    let Some(token) = token else {
      return Ok(SessionCheck::Anonymous { clear_cookie: false });
    };
    let dead = SessionCheck::Anonymous { clear_cookie: true };

    let Some(hash) = token_digest(token) else {
      return Ok(dead);
    };

    let session = match self
      .store
      .get_session(hash.clone())
      .await
      .map_err(Error::store)?
    {
      Some(s) if s.is_live_at(now) => s,
      _ => return Ok(dead),
    };

    let Some(user) = self
      .store
      .get_user(session.user_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(dead);
    };

    let refresh_after = Duration::seconds(self.config.refresh_after_secs);
    if now - session.created_at <= refresh_after {
      return Ok(SessionCheck::Valid {
        user,
        session,
        token: token.to_owned(),
      });
    }

    let (new_token, replacement) = self.mint(user.user_id, now);
    match self
      .store
      .rotate_session(hash, replacement, now)
      .await
      .map_err(Error::store)?
    {
      Rotation::Rotated(session) => {
        tracing::debug!(user_id = %user.user_id, "session rotated");
        Ok(SessionCheck::Rotated {
          user,
          issued: self.issued(new_token, session),
        })
      }
      Rotation::Conflict => {
        tracing::info!(user_id = %user.user_id, "lost session rotation race");
        Err(Error::Conflict("session was replaced by a concurrent request".into()))
      }
    }
  }

  /// Revoke `token`. Unknown, malformed, and already revoked tokens are a
  /// no-op.
  pub async fn invalidate_session(&self, token: &str) -> Result<(), Error> {
    let Some(hash) = token_digest(token) else {
      return Ok(());
    };
    let revoked = self
      .store
      .invalidate_session(hash, Utc::now())
      .await
      .map_err(Error::store)?;
    if revoked {
      tracing::debug!("session invalidated");
    }
    Ok(())
  }

  /// `Set-Cookie` value that removes the session cookie.
  pub fn clear_cookie(&self) -> String { self.cookie_value("", 0) }

  fn mint(&self, user_id: Uuid, now: DateTime<Utc>) -> (String, NewSession) {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = B64.encode(bytes);

    let new = NewSession {
      token_hash: hash_token(&token),
      user_id,
      created_at: now,
      expires_at: now + Duration::seconds(self.config.ttl_secs),
    };
    (token, new)
  }

  fn issued(&self, token: String, session: Session) -> IssuedSession {
    let cookie = self.cookie_value(&token, self.config.ttl_secs);
    IssuedSession { token, session, cookie }
  }

  fn cookie_value(&self, value: &str, max_age: i64) -> String {
    let secure = if self.config.secure_cookie { "; Secure" } else { "" };
    format!(
      "{}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}{secure}",
      self.config.cookie_name
    )
  }
}

pub(crate) fn hash_token(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}

/// Digest of a well-formed token; `None` for anything that could not have
/// been issued here.
fn token_digest(token: &str) -> Option<String> {
  let well_formed = token.len() == TOKEN_LEN
    && token
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
  well_formed.then(|| hash_token(token))
}
