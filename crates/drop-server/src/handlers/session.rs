//! Login, logout, and the current user's profile.

use axum::{
  Json,
  extract::State,
  http::{StatusCode, header},
  response::IntoResponse,
};
use drop_core::{
  ledger::LedgerEntry,
  store::DropStore,
  user::{Email, EmailUpdate, User},
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::{Authenticated, MaybeAuthenticated},
  error::Error,
};

#[derive(Deserialize)]
pub struct EmailBody {
  pub email: String,
}

#[derive(Serialize)]
pub struct Me {
  pub user:         User,
  pub entitlements: Vec<LedgerEntry>,
}

/// `POST /auth/login`: find or create the user for `email` and issue a
/// session. Any session the caller already holds is revoked first.
pub async fn login<S>(
  State(state): State<AppState<S>>,
  MaybeAuthenticated(current): MaybeAuthenticated,
  Json(body): Json<EmailBody>,
) -> Result<impl IntoResponse, Error>
where
  S: DropStore + 'static,
{
  let email = Email::parse(&body.email)?;

  if let Some(current) = current {
    state.sessions.invalidate_session(&current.token).await?;
  }

  let user = state
    .store
    .find_or_create_user(email)
    .await
    .map_err(Error::store)?;
  let issued = state.sessions.create_session(user.user_id).await?;
  tracing::info!(user_id = %user.user_id, "login");

  Ok(([(header::SET_COOKIE, issued.cookie)], Json(user)))
}

/// `POST /auth/logout`: revoke the session (if any) and clear the cookie.
pub async fn logout<S>(
  State(state): State<AppState<S>>,
  MaybeAuthenticated(current): MaybeAuthenticated,
) -> Result<impl IntoResponse, Error>
where
  S: DropStore + 'static,
{
  if let Some(current) = current {
    state.sessions.invalidate_session(&current.token).await?;
    tracing::info!(user_id = %current.user.user_id, "logout");
  }
  Ok((
    StatusCode::NO_CONTENT,
    [(header::SET_COOKIE, state.sessions.clear_cookie())],
  ))
}

/// `GET /session/me`
pub async fn me<S>(
  State(state): State<AppState<S>>,
  Authenticated(identity): Authenticated,
) -> Result<Json<Me>, Error>
where
  S: DropStore + 'static,
{
  let entitlements = state.ledger.entries_for_user(identity.user.user_id).await?;
  Ok(Json(Me { user: identity.user, entitlements }))
}

/// `PATCH /session/me`: change the contact address.
pub async fn update_me<S>(
  State(state): State<AppState<S>>,
  Authenticated(identity): Authenticated,
  Json(body): Json<EmailBody>,
) -> Result<Json<User>, Error>
where
  S: DropStore + 'static,
{
  let email = Email::parse(&body.email)?;
  match state
    .store
    .update_user_email(identity.user.user_id, email)
    .await
    .map_err(Error::store)?
  {
    EmailUpdate::Updated(user) => Ok(Json(user)),
    EmailUpdate::Taken => Err(Error::Conflict("email already in use".into())),
    EmailUpdate::UnknownUser => Err(Error::Unauthenticated),
  }
}
