//! Cookie session middleware and the extractors handlers use to read it.
//!
//! The middleware validates the session cookie once per request, stores the
//! result as a [`CurrentSession`] extension, and afterwards appends a
//! rotated or clearing `Set-Cookie` unless the handler already set one.

use std::convert::Infallible;

use axum::{
  extract::{FromRequestParts, Request, State},
  http::{HeaderMap, HeaderValue, header, request::Parts},
  middleware::Next,
  response::{IntoResponse, Response},
};
use drop_core::{store::DropStore, user::User};

use crate::{
  error::Error,
  session::{SessionAuthority, SessionCheck},
};

/// The value of cookie `name`, searching every `Cookie` header.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(k, _)| *k == name)
    .map(|(_, v)| v)
}

/// An authenticated caller and the token it is (now) using.
#[derive(Debug, Clone)]
pub struct Identity {
  pub user:  User,
  pub token: String,
}

/// Request extension set by [`session_layer`].
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Option<Identity>);

pub async fn session_layer<S>(
  State(sessions): State<SessionAuthority<S>>,
  mut req: Request,
  next: Next,
) -> Response
where
  S: DropStore + 'static,
{
  let cookie_name = sessions.config().cookie_name.clone();
  let token = read_cookie(req.headers(), &cookie_name).map(str::to_owned);

  let check = match sessions.validate_session(token.as_deref()).await {
    Ok(check) => check,
    Err(e) => return e.into_response(),
  };

  let (identity, set_cookie) = match check {
    SessionCheck::Anonymous { clear_cookie } => {
      (None, clear_cookie.then(|| sessions.clear_cookie()))
    }
    SessionCheck::Valid { user, token, .. } => (Some(Identity { user, token }), None),
    SessionCheck::Rotated { user, issued } => {
      (Some(Identity { user, token: issued.token }), Some(issued.cookie))
    }
  };

  req.extensions_mut().insert(CurrentSession(identity));
  let mut response = next.run(req).await;

  if let Some(cookie) = set_cookie {
    let prefix = format!("{cookie_name}=");
    let handler_set = response
      .headers()
      .get_all(header::SET_COOKIE)
      .iter()
      .any(|v| v.to_str().is_ok_and(|s| s.starts_with(&prefix)));
    if !handler_set && let Ok(value) = HeaderValue::from_str(&cookie) {
      response.headers_mut().append(header::SET_COOKIE, value);
    }
  }
  response
}

/// Present in a handler's arguments means the request carried a live
/// session. Rejects with 401 otherwise.
pub struct Authenticated(pub Identity);

impl<St> FromRequestParts<St> for Authenticated
where
  St: Send + Sync,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &St,
  ) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<CurrentSession>()
      .and_then(|s| s.0.clone())
      .map(Authenticated)
      .ok_or(Error::Unauthenticated)
  }
}

/// The caller's identity if there is one; never rejects.
pub struct MaybeAuthenticated(pub Option<Identity>);

impl<St> FromRequestParts<St> for MaybeAuthenticated
where
  St: Send + Sync,
{
  type Rejection = Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &St,
  ) -> Result<Self, Self::Rejection> {
    Ok(MaybeAuthenticated(
      parts
        .extensions
        .get::<CurrentSession>()
        .and_then(|s| s.0.clone()),
    ))
  }
}
