//! Error taxonomy and axum `IntoResponse` implementation.
//!
//! `Unauthenticated` and `Forbidden` responses carry no diagnostic detail.
//! Upstream and store failures are logged here and replaced by generic
//! bodies, so provider and database messages never reach the browser.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// No session, or one that is unknown, expired, or revoked.
  #[error("unauthenticated")]
  Unauthenticated,
  /// Authenticated but not entitled.
  #[error("forbidden")]
  Forbidden,
  #[error("not found")]
  NotFound,
  #[error("conflict: {0}")]
  Conflict(String),
  #[error("invalid input: {0}")]
  InvalidInput(String),
  /// The payment provider failed or could not be reached.
  #[error("upstream failure: {0}")]
  UpstreamFailure(String),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Store(Box::new(e))
  }
}

impl From<drop_core::Error> for Error {
  fn from(e: drop_core::Error) -> Self { Error::InvalidInput(e.to_string()) }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthenticated => {
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
      }
      Error::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
      Error::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
      Error::Conflict(msg) => {
        (StatusCode::CONFLICT, Json(json!({ "error": msg }))).into_response()
      }
      Error::InvalidInput(msg) => {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
      }
      Error::UpstreamFailure(detail) => {
        tracing::error!(%detail, "upstream failure");
        (
          StatusCode::BAD_GATEWAY,
          Json(json!({ "error": "payment service unavailable" })),
        )
          .into_response()
      }
      Error::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({ "error": "internal error" })),
        )
          .into_response()
      }
    }
  }
}
