//! Payment webhook receiver.

use std::collections::HashMap;

use axum::{
  extract::{Query, State},
  http::{HeaderMap, StatusCode, Uri},
};
use bytes::Bytes;
use drop_core::store::DropStore;

use crate::{
  AppState,
  webhook::{WebhookNotification, WebhookOutcome},
};

/// `POST /webhooks/payment`. Always 200: the provider only needs to know
/// the delivery arrived, and anything else would leak why it was refused.
pub async fn receive<S>(
  State(state): State<AppState<S>>,
  uri: Uri,
  headers: HeaderMap,
  body: Bytes,
) -> StatusCode
where
  S: DropStore + 'static,
{
  let query: HashMap<String, String> = Query::try_from_uri(&uri)
    .map(|Query(q)| q)
    .unwrap_or_default();
  let notification = WebhookNotification::from_parts(&headers, &query, &body);
  let data_id = notification.data_id.as_deref().unwrap_or("");

  match state.webhooks.process(&notification).await {
    Ok(WebhookOutcome::Rejected) => {
      tracing::warn!(data_id, "webhook rejected: bad signature");
    }
    Ok(WebhookOutcome::Ignored(reason)) => {
      tracing::info!(data_id, reason, "webhook ignored");
    }
    Ok(WebhookOutcome::Granted(entry)) => {
      tracing::info!(
        payment_id = %entry.external_reference,
        user_id = %entry.user_id,
        bundle_id = %entry.bundle_id,
        "webhook granted bundle"
      );
    }
    Ok(WebhookOutcome::AlreadyGranted) => {
      tracing::info!(data_id, "webhook replay; already granted");
    }
    Err(e) => {
      tracing::error!(data_id, error = %e, "webhook processing failed");
    }
  }
  StatusCode::OK
}
