//! Payment webhook processing.
//!
//! Notifications are untrusted hints. A grant only happens after the
//! signature checks out and the provider's own payment lookup confirms an
//! approved payment. Delivery is at-least-once and unordered; the ledger's
//! idempotent grant absorbs replays.

use std::{collections::HashMap, sync::Arc};

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use drop_core::{
  ledger::{GrantOutcome, GrantSource, LedgerEntry},
  payment::{PaymentProvider, PaymentStatus},
  store::DropStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  error::Error,
  ledger::EntitlementLedger,
  signature::{self, SignatureHeader},
};

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The parts of a webhook delivery the processor reads.
#[derive(Debug, Clone, Default)]
pub struct WebhookNotification {
  pub signature:  Option<String>,
  pub request_id: Option<String>,
  pub data_id:    Option<String>,
  pub event_type: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireBody {
  #[serde(rename = "type")]
  event_type: Option<String>,
  data:       Option<WireData>,
}

#[derive(Deserialize)]
struct WireData {
  id: Option<serde_json::Value>,
}

impl WebhookNotification {
  /// Collect the notification from a raw request. The body may be empty or
  /// not JSON at all; whatever is missing stays `None`.
  pub fn from_parts(
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    body: &[u8],
  ) -> Self {
    let header = |name: &str| {
      headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
    };
    let parsed: WireBody = serde_json::from_slice(body).unwrap_or_default();

    let body_id = parsed.data.and_then(|d| d.id).and_then(|id| match id {
      serde_json::Value::String(s) => Some(s),
      serde_json::Value::Number(n) => Some(n.to_string()),
      _ => None,
    });

    Self {
      signature:  header(SIGNATURE_HEADER),
      request_id: header(REQUEST_ID_HEADER),
      data_id:    query.get("data.id").cloned().or(body_id),
      event_type: parsed
        .event_type
        .or_else(|| query.get("type").cloned())
        .or_else(|| query.get("topic").cloned()),
    }
  }
}

/// What became of a notification. Always answered with 200.
#[derive(Debug)]
pub enum WebhookOutcome {
  /// Signature missing, invalid, or too old.
  Rejected,
  /// Authentic but nothing to grant.
  Ignored(&'static str),
  Granted(LedgerEntry),
  AlreadyGranted,
}

pub struct WebhookProcessor<S> {
  store:                  Arc<S>,
  ledger:                 EntitlementLedger<S>,
  provider:               Arc<dyn PaymentProvider>,
  secret:                 Arc<str>,
  max_signature_age_secs: Option<i64>,
}

impl<S> Clone for WebhookProcessor<S> {
  fn clone(&self) -> Self {
    Self {
      store:                  self.store.clone(),
      ledger:                 self.ledger.clone(),
      provider:               self.provider.clone(),
      secret:                 self.secret.clone(),
      max_signature_age_secs: self.max_signature_age_secs,
    }
  }
}

impl<S> WebhookProcessor<S>
where
  S: DropStore,
{
  pub fn new(
    store: Arc<S>,
    ledger: EntitlementLedger<S>,
    provider: Arc<dyn PaymentProvider>,
    secret: &str,
    max_signature_age_secs: Option<i64>,
  ) -> Self {
    Self {
      store,
      ledger,
      provider,
      secret: Arc::from(secret),
      max_signature_age_secs,
    }
  }

  pub async fn process(&self, n: &WebhookNotification) -> Result<WebhookOutcome, Error> {
    self.process_at(n, Utc::now()).await
  }

  pub async fn process_at(
    &self,
    n: &WebhookNotification,
    now: DateTime<Utc>,
  ) -> Result<WebhookOutcome, Error> {
    let (Some(sig), Some(request_id), Some(data_id)) =
      (n.signature.as_deref(), n.request_id.as_deref(), n.data_id.as_deref())
    else {
      return Ok(WebhookOutcome::Rejected);
    };
    if !signature::verify(sig, request_id, data_id, &self.secret) {
      return Ok(WebhookOutcome::Rejected);
    }
    if let Some(max_age) = self.max_signature_age_secs {
      let fresh = SignatureHeader::parse(sig)
        .and_then(|h| h.timestamp())
        .is_some_and(|ts| now.timestamp() - ts <= max_age);
      if !fresh {
        return Ok(WebhookOutcome::Rejected);
      }
    }

    if n.event_type.as_deref() != Some("payment") {
      return Ok(WebhookOutcome::Ignored("not a payment event"));
    }

    let payment = match self.provider.get_payment(data_id).await {
      Ok(Some(p)) => p,
      Ok(None) => return Ok(WebhookOutcome::Ignored("unknown payment")),
      Err(e) => return Err(Error::UpstreamFailure(e.to_string())),
    };
    if payment.status != PaymentStatus::Approved {
      return Ok(WebhookOutcome::Ignored("payment not approved"));
    }

    let Some(user_id) = payment
      .external_reference
      .as_deref()
      .and_then(|r| Uuid::parse_str(r).ok())
    else {
      return Ok(WebhookOutcome::Ignored("no payer reference"));
    };
    if self.store.get_user(user_id).await.map_err(Error::store)?.is_none() {
      return Ok(WebhookOutcome::Ignored("unknown payer"));
    }

    let (bundle_id, source) = match payment.bundle_id {
      Some(bundle_id) => {
        if self.store.get_bundle(bundle_id).await.map_err(Error::store)?.is_none() {
          return Ok(WebhookOutcome::Ignored("unknown bundle"));
        }
        (bundle_id, GrantSource::OneOff)
      }
      None => {
        let Some(approved_at) = payment.approved_at else {
          return Ok(WebhookOutcome::Ignored("missing approval date"));
        };
        let Some(bundle_id) = self.ledger.resolve_subscription_bundle(approved_at).await?
        else {
          tracing::warn!(
            payment_id = %payment.payment_id,
            user_id = %user_id,
            %approved_at,
            "no bundle for subscription period"
          );
          return Ok(WebhookOutcome::Ignored("no bundle for period"));
        };
        (bundle_id, GrantSource::Subscription)
      }
    };

    let outcome = self
      .ledger
      .grant(user_id, bundle_id, source, &payment.payment_id)
      .await?;
    Ok(match outcome {
      GrantOutcome::Granted(entry) => WebhookOutcome::Granted(entry),
      GrantOutcome::AlreadyGranted => WebhookOutcome::AlreadyGranted,
    })
  }
}
