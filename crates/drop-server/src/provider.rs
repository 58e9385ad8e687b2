//! HTTP client for the payment provider's REST API.
//!
//! Subscriptions are created as preapprovals, one-off purchases as checkout
//! preferences, and webhook payloads are confirmed by looking the payment up
//! by id. Response parsing is kept in pure functions so it can be tested
//! against recorded payloads.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drop_core::payment::{
  OneOffIntentRequest, Payment, PaymentError, PaymentIntent, PaymentProvider,
  PaymentStatus, SubscriptionIntentRequest,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

#[derive(Deserialize, Clone)]
pub struct PaymentConfig {
  pub api_base_url:             String,
  pub access_token:             String,
  /// Shared secret for webhook signatures.
  pub webhook_secret:           String,
  /// Where the provider sends the browser after checkout.
  pub return_url:               String,
  pub subscription_price_cents: i64,
  #[serde(default = "default_currency")]
  pub currency:                 String,
  /// Reject webhook signatures whose `ts` is older than this.
  #[serde(default)]
  pub max_signature_age_secs:   Option<i64>,
}

fn default_currency() -> String { "USD".to_string() }

impl fmt::Debug for PaymentConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PaymentConfig")
      .field("api_base_url", &self.api_base_url)
      .field("access_token", &"[redacted]")
      .field("webhook_secret", &"[redacted]")
      .field("return_url", &self.return_url)
      .field("subscription_price_cents", &self.subscription_price_cents)
      .field("currency", &self.currency)
      .field("max_signature_age_secs", &self.max_signature_age_secs)
      .finish()
  }
}

pub struct HttpPaymentProvider {
  client:       reqwest::Client,
  base_url:     String,
  access_token: String,
  return_url:   String,
}

impl HttpPaymentProvider {
  pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
    let client = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| PaymentError::Network(e.to_string()))?;
    Ok(Self {
      client,
      base_url: config.api_base_url.trim_end_matches('/').to_string(),
      access_token: config.access_token.clone(),
      return_url: config.return_url.clone(),
    })
  }

  async fn post_intent(
    &self,
    path: &str,
    idempotency_key: Uuid,
    body: Value,
  ) -> Result<PaymentIntent, PaymentError> {
    let url = format!("{}{path}", self.base_url);
    let response = self
      .client
      .post(&url)
      .bearer_auth(&self.access_token)
      .header(IDEMPOTENCY_HEADER, idempotency_key.to_string())
      .json(&body)
      .send()
      .await
      .map_err(|e| PaymentError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      tracing::error!(status = status.as_u16(), %body, path, "provider rejected intent");
      return Err(PaymentError::Rejected { status: status.as_u16(), body });
    }

    let value: Value = response
      .json()
      .await
      .map_err(|e| PaymentError::Decode(e.to_string()))?;
    parse_intent(value)
  }
}

/// Amount in major units, as the provider expects.
fn major_units(cents: i64) -> f64 { cents as f64 / 100.0 }

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
  async fn create_subscription(
    &self,
    request: SubscriptionIntentRequest,
  ) -> Result<PaymentIntent, PaymentError> {
    let body = json!({
      "reason": "Monthly drop subscription",
      "external_reference": request.external_reference,
      "payer_email": request.payer_email.as_str(),
      "back_url": self.return_url,
      "auto_recurring": {
        "frequency": 1,
        "frequency_type": "months",
        "transaction_amount": major_units(request.amount_cents),
        "currency_id": request.currency,
      },
    });
    self.post_intent("/preapproval", request.idempotency_key, body).await
  }

  async fn create_one_off(
    &self,
    request: OneOffIntentRequest,
  ) -> Result<PaymentIntent, PaymentError> {
    let body = json!({
      "items": [{
        "id": request.bundle_id.to_string(),
        "title": request.title,
        "quantity": 1,
        "unit_price": major_units(request.amount_cents),
        "currency_id": request.currency,
      }],
      "payer": { "email": request.payer_email.as_str() },
      "external_reference": request.external_reference,
      "metadata": { "bundle_id": request.bundle_id.to_string() },
      "back_urls": {
        "success": self.return_url,
        "pending": self.return_url,
        "failure": self.return_url,
      },
      "auto_return": "approved",
    });
    self.post_intent("/checkout/preferences", request.idempotency_key, body).await
  }

  async fn get_payment(
    &self,
    payment_id: &str,
  ) -> Result<Option<Payment>, PaymentError> {
    let url_safe = payment_id
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if payment_id.is_empty() || !url_safe {
      return Ok(None);
    }
    let url = format!("{}/v1/payments/{payment_id}", self.base_url);
    let response = self
      .client
      .get(&url)
      .bearer_auth(&self.access_token)
      .send()
      .await
      .map_err(|e| PaymentError::Network(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      tracing::error!(
        status = status.as_u16(),
        %body,
        payment_id,
        "payment lookup failed"
      );
      return Err(PaymentError::Rejected { status: status.as_u16(), body });
    }

    let value: Value = response
      .json()
      .await
      .map_err(|e| PaymentError::Decode(e.to_string()))?;
    parse_payment(value).map(Some)
  }
}

// ─── Wire format ─────────────────────────────────────────────────────────────

/// The provider sends ids as numbers for payments and strings elsewhere.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
  Number(u64),
  Text(String),
}

impl WireId {
  fn into_string(self) -> String {
    match self {
      WireId::Number(n) => n.to_string(),
      WireId::Text(s) => s,
    }
  }
}

#[derive(Deserialize)]
struct WireIntent {
  id:         WireId,
  init_point: String,
}

#[derive(Deserialize)]
struct WirePayment {
  id:                 WireId,
  status:             String,
  #[serde(default)]
  external_reference: Option<String>,
  #[serde(default)]
  date_approved:      Option<String>,
  #[serde(default)]
  metadata:           Option<WireMetadata>,
}

#[derive(Deserialize)]
struct WireMetadata {
  #[serde(default)]
  bundle_id: Option<String>,
}

pub fn parse_intent(value: Value) -> Result<PaymentIntent, PaymentError> {
  let wire: WireIntent =
    serde_json::from_value(value).map_err(|e| PaymentError::Decode(e.to_string()))?;
  Ok(PaymentIntent {
    provider_id:  wire.id.into_string(),
    redirect_url: wire.init_point,
  })
}

pub fn parse_payment(value: Value) -> Result<Payment, PaymentError> {
  let wire: WirePayment =
    serde_json::from_value(value).map_err(|e| PaymentError::Decode(e.to_string()))?;

  let approved_at = wire
    .date_approved
    .as_deref()
    .map(|s| {
      DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PaymentError::Decode(format!("date_approved {s:?}: {e}")))
    })
    .transpose()?;

  let bundle_id = wire
    .metadata
    .and_then(|m| m.bundle_id)
    .map(|s| {
      Uuid::parse_str(&s)
        .map_err(|e| PaymentError::Decode(format!("bundle_id {s:?}: {e}")))
    })
    .transpose()?;

  Ok(Payment {
    payment_id: wire.id.into_string(),
    status: PaymentStatus::parse(&wire.status),
    external_reference: wire.external_reference.filter(|s| !s.is_empty()),
    approved_at,
    bundle_id,
  })
}
