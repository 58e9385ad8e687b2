//! Payment provider port.
//!
//! Defines the contract the checkout orchestrator and the webhook processor
//! use to talk to the external payment provider. Implementations must send
//! the idempotency key with every intent-creating request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::user::Email;

/// Request for a recurring (monthly) subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionIntentRequest {
  pub idempotency_key:    Uuid,
  /// Opaque reference echoed back on every payment; the user's id.
  pub external_reference: String,
  pub payer_email:        Email,
  pub amount_cents:       i64,
  pub currency:           String,
}

/// Request for a single bundle purchase.
#[derive(Debug, Clone)]
pub struct OneOffIntentRequest {
  pub idempotency_key:    Uuid,
  pub external_reference: String,
  pub payer_email:        Email,
  pub bundle_id:          Uuid,
  pub title:              String,
  pub amount_cents:       i64,
  pub currency:           String,
}

/// A created intent: where to send the browser.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
  pub provider_id:  String,
  pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
  Approved,
  Pending,
  Rejected,
  Other(String),
}

impl PaymentStatus {
  pub fn parse(s: &str) -> Self {
    match s {
      "approved" => Self::Approved,
      "pending" | "in_process" | "authorized" => Self::Pending,
      "rejected" | "cancelled" | "refunded" | "charged_back" => Self::Rejected,
      other => Self::Other(other.to_owned()),
    }
  }
}

/// A payment as reported by the provider's lookup API.
///
/// Every field except `payment_id` comes from the provider and must be
/// treated as untrusted.
#[derive(Debug, Clone)]
pub struct Payment {
  pub payment_id:         String,
  pub status:             PaymentStatus,
  pub external_reference: Option<String>,
  pub approved_at:        Option<DateTime<Utc>>,
  /// Present for one-off purchases; absent for subscription charges.
  pub bundle_id:          Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum PaymentError {
  #[error("provider unreachable: {0}")]
  Network(String),

  #[error("provider returned {status}: {body}")]
  Rejected { status: u16, body: String },

  #[error("unexpected provider response: {0}")]
  Decode(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
  async fn create_subscription(
    &self,
    request: SubscriptionIntentRequest,
  ) -> Result<PaymentIntent, PaymentError>;

  async fn create_one_off(
    &self,
    request: OneOffIntentRequest,
  ) -> Result<PaymentIntent, PaymentError>;

  /// Look up a payment by id. Returns `None` if the provider does not know it.
  async fn get_payment(
    &self,
    payment_id: &str,
  ) -> Result<Option<Payment>, PaymentError>;
}
