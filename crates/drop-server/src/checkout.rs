//! Checkout Orchestrator: turns a purchase request into a provider redirect.
//!
//! Every call mints a fresh idempotency key. Retrying a failed checkout is a
//! new intent, never a replay of a stale one.

use std::sync::Arc;

use drop_core::{
  payment::{
    OneOffIntentRequest, PaymentError, PaymentIntent, PaymentProvider,
    SubscriptionIntentRequest,
  },
  store::DropStore,
  user::User,
};
use uuid::Uuid;

use crate::error::Error;

/// Price of the monthly subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionPricing {
  pub amount_cents: i64,
  pub currency:     String,
}

pub struct CheckoutOrchestrator<S> {
  store:    Arc<S>,
  provider: Arc<dyn PaymentProvider>,
  pricing:  Arc<SubscriptionPricing>,
}

impl<S> Clone for CheckoutOrchestrator<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      provider: self.provider.clone(),
      pricing:  self.pricing.clone(),
    }
  }
}

impl<S> CheckoutOrchestrator<S>
where
  S: DropStore,
{
  pub fn new(
    store: Arc<S>,
    provider: Arc<dyn PaymentProvider>,
    pricing: SubscriptionPricing,
  ) -> Self {
    Self { store, provider, pricing: Arc::new(pricing) }
  }

  /// Start a monthly subscription for `user`; returns the provider URL the
  /// browser must visit.
  pub async fn create_subscription_intent(
    &self,
    user: &User,
  ) -> Result<String, Error> {
    let idempotency_key = Uuid::new_v4();
    let request = SubscriptionIntentRequest {
      idempotency_key,
      external_reference: user.user_id.to_string(),
      payer_email: user.email.clone(),
      amount_cents: self.pricing.amount_cents,
      currency: self.pricing.currency.clone(),
    };

    let intent = self
      .provider
      .create_subscription(request)
      .await
      .map_err(|e| upstream(e, user, idempotency_key))?;
    Ok(redirect(intent, user, "subscription"))
  }

  /// Start a single purchase of `bundle_id`. Unknown bundles are `NotFound`.
  pub async fn create_one_off_intent(
    &self,
    user: &User,
    bundle_id: Uuid,
  ) -> Result<String, Error> {
    let bundle = self
      .store
      .get_bundle(bundle_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound)?;

    let idempotency_key = Uuid::new_v4();
    let request = OneOffIntentRequest {
      idempotency_key,
      external_reference: user.user_id.to_string(),
      payer_email: user.email.clone(),
      bundle_id: bundle.bundle_id,
      title: bundle.title,
      amount_cents: bundle.price_cents,
      currency: bundle.currency,
    };

    let intent = self
      .provider
      .create_one_off(request)
      .await
      .map_err(|e| upstream(e, user, idempotency_key))?;
    Ok(redirect(intent, user, "one_off"))
  }
}

fn upstream(e: PaymentError, user: &User, idempotency_key: Uuid) -> Error {
  tracing::error!(
    user_id = %user.user_id,
    idempotency_key = %idempotency_key,
    error = %e,
    "payment intent creation failed"
  );
  Error::UpstreamFailure(e.to_string())
}

fn redirect(intent: PaymentIntent, user: &User, kind: &str) -> String {
  tracing::info!(
    user_id = %user.user_id,
    provider_id = %intent.provider_id,
    kind,
    "payment intent created"
  );
  intent.redirect_url
}
