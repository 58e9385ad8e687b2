//! HTTP surface of the drop access core.
//!
//! Exposes an axum [`Router`] serving login, bundle listings, gated asset
//! downloads, checkout, and the payment webhook, backed by any
//! [`DropStore`].

pub mod auth;
pub mod blob;
pub mod checkout;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod ledger;
pub mod provider;
pub mod session;
pub mod signature;
pub mod webhook;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router, middleware,
  routing::{get, post},
};
use drop_core::{blob::BlobStore, payment::PaymentProvider, store::DropStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use checkout::{CheckoutOrchestrator, SubscriptionPricing};
use gateway::AssetGateway;
use handlers::{
  assets, bundles, checkout as checkout_handlers, session as session_handlers,
  webhooks,
};
use ledger::{EntitlementLedger, PeriodPolicy};
use provider::PaymentConfig;
use session::{SessionAuthority, SessionConfig};
use webhook::WebhookProcessor;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// environment.
#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
  pub host:         String,
  pub port:         u16,
  pub store_path:   PathBuf,
  /// Root directory of the filesystem blob store.
  pub blob_dir:     PathBuf,
  #[serde(default)]
  pub session:      SessionConfig,
  pub payment:      PaymentConfig,
  #[serde(default)]
  pub subscription: PeriodPolicy,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub sessions: SessionAuthority<S>,
  pub ledger:   EntitlementLedger<S>,
  pub checkout: CheckoutOrchestrator<S>,
  pub gateway:  AssetGateway<S>,
  pub webhooks: WebhookProcessor<S>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      sessions: self.sessions.clone(),
      ledger:   self.ledger.clone(),
      checkout: self.checkout.clone(),
      gateway:  self.gateway.clone(),
      webhooks: self.webhooks.clone(),
    }
  }
}

impl<S> AppState<S>
where
  S: DropStore,
{
  /// Wire every component to the same store and collaborators.
  pub fn new(
    store: Arc<S>,
    blobs: Arc<dyn BlobStore>,
    provider: Arc<dyn PaymentProvider>,
    config: &ServerConfig,
  ) -> Self {
    let ledger = EntitlementLedger::new(store.clone(), config.subscription);
    Self {
      sessions: SessionAuthority::new(store.clone(), config.session.clone()),
      checkout: CheckoutOrchestrator::new(
        store.clone(),
        provider.clone(),
        SubscriptionPricing {
          amount_cents: config.payment.subscription_price_cents,
          currency:     config.payment.currency.clone(),
        },
      ),
      gateway: AssetGateway::new(store.clone(), ledger.clone(), blobs),
      webhooks: WebhookProcessor::new(
        store.clone(),
        ledger.clone(),
        provider,
        &config.payment.webhook_secret,
        config.payment.max_signature_age_secs,
      ),
      ledger,
      store,
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application [`Router`].
///
/// Browser-facing routes run behind the session middleware. The webhook
/// and health routes do not read cookies.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: DropStore + 'static,
{
  let browser = Router::new()
    .route("/auth/login", post(session_handlers::login::<S>))
    .route("/auth/logout", post(session_handlers::logout::<S>))
    .route(
      "/session/me",
      get(session_handlers::me::<S>).patch(session_handlers::update_me::<S>),
    )
    .route("/bundles", get(bundles::list::<S>))
    .route("/assets/{asset_id}/download", get(assets::download::<S>))
    .route("/checkout/subscription", post(checkout_handlers::subscription::<S>))
    .route("/checkout/one-off/{bundle_id}", post(checkout_handlers::one_off::<S>))
    .layer(middleware::from_fn_with_state(
      state.sessions.clone(),
      auth::session_layer::<S>,
    ));

  Router::new()
    .merge(browser)
    .route("/webhooks/payment", post(webhooks::receive::<S>))
    .route("/healthz", get(handlers::healthz))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
