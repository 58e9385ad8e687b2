//! In-process payment provider and store wrapper for tests.

use std::{
  collections::HashMap,
  sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drop_core::{
  bundle::{Asset, ContentBundle, NewAsset, NewBundle, Period},
  ledger::{GrantOutcome, LedgerEntry, NewLedgerEntry},
  payment::{
    OneOffIntentRequest, Payment, PaymentError, PaymentIntent, PaymentProvider,
    SubscriptionIntentRequest,
  },
  session::{NewSession, Rotation, Session},
  store::DropStore,
  user::{Email, EmailUpdate, User},
};
use drop_store_sqlite::{Error as StoreError, SqliteStore};
use uuid::Uuid;

/// Answers lookups from a table of payments and records every intent
/// request it receives.
#[derive(Default)]
pub struct ScriptedProvider {
  payments:         Mutex<HashMap<String, Payment>>,
  idempotency_keys: Mutex<Vec<Uuid>>,
  lookups:          Mutex<Vec<String>>,
  failing:          AtomicBool,
}

impl ScriptedProvider {
  pub fn add_payment(&self, payment: Payment) {
    self
      .payments
      .lock()
      .unwrap()
      .insert(payment.payment_id.clone(), payment);
  }

  pub fn set_failing(&self, failing: bool) { self.failing.store(failing, Ordering::SeqCst); }

  pub fn idempotency_keys(&self) -> Vec<Uuid> { self.idempotency_keys.lock().unwrap().clone() }

  pub fn lookups(&self) -> Vec<String> { self.lookups.lock().unwrap().clone() }

  fn check(&self) -> Result<(), PaymentError> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(PaymentError::Rejected {
        status: 500,
        body:   "provider-internal-detail".into(),
      });
    }
    Ok(())
  }

  fn intent(&self, key: Uuid, kind: &str) -> PaymentIntent {
    self.idempotency_keys.lock().unwrap().push(key);
    PaymentIntent {
      provider_id:  key.to_string(),
      redirect_url: format!("https://pay.example.com/{kind}/{key}"),
    }
  }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
  async fn create_subscription(
    &self,
    request: SubscriptionIntentRequest,
  ) -> Result<PaymentIntent, PaymentError> {
    self.check()?;
    Ok(self.intent(request.idempotency_key, "subscription"))
  }

  async fn create_one_off(
    &self,
    request: OneOffIntentRequest,
  ) -> Result<PaymentIntent, PaymentError> {
    self.check()?;
    Ok(self.intent(request.idempotency_key, "one-off"))
  }

  async fn get_payment(
    &self,
    payment_id: &str,
  ) -> Result<Option<Payment>, PaymentError> {
    self.check()?;
    self.lookups.lock().unwrap().push(payment_id.to_owned());
    Ok(self.payments.lock().unwrap().get(payment_id).cloned())
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A [`SqliteStore`] that can be told to lose every session rotation to a
/// competing request, or to fail session lookups outright.
pub struct RacingStore {
  inner:          SqliteStore,
  lose_rotations: AtomicBool,
  offline:        AtomicBool,
}

impl RacingStore {
  pub fn new(inner: SqliteStore) -> Self {
    Self {
      inner,
      lose_rotations: AtomicBool::new(false),
      offline: AtomicBool::new(false),
    }
  }

  pub fn set_lose_rotations(&self, lose: bool) {
    self.lose_rotations.store(lose, Ordering::SeqCst);
  }

  pub fn set_offline(&self, offline: bool) { self.offline.store(offline, Ordering::SeqCst); }
}

impl DropStore for RacingStore {
  type Error = StoreError;

  async fn find_or_create_user(&self, email: Email) -> Result<User, StoreError> {
    self.inner.find_or_create_user(email).await
  }

  async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
    self.inner.get_user(user_id).await
  }

  async fn update_user_email(
    &self,
    user_id: Uuid,
    email: Email,
  ) -> Result<EmailUpdate, StoreError> {
    self.inner.update_user_email(user_id, email).await
  }

  async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
    self.inner.create_session(session).await
  }

  async fn get_session(&self, token_hash: String) -> Result<Option<Session>, StoreError> {
    if self.offline.load(Ordering::SeqCst) {
      return Err(StoreError::Decode("store offline".into()));
    }
    self.inner.get_session(token_hash).await
  }

  /// When losing, a competing rotation of `old_hash` commits first.
  async fn rotate_session(
    &self,
    old_hash: String,
    replacement: NewSession,
    at: DateTime<Utc>,
  ) -> Result<Rotation, StoreError> {
    if self.lose_rotations.load(Ordering::SeqCst) {
      let rival = NewSession {
        token_hash: format!("rival-{}", replacement.token_hash),
        ..replacement.clone()
      };
      self.inner.rotate_session(old_hash.clone(), rival, at).await?;
    }
    self.inner.rotate_session(old_hash, replacement, at).await
  }

  async fn invalidate_session(
    &self,
    token_hash: String,
    at: DateTime<Utc>,
  ) -> Result<bool, StoreError> {
    self.inner.invalidate_session(token_hash, at).await
  }

  async fn publish_bundle(&self, bundle: NewBundle) -> Result<ContentBundle, StoreError> {
    self.inner.publish_bundle(bundle).await
  }

  async fn add_asset(&self, asset: NewAsset) -> Result<Asset, StoreError> {
    self.inner.add_asset(asset).await
  }

  async fn get_bundle(&self, bundle_id: Uuid) -> Result<Option<ContentBundle>, StoreError> {
    self.inner.get_bundle(bundle_id).await
  }

  async fn list_bundles(&self) -> Result<Vec<ContentBundle>, StoreError> {
    self.inner.list_bundles().await
  }

  async fn list_assets(&self, bundle_id: Option<Uuid>) -> Result<Vec<Asset>, StoreError> {
    self.inner.list_assets(bundle_id).await
  }

  async fn get_asset(&self, asset_id: Uuid) -> Result<Option<Asset>, StoreError> {
    self.inner.get_asset(asset_id).await
  }

  async fn bundle_for_period(&self, period: Period) -> Result<Option<Uuid>, StoreError> {
    self.inner.bundle_for_period(period).await
  }

  async fn latest_bundle_until(&self, period: Period) -> Result<Option<Uuid>, StoreError> {
    self.inner.latest_bundle_until(period).await
  }

  async fn append_entry(&self, entry: NewLedgerEntry) -> Result<GrantOutcome, StoreError> {
    self.inner.append_entry(entry).await
  }

  async fn has_entry(&self, user_id: Uuid, bundle_id: Uuid) -> Result<bool, StoreError> {
    self.inner.has_entry(user_id, bundle_id).await
  }

  async fn unlocked_bundle_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
    self.inner.unlocked_bundle_ids(user_id).await
  }

  async fn entries_for_user(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError> {
    self.inner.entries_for_user(user_id).await
  }
}
