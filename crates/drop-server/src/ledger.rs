//! Entitlement Ledger: idempotent grants and unlock checks.
//!
//! Unlock status is derived from ledger rows on every request; nothing about
//! entitlements is cached in sessions or in the process.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use drop_core::{
  bundle::Period,
  ledger::{GrantOutcome, GrantSource, LedgerEntry, NewLedgerEntry},
  store::DropStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Error;

/// What to do with a subscription payment whose approval month has no
/// bundle.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeriodFallback {
  /// Grant nothing; the payment is logged and dropped.
  #[default]
  None,
  /// Grant the most recent bundle published for an earlier period.
  Latest,
}

/// How subscription payments map to bundles.
#[derive(Deserialize, Clone, Copy, Debug, Default)]
#[serde(default)]
pub struct PeriodPolicy {
  pub fallback: PeriodFallback,
}

pub struct EntitlementLedger<S> {
  store:  Arc<S>,
  policy: PeriodPolicy,
}

impl<S> Clone for EntitlementLedger<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), policy: self.policy }
  }
}

impl<S> EntitlementLedger<S>
where
  S: DropStore,
{
  pub fn new(store: Arc<S>, policy: PeriodPolicy) -> Self { Self { store, policy } }

  /// Record that `user_id` unlocked `bundle_id` through payment
  /// `external_reference`. Replays of the same triple are `AlreadyGranted`.
  pub async fn grant(
    &self,
    user_id: Uuid,
    bundle_id: Uuid,
    source: GrantSource,
    external_reference: &str,
  ) -> Result<GrantOutcome, Error> {
    let outcome = self
      .store
      .append_entry(NewLedgerEntry {
        user_id,
        bundle_id,
        source,
        external_reference: external_reference.to_owned(),
      })
      .await
      .map_err(Error::store)?;

    if let GrantOutcome::Granted(entry) = &outcome {
      tracing::info!(
        user_id = %user_id,
        bundle_id = %bundle_id,
        source = %source,
        entry_id = %entry.entry_id,
        "bundle unlocked"
      );
    }
    Ok(outcome)
  }

  pub async fn is_unlocked(&self, user_id: Uuid, bundle_id: Uuid) -> Result<bool, Error> {
    self
      .store
      .has_entry(user_id, bundle_id)
      .await
      .map_err(Error::store)
  }

  /// Every bundle `user_id` has unlocked.
  pub async fn unlocked_bundles(&self, user_id: Uuid) -> Result<HashSet<Uuid>, Error> {
    let ids = self
      .store
      .unlocked_bundle_ids(user_id)
      .await
      .map_err(Error::store)?;
    Ok(ids.into_iter().collect())
  }

  pub async fn entries_for_user(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, Error> {
    self
      .store
      .entries_for_user(user_id)
      .await
      .map_err(Error::store)
  }

  /// The bundle published for `month`/`year`, if any.
  pub async fn resolve_bundle_for_period(
    &self,
    month: u32,
    year: i32,
  ) -> Result<Option<Uuid>, Error> {
    let period = Period::new(month, year)?;
    self
      .store
      .bundle_for_period(period)
      .await
      .map_err(Error::store)
  }

  /// The bundle a subscription payment approved at `approved_at` pays for,
  /// under the configured [`PeriodPolicy`].
  pub async fn resolve_subscription_bundle(
    &self,
    approved_at: DateTime<Utc>,
  ) -> Result<Option<Uuid>, Error> {
    let period = Period::containing(approved_at);
    if let Some(id) = self.resolve_bundle_for_period(period.month, period.year).await? {
      return Ok(Some(id));
    }
    match self.policy.fallback {
      PeriodFallback::None => Ok(None),
      PeriodFallback::Latest => self
        .store
        .latest_bundle_until(period)
        .await
        .map_err(Error::store),
    }
  }
}
