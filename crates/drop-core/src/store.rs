//! The `DropStore` trait: the transactional store capability the core needs.
//!
//! The trait is implemented by storage backends (e.g. `drop-store-sqlite`).
//! Components in `drop-server` depend on this abstraction, not on any
//! concrete backend.
//!
//! Outcomes that callers must branch on (a lost rotation race, a duplicate
//! grant, a taken address) are returned as values; `Self::Error` is reserved
//! for the store being unavailable or corrupt.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  bundle::{Asset, ContentBundle, NewAsset, NewBundle, Period},
  ledger::{GrantOutcome, LedgerEntry, NewLedgerEntry},
  session::{NewSession, Rotation, Session},
  user::{Email, EmailUpdate, User},
};

/// Abstraction over the relational store backing users, sessions, bundles,
/// and the entitlement ledger.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait DropStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Return the user holding `email`, creating one if none exists.
  /// Concurrent calls with the same address converge on a single user.
  fn find_or_create_user(
    &self,
    email: Email,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Retrieve a user by UUID. Returns `None` if not found.
  fn get_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Replace a user's contact address.
  fn update_user_email(
    &self,
    user_id: Uuid,
    email: Email,
  ) -> impl Future<Output = Result<EmailUpdate, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  fn create_session(
    &self,
    session: NewSession,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Look up a session by token digest, including invalidated ones.
  fn get_session(
    &self,
    token_hash: String,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  /// In one transaction: invalidate `old_hash` iff it is still valid, then
  /// store `replacement`. Returns [`Rotation::Conflict`] without writing
  /// anything if `old_hash` was already invalidated.
  fn rotate_session(
    &self,
    old_hash: String,
    replacement: NewSession,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Rotation, Self::Error>> + Send + '_;

  /// Stamp `invalidated_at` on a session. Returns `false` if the session was
  /// unknown or already invalidated.
  fn invalidate_session(
    &self,
    token_hash: String,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Bundles and assets (written by the trusted authoring surface) ─────

  /// Publish a bundle. Fails if another bundle already covers the period.
  fn publish_bundle(
    &self,
    bundle: NewBundle,
  ) -> impl Future<Output = Result<ContentBundle, Self::Error>> + Send + '_;

  fn add_asset(
    &self,
    asset: NewAsset,
  ) -> impl Future<Output = Result<Asset, Self::Error>> + Send + '_;

  fn get_bundle(
    &self,
    bundle_id: Uuid,
  ) -> impl Future<Output = Result<Option<ContentBundle>, Self::Error>> + Send + '_;

  /// All bundles, newest period first.
  fn list_bundles(
    &self,
  ) -> impl Future<Output = Result<Vec<ContentBundle>, Self::Error>> + Send + '_;

  /// Assets of one bundle, or of every bundle when `bundle_id` is `None`.
  fn list_assets(
    &self,
    bundle_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<Asset>, Self::Error>> + Send + '_;

  fn get_asset(
    &self,
    asset_id: Uuid,
  ) -> impl Future<Output = Result<Option<Asset>, Self::Error>> + Send + '_;

  /// The bundle published for exactly `period`, if any.
  fn bundle_for_period(
    &self,
    period: Period,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;

  /// The most recent bundle whose period is at or before `period`.
  fn latest_bundle_until(
    &self,
    period: Period,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;

  // ── Ledger — append-only ──────────────────────────────────────────────

  /// Append an entry. A duplicate `(user, bundle, reference)` is reported as
  /// [`GrantOutcome::AlreadyGranted`], never as an error.
  fn append_entry(
    &self,
    entry: NewLedgerEntry,
  ) -> impl Future<Output = Result<GrantOutcome, Self::Error>> + Send + '_;

  /// Whether any entry exists for the pair.
  fn has_entry(
    &self,
    user_id: Uuid,
    bundle_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Distinct bundle ids the user holds at least one entry for.
  fn unlocked_bundle_ids(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Every entry recorded for the user, oldest first.
  fn entries_for_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LedgerEntry>, Self::Error>> + Send + '_;
}
