//! [`SqliteStore`] — the SQLite implementation of [`DropStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use drop_core::{
  bundle::{Asset, ContentBundle, NewAsset, NewBundle, Period},
  ledger::{GrantOutcome, LedgerEntry, NewLedgerEntry},
  session::{NewSession, Rotation, Session},
  store::DropStore,
  user::{Email, EmailUpdate, User},
};

use crate::{
  encode::{
    decode_uuid, encode_dt, encode_uuid, RawAsset, RawBundle, RawEntry,
    RawSession, RawUser,
  },
  schema::SCHEMA,
  Error, Result,
};

/// Whether `err` is a UNIQUE constraint violation (as opposed to any other
/// constraint, e.g. a foreign key).
fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

enum RawEmailUpdate {
  Updated(RawUser),
  Taken,
  UnknownUser,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A drop store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read a single row by primary key with one of the `Raw*::COLUMNS` lists.
  async fn fetch_one<R, F>(
    &self,
    table: &'static str,
    columns: &'static str,
    key_column: &'static str,
    key: String,
    from_row: F,
  ) -> Result<Option<R>>
  where
    R: Send + 'static,
    F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<R> + Send + 'static,
  {
    let raw = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {columns} FROM {table} WHERE {key_column} = ?1");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![key], from_row)
            .optional()?,
        )
      })
      .await?;
    Ok(raw)
  }
}

// ─── DropStore impl ──────────────────────────────────────────────────────────

impl DropStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn find_or_create_user(&self, email: Email) -> Result<User> {
    let id_str    = encode_uuid(Uuid::new_v4());
    let email_str = email.as_str().to_owned();
    let at_str    = encode_dt(Utc::now());

    let raw: RawUser = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (user_id, email, created_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (email) DO NOTHING",
          rusqlite::params![id_str, email_str, at_str],
        )?;
        let sql = format!("SELECT {} FROM users WHERE email = ?1", RawUser::COLUMNS);
        Ok(conn.query_row(&sql, rusqlite::params![email_str], RawUser::from_row)?)
      })
      .await?;

    raw.into_user()
  }

  async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
    self
      .fetch_one(
        "users",
        RawUser::COLUMNS,
        "user_id",
        encode_uuid(user_id),
        RawUser::from_row,
      )
      .await?
      .map(RawUser::into_user)
      .transpose()
  }

  async fn update_user_email(&self, user_id: Uuid, email: Email) -> Result<EmailUpdate> {
    let id_str    = encode_uuid(user_id);
    let email_str = email.as_str().to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        let changed = match conn.execute(
          "UPDATE users SET email = ?2 WHERE user_id = ?1",
          rusqlite::params![id_str, email_str],
        ) {
          Ok(n) => n,
          Err(e) if is_unique_violation(&e) => return Ok(RawEmailUpdate::Taken),
          Err(e) => return Err(e.into()),
        };
        if changed == 0 {
          return Ok(RawEmailUpdate::UnknownUser);
        }
        let sql = format!("SELECT {} FROM users WHERE user_id = ?1", RawUser::COLUMNS);
        let row = conn.query_row(&sql, rusqlite::params![id_str], RawUser::from_row)?;
        Ok(RawEmailUpdate::Updated(row))
      })
      .await?;

    Ok(match raw {
      RawEmailUpdate::Updated(row) => EmailUpdate::Updated(row.into_user()?),
      RawEmailUpdate::Taken => EmailUpdate::Taken,
      RawEmailUpdate::UnknownUser => EmailUpdate::UnknownUser,
    })
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn create_session(&self, session: NewSession) -> Result<Session> {
    let hash_str    = session.token_hash.clone();
    let user_str    = encode_uuid(session.user_id);
    let created_str = encode_dt(session.created_at);
    let expires_str = encode_dt(session.expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![hash_str, user_str, created_str, expires_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(Session::from(session))
  }

  async fn get_session(&self, token_hash: String) -> Result<Option<Session>> {
    self
      .fetch_one(
        "sessions",
        RawSession::COLUMNS,
        "token_hash",
        token_hash,
        RawSession::from_row,
      )
      .await?
      .map(RawSession::into_session)
      .transpose()
  }

  async fn rotate_session(
    &self,
    old_hash:    String,
    replacement: NewSession,
    at:          DateTime<Utc>,
  ) -> Result<Rotation> {
    let at_str      = encode_dt(at);
    let hash_str    = replacement.token_hash.clone();
    let user_str    = encode_uuid(replacement.user_id);
    let created_str = encode_dt(replacement.created_at);
    let expires_str = encode_dt(replacement.expires_at);

    let rotated: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE sessions SET invalidated_at = ?2
           WHERE token_hash = ?1 AND invalidated_at IS NULL",
          rusqlite::params![old_hash, at_str],
        )?;
        if changed == 0 {
          // Dropping `tx` rolls back; nothing was written anyway.
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![hash_str, user_str, created_str, expires_str],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if rotated {
      Ok(Rotation::Rotated(Session::from(replacement)))
    } else {
      Ok(Rotation::Conflict)
    }
  }

  async fn invalidate_session(
    &self,
    token_hash: String,
    at: DateTime<Utc>,
  ) -> Result<bool> {
    let at_str = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sessions SET invalidated_at = ?2
           WHERE token_hash = ?1 AND invalidated_at IS NULL",
          rusqlite::params![token_hash, at_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  // ── Bundles and assets ────────────────────────────────────────────────────

  async fn publish_bundle(&self, input: NewBundle) -> Result<ContentBundle> {
    let bundle = ContentBundle {
      bundle_id:    Uuid::new_v4(),
      title:        input.title,
      period:       input.period,
      price_cents:  input.price_cents,
      currency:     input.currency,
      published_at: Utc::now(),
    };

    let id_str       = encode_uuid(bundle.bundle_id);
    let title        = bundle.title.clone();
    let year         = i64::from(bundle.period.year);
    let month        = i64::from(bundle.period.month);
    let price        = bundle.price_cents;
    let currency     = bundle.currency.clone();
    let published_at = encode_dt(bundle.published_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO bundles (
             bundle_id, title, period_year, period_month,
             price_cents, currency, published_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, title, year, month, price, currency, published_at],
        )?;
        Ok(())
      })
      .await?;

    Ok(bundle)
  }

  async fn add_asset(&self, input: NewAsset) -> Result<Asset> {
    let asset = Asset {
      asset_id:     Uuid::new_v4(),
      bundle_id:    input.bundle_id,
      kind:         input.kind,
      size_bytes:   input.size_bytes,
      content_type: input.content_type,
      locator:      input.locator,
    };

    let id_str       = encode_uuid(asset.asset_id);
    let bundle_str   = encode_uuid(asset.bundle_id);
    let kind_str     = asset.kind.as_str();
    let size         = i64::try_from(asset.size_bytes)
      .map_err(|_| Error::Decode(format!("size {}", asset.size_bytes)))?;
    let content_type = asset.content_type.clone();
    let locator      = asset.locator.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO assets (asset_id, bundle_id, kind, size_bytes, content_type, locator)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, bundle_str, kind_str, size, content_type, locator],
        )?;
        Ok(())
      })
      .await?;

    Ok(asset)
  }

  async fn get_bundle(&self, bundle_id: Uuid) -> Result<Option<ContentBundle>> {
    self
      .fetch_one(
        "bundles",
        RawBundle::COLUMNS,
        "bundle_id",
        encode_uuid(bundle_id),
        RawBundle::from_row,
      )
      .await?
      .map(RawBundle::into_bundle)
      .transpose()
  }

  async fn list_bundles(&self) -> Result<Vec<ContentBundle>> {
    let raws: Vec<RawBundle> = self
      .conn
      .call(|conn| {
        let sql = format!(
          "SELECT {} FROM bundles ORDER BY period_year DESC, period_month DESC",
          RawBundle::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawBundle::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBundle::into_bundle).collect()
  }

  async fn list_assets(&self, bundle_id: Option<Uuid>) -> Result<Vec<Asset>> {
    let bundle_str = bundle_id.map(encode_uuid);

    let raws: Vec<RawAsset> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(b) = bundle_str {
          let sql = format!("SELECT {} FROM assets WHERE bundle_id = ?1", RawAsset::COLUMNS);
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![b], RawAsset::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let sql = format!("SELECT {} FROM assets", RawAsset::COLUMNS);
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map([], RawAsset::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAsset::into_asset).collect()
  }

  async fn get_asset(&self, asset_id: Uuid) -> Result<Option<Asset>> {
    self
      .fetch_one(
        "assets",
        RawAsset::COLUMNS,
        "asset_id",
        encode_uuid(asset_id),
        RawAsset::from_row,
      )
      .await?
      .map(RawAsset::into_asset)
      .transpose()
  }

  async fn bundle_for_period(&self, period: Period) -> Result<Option<Uuid>> {
    let year  = i64::from(period.year);
    let month = i64::from(period.month);

    let id: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT bundle_id FROM bundles WHERE period_year = ?1 AND period_month = ?2",
              rusqlite::params![year, month],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    id.as_deref().map(decode_uuid).transpose()
  }

  async fn latest_bundle_until(&self, period: Period) -> Result<Option<Uuid>> {
    let year  = i64::from(period.year);
    let month = i64::from(period.month);

    let id: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT bundle_id FROM bundles
               WHERE period_year < ?1 OR (period_year = ?1 AND period_month <= ?2)
               ORDER BY period_year DESC, period_month DESC
               LIMIT 1",
              rusqlite::params![year, month],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    id.as_deref().map(decode_uuid).transpose()
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn append_entry(&self, input: NewLedgerEntry) -> Result<GrantOutcome> {
    let entry = LedgerEntry {
      entry_id:           Uuid::new_v4(),
      user_id:            input.user_id,
      bundle_id:          input.bundle_id,
      source:             input.source,
      external_reference: input.external_reference,
      recorded_at:        Utc::now(),
    };

    let id_str     = encode_uuid(entry.entry_id);
    let user_str   = encode_uuid(entry.user_id);
    let bundle_str = encode_uuid(entry.bundle_id);
    let source_str = entry.source.as_str();
    let reference  = entry.external_reference.clone();
    let at_str     = encode_dt(entry.recorded_at);

    let inserted: bool = self
      .conn
      .call(move |conn| {
        match conn.execute(
          "INSERT INTO ledger (
             entry_id, user_id, bundle_id, source, external_reference, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, user_str, bundle_str, source_str, reference, at_str],
        ) {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if inserted {
      Ok(GrantOutcome::Granted(entry))
    } else {
      tracing::debug!(
        user_id = %entry.user_id,
        bundle_id = %entry.bundle_id,
        reference = %entry.external_reference,
        "ledger entry already present"
      );
      Ok(GrantOutcome::AlreadyGranted)
    }
  }

  async fn has_entry(&self, user_id: Uuid, bundle_id: Uuid) -> Result<bool> {
    let user_str   = encode_uuid(user_id);
    let bundle_str = encode_uuid(bundle_id);

    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM ledger WHERE user_id = ?1 AND bundle_id = ?2 LIMIT 1",
              rusqlite::params![user_str, bundle_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;

    Ok(found)
  }

  async fn unlocked_bundle_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
    let user_str = encode_uuid(user_id);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT DISTINCT bundle_id FROM ledger WHERE user_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn entries_for_user(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>> {
    let user_str = encode_uuid(user_id);

    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM ledger WHERE user_id = ?1 ORDER BY recorded_at ASC",
          RawEntry::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }
}
