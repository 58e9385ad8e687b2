//! SQL schema for the drop SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id     TEXT PRIMARY KEY,
    email       TEXT NOT NULL UNIQUE,   -- normalised: trimmed, lowercased
    created_at  TEXT NOT NULL
);

-- Keyed by the SHA-256 of the opaque token; the token itself is never stored.
-- Only invalidated_at is ever written after insert, and only from NULL.
CREATE TABLE IF NOT EXISTS sessions (
    token_hash      TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users(user_id),
    created_at      TEXT NOT NULL,
    expires_at      TEXT NOT NULL,
    invalidated_at  TEXT
);

CREATE TABLE IF NOT EXISTS bundles (
    bundle_id     TEXT PRIMARY KEY,
    title         TEXT NOT NULL,
    period_year   INTEGER NOT NULL,
    period_month  INTEGER NOT NULL CHECK (period_month BETWEEN 1 AND 12),
    price_cents   INTEGER NOT NULL,
    currency      TEXT NOT NULL,
    published_at  TEXT NOT NULL,
    UNIQUE (period_year, period_month)
);

CREATE TABLE IF NOT EXISTS assets (
    asset_id      TEXT PRIMARY KEY,
    bundle_id     TEXT NOT NULL REFERENCES bundles(bundle_id),
    kind          TEXT NOT NULL,   -- 'preview' | 'master' | 'print' | 'archive'
    size_bytes    INTEGER NOT NULL,
    content_type  TEXT NOT NULL,
    locator       TEXT NOT NULL
);

-- Strictly append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS ledger (
    entry_id            TEXT PRIMARY KEY,
    user_id             TEXT NOT NULL REFERENCES users(user_id),
    bundle_id           TEXT NOT NULL REFERENCES bundles(bundle_id),
    source              TEXT NOT NULL,   -- 'subscription' | 'one_off'
    external_reference  TEXT NOT NULL,
    recorded_at         TEXT NOT NULL,
    UNIQUE (user_id, bundle_id, external_reference)
);

CREATE INDEX IF NOT EXISTS sessions_user_idx ON sessions(user_id);
CREATE INDEX IF NOT EXISTS assets_bundle_idx ON assets(bundle_id);
-- The ledger UNIQUE index leads with (user_id, bundle_id) and serves unlock checks.

PRAGMA user_version = 1;
";
