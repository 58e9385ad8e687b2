//! Webhook signature verification.
//!
//! The provider signs the manifest
//! `id:<data.id>;request-id:<x-request-id>;ts:<ts>;` with HMAC-SHA256 and
//! sends `ts=<ts>,v1=<hex digest>` in the signature header. Field order and
//! punctuation of the manifest are fixed by the provider.
//!
//! Verification fails closed: every parse or crypto problem yields `false`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The fields of the signature header this verifier cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureHeader<'a> {
  pub ts: &'a str,
  pub v1: &'a str,
}

impl<'a> SignatureHeader<'a> {
  /// Parse `key=value` pairs separated by commas. Unknown keys are ignored;
  /// returns `None` if `ts` or `v1` is missing or empty.
  pub fn parse(header: &'a str) -> Option<Self> {
    let mut ts = None;
    let mut v1 = None;

    for part in header.split(',') {
      let Some((key, value)) = part.split_once('=') else {
        continue;
      };
      match key.trim() {
        "ts" => ts = Some(value.trim()),
        "v1" => v1 = Some(value.trim()),
        _ => {}
      }
    }

    match (ts, v1) {
      (Some(ts), Some(v1)) if !ts.is_empty() && !v1.is_empty() => {
        Some(Self { ts, v1 })
      }
      _ => None,
    }
  }

  /// `ts` as Unix seconds, if it is numeric.
  pub fn timestamp(&self) -> Option<i64> { self.ts.parse().ok() }
}

/// The exact byte sequence the provider signs.
pub fn manifest(data_id: &str, request_id: &str, ts: &str) -> String {
  format!("id:{data_id};request-id:{request_id};ts:{ts};")
}

/// Lowercase hex HMAC-SHA256 of `message` under `secret`.
fn hex_digest(secret: &str, message: &str) -> Option<String> {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
  mac.update(message.as_bytes());
  Some(hex::encode(mac.finalize().into_bytes()))
}

/// Check a webhook signature. Never panics; any failure is `false`.
pub fn verify(
  signature_header: &str,
  request_id: &str,
  data_id: &str,
  secret: &str,
) -> bool {
  let Some(header) = SignatureHeader::parse(signature_header) else {
    return false;
  };
  let Some(expected) =
    hex_digest(secret, &manifest(data_id, request_id, header.ts))
  else {
    return false;
  };
  expected.as_bytes().ct_eq(header.v1.as_bytes()).into()
}

/// Produce a header value the way the provider would. Used by tests and by
/// local tooling that replays webhooks against a development server.
pub fn sign(request_id: &str, data_id: &str, ts: i64, secret: &str) -> String {
  let ts = ts.to_string();
  let digest = hex_digest(secret, &manifest(data_id, request_id, &ts))
    .unwrap_or_default();
  format!("ts={ts},v1={digest}")
}
