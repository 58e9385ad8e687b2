//! End-to-end tests driving the router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{HeaderValue, Request, StatusCode, header},
  response::Response,
};
use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use drop_core::{
  blob::{BlobMetadata, BlobStore},
  bundle::{AssetKind, NewAsset, NewBundle, Period},
  payment::{Payment, PaymentStatus},
  session::NewSession,
  store::DropStore,
  user::Email,
};
use drop_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{
  AppState, ServerConfig,
  blob::FsBlobStore,
  ledger::PeriodPolicy,
  provider::PaymentConfig,
  router,
  session::{SessionConfig, hash_token},
  signature,
  test_support::{RacingStore, ScriptedProvider},
};

const SECRET: &str = "whsec-e2e";

struct Harness {
  app:      Router,
  store:    Arc<SqliteStore>,
  provider: Arc<ScriptedProvider>,
  bundle:   Uuid,
  preview:  Uuid,
  master:   Uuid,
  _blobs:   tempfile::TempDir,
}

fn config(blob_dir: &std::path::Path) -> ServerConfig {
  ServerConfig {
    host:         "127.0.0.1".into(),
    port:         8080,
    store_path:   ":memory:".into(),
    blob_dir:     blob_dir.to_path_buf(),
    session:      SessionConfig::default(),
    payment:      PaymentConfig {
      api_base_url:             "https://payments.example.com".into(),
      access_token:             "token".into(),
      webhook_secret:           SECRET.into(),
      return_url:               "https://drops.example.com/thanks".into(),
      subscription_price_cents: 900,
      currency:                 "USD".into(),
      max_signature_age_secs:   None,
    },
    subscription: PeriodPolicy::default(),
  }
}

async fn add_asset(
  store: &SqliteStore,
  blobs: &FsBlobStore,
  bundle_id: Uuid,
  kind: AssetKind,
  locator: &str,
  bytes: &'static [u8],
) -> Uuid {
  blobs
    .put(locator, Bytes::from_static(bytes), BlobMetadata::default())
    .await
    .unwrap();
  store
    .add_asset(NewAsset {
      bundle_id,
      kind,
      size_bytes: bytes.len() as u64,
      content_type: "image/jpeg".into(),
      locator: locator.into(),
    })
    .await
    .unwrap()
    .asset_id
}

async fn harness() -> Harness {
  let dir = tempfile::tempdir().unwrap();
  let blobs = Arc::new(FsBlobStore::new(dir.path()));
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let provider = Arc::new(ScriptedProvider::default());

  let bundle = store
    .publish_bundle(NewBundle {
      title:       "March Light".into(),
      period:      Period::new(3, 2024).unwrap(),
      price_cents: 1200,
      currency:    "USD".into(),
    })
    .await
    .unwrap()
    .bundle_id;

  let preview = add_asset(&store, &blobs, bundle, AssetKind::Preview, "2024-03/preview.jpg", b"preview-bytes").await;
  let master = add_asset(&store, &blobs, bundle, AssetKind::Master, "2024-03/master.jpg", b"master-bytes").await;

  let state = AppState::new(store.clone(), blobs, provider.clone(), &config(dir.path()));
  Harness {
    app: router(state),
    store,
    provider,
    bundle,
    preview,
    master,
    _blobs: dir,
  }
}

impl Harness {
  async fn send(
    &self,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
      builder = builder.header(header::COOKIE, cookie);
    }
    let body = match body {
      Some(json) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };
    self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
  }

  /// Log in and return the `name=value` cookie pair.
  async fn login(&self, email: &str) -> String {
    let resp = self
      .send("POST", "/auth/login", None, Some(json!({ "email": email })))
      .await;
    assert_eq!(resp.status(), StatusCode::OK);
    cookie_pair(&resp).expect("login sets a cookie")
  }

  async fn user_id(&self, email: &str) -> Uuid {
    self
      .store
      .find_or_create_user(Email::parse(email).unwrap())
      .await
      .unwrap()
      .user_id
  }

  /// Deliver a correctly signed payment notification.
  async fn deliver(&self, payment_id: &str) -> Response {
    let ts = Utc::now().timestamp();
    let req = Request::builder()
      .method("POST")
      .uri(format!("/webhooks/payment?data.id={payment_id}&type=payment"))
      .header("x-signature", signature::sign("req-1", payment_id, ts, SECRET))
      .header("x-request-id", "req-1")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(
        json!({ "type": "payment", "data": { "id": payment_id } }).to_string(),
      ))
      .unwrap();
    self.app.clone().oneshot(req).await.unwrap()
  }

  fn approve_one_off(&self, payment_id: &str, user: Uuid) {
    self.provider.add_payment(Payment {
      payment_id:         payment_id.into(),
      status:             PaymentStatus::Approved,
      external_reference: Some(user.to_string()),
      approved_at:        Some(Utc.with_ymd_and_hms(2024, 3, 20, 10, 0, 0).unwrap()),
      bundle_id:          Some(self.bundle),
    });
  }
}

/// The first `Set-Cookie` header reduced to `name=value`.
fn cookie_pair(resp: &Response) -> Option<String> {
  let raw = resp.headers().get(header::SET_COOKIE)?.to_str().ok()?;
  raw.split(';').next().map(str::to_owned)
}

fn set_cookie(resp: &Response) -> Option<&str> {
  resp.headers().get(header::SET_COOKIE)?.to_str().ok()
}

async fn body_bytes(resp: Response) -> Bytes {
  axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap()
}

async fn body_json(resp: Response) -> Value {
  serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn healthz_is_ok() {
  let h = harness().await;
  let resp = h.send("GET", "/healthz", None, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(&body_bytes(resp).await[..], b"ok");
}

#[tokio::test]
async fn login_me_logout() {
  let h = harness().await;

  let resp = h
    .send("POST", "/auth/login", None, Some(json!({ "email": " Alice@Example.com " })))
    .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let raw = set_cookie(&resp).unwrap().to_owned();
  assert!(raw.contains("HttpOnly") && raw.contains("Secure") && raw.contains("SameSite=Lax"));
  let cookie = cookie_pair(&resp).unwrap();
  assert_eq!(body_json(resp).await["email"], "alice@example.com");

  let resp = h.send("GET", "/session/me", Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let me = body_json(resp).await;
  assert_eq!(me["user"]["email"], "alice@example.com");
  assert_eq!(me["entitlements"], json!([]));

  let resp = h.send("POST", "/auth/logout", Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);
  assert!(set_cookie(&resp).unwrap().contains("Max-Age=0"));

  let resp = h.send("GET", "/session/me", Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(set_cookie(&resp).unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn anonymous_and_garbage_cookies_are_unauthenticated() {
  let h = harness().await;

  let resp = h.send("GET", "/session/me", None, None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(set_cookie(&resp).is_none());
  assert_eq!(&body_bytes(resp).await[..], b"Unauthorized");

  let resp = h.send("GET", "/session/me", Some("drop_session=forged"), None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(set_cookie(&resp).unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn login_rejects_malformed_email() {
  let h = harness().await;
  let resp = h
    .send("POST", "/auth/login", None, Some(json!({ "email": "not an address" })))
    .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(set_cookie(&resp).is_none());
}

#[tokio::test]
async fn login_revokes_the_presented_session() {
  let h = harness().await;
  let first = h.login("alice@example.com").await;
  let resp = h
    .send("POST", "/auth/login", Some(&first), Some(json!({ "email": "bob@example.com" })))
    .await;
  let second = cookie_pair(&resp).unwrap();
  assert_ne!(first, second);

  let resp = h.send("GET", "/session/me", Some(&first), None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  let resp = h.send("GET", "/session/me", Some(&second), None).await;
  assert_eq!(body_json(resp).await["user"]["email"], "bob@example.com");
}

#[tokio::test]
async fn stale_session_is_rotated_on_use() {
  let h = harness().await;
  let user = h.user_id("alice@example.com").await;
  let token = "A".repeat(43);
  let now = Utc::now();
  h.store
    .create_session(NewSession {
      token_hash: hash_token(&token),
      user_id:    user,
      created_at: now - Duration::days(2),
      expires_at: now + Duration::days(20),
    })
    .await
    .unwrap();
  let old = format!("drop_session={token}");

  let resp = h.send("GET", "/session/me", Some(&old), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let new = cookie_pair(&resp).unwrap();
  assert_ne!(new, old);

  let resp = h.send("GET", "/session/me", Some(&old), None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  let resp = h.send("GET", "/session/me", Some(&new), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert!(set_cookie(&resp).is_none());
}

/// An app over a [`RacingStore`] holding one stale session for alice.
async fn racing_app() -> (Router, Arc<RacingStore>, String, tempfile::TempDir) {
  let dir = tempfile::tempdir().unwrap();
  let store = Arc::new(RacingStore::new(SqliteStore::open_in_memory().await.unwrap()));
  let user = store
    .find_or_create_user(Email::parse("alice@example.com").unwrap())
    .await
    .unwrap();
  let token = "B".repeat(43);
  let now = Utc::now();
  store
    .create_session(NewSession {
      token_hash: hash_token(&token),
      user_id:    user.user_id,
      created_at: now - Duration::days(2),
      expires_at: now + Duration::days(20),
    })
    .await
    .unwrap();

  let state = AppState::new(
    store.clone(),
    Arc::new(FsBlobStore::new(dir.path())),
    Arc::new(ScriptedProvider::default()),
    &config(dir.path()),
  );
  (router(state), store, format!("drop_session={token}"), dir)
}

async fn get_me(app: &Router, cookie: &str) -> Response {
  let req = Request::builder()
    .uri("/session/me")
    .header(header::COOKIE, cookie)
    .body(Body::empty())
    .unwrap();
  app.clone().oneshot(req).await.unwrap()
}

#[tokio::test]
async fn lost_rotation_race_is_409_without_cookie() {
  let (app, store, cookie, _dir) = racing_app().await;
  store.set_lose_rotations(true);

  let resp = get_me(&app, &cookie).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
  assert!(set_cookie(&resp).is_none());
}

#[tokio::test]
async fn store_failure_during_session_check_is_500() {
  let (app, store, cookie, _dir) = racing_app().await;
  store.set_offline(true);

  let resp = get_me(&app, &cookie).await;
  assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
  assert!(set_cookie(&resp).is_none());
  let body = body_json(resp).await;
  assert_eq!(body, json!({ "error": "internal error" }));
}

#[tokio::test]
async fn email_change_conflicts_with_existing_user() {
  let h = harness().await;
  h.login("bob@example.com").await;
  let cookie = h.login("alice@example.com").await;

  let resp = h
    .send("PATCH", "/session/me", Some(&cookie), Some(json!({ "email": "bob@example.com" })))
    .await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);

  let resp = h
    .send("PATCH", "/session/me", Some(&cookie), Some(json!({ "email": "ALICE@new.example.com" })))
    .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(body_json(resp).await["email"], "alice@new.example.com");

  let resp = h
    .send("PATCH", "/session/me", None, Some(json!({ "email": "x@example.com" })))
    .await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ─── Downloads ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn download_gating_end_to_end() {
  let h = harness().await;
  let master = format!("/assets/{}/download", h.master);
  let preview = format!("/assets/{}/download", h.preview);

  let resp = h.send("GET", &master, None, None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

  let resp = h.send("GET", &preview, None, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(&body_bytes(resp).await[..], b"preview-bytes");

  let cookie = h.login("alice@example.com").await;
  let resp = h.send("GET", &master, Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  assert_eq!(&body_bytes(resp).await[..], b"Forbidden");

  let user = h.user_id("alice@example.com").await;
  h.approve_one_off("7001", user);
  assert_eq!(h.deliver("7001").await.status(), StatusCode::OK);

  let resp = h.send("GET", &master, Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
  assert_eq!(resp.headers()[header::CONTENT_LENGTH], HeaderValue::from(12u64));
  assert_eq!(
    resp.headers()[header::CONTENT_DISPOSITION],
    "attachment; filename=\"MarchLight-master.jpg\""
  );
  assert_eq!(&body_bytes(resp).await[..], b"master-bytes");

  let resp = h.send("GET", &preview, Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_or_malformed_asset_ids_are_denied_like_gated_ones() {
  let h = harness().await;
  let cookie = h.login("alice@example.com").await;
  let unknown = format!("/assets/{}/download", Uuid::new_v4());
  let master = format!("/assets/{}/download", h.master);

  for uri in [unknown.as_str(), "/assets/not-a-uuid/download", master.as_str()] {
    let resp = h.send("GET", uri, Some(&cookie), None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
  }
}

#[tokio::test]
async fn anonymous_callers_cannot_tell_gated_assets_from_unknown_ones() {
  let h = harness().await;
  let unknown = format!("/assets/{}/download", Uuid::new_v4());
  let master = format!("/assets/{}/download", h.master);

  let gated = h.send("GET", &master, None, None).await;
  let missing = h.send("GET", &unknown, None, None).await;
  let malformed = h.send("GET", "/assets/not-a-uuid/download", None, None).await;

  assert_eq!(gated.status(), StatusCode::UNAUTHORIZED);
  assert_eq!(missing.status(), gated.status());
  assert_eq!(malformed.status(), gated.status());
  assert_eq!(body_bytes(missing).await, body_bytes(gated).await);
}

#[tokio::test]
async fn bundle_listing_reports_unlock_state() {
  let h = harness().await;
  let other = h
    .store
    .publish_bundle(NewBundle {
      title:       "April".into(),
      period:      Period::new(4, 2024).unwrap(),
      price_cents: 1200,
      currency:    "USD".into(),
    })
    .await
    .unwrap()
    .bundle_id;

  let resp = h.send("GET", "/bundles", None, None).await;
  let listed = body_json(resp).await;
  let listed = listed.as_array().unwrap();
  assert_eq!(listed.len(), 2);
  assert_eq!(listed[0]["bundle_id"], other.to_string());
  assert!(listed.iter().all(|b| b["unlocked"] == false));
  let assets = listed[1]["assets"].as_array().unwrap();
  assert_eq!(assets.len(), 2);
  assert!(assets.iter().all(|a| a.get("locator").is_none()));

  let cookie = h.login("alice@example.com").await;
  let user = h.user_id("alice@example.com").await;
  h.approve_one_off("7002", user);
  h.deliver("7002").await;

  let listed = body_json(h.send("GET", "/bundles", Some(&cookie), None).await).await;
  for b in listed.as_array().unwrap() {
    let expected = b["bundle_id"] == h.bundle.to_string();
    assert_eq!(b["unlocked"], expected, "{b}");
  }
}

// ─── Webhooks ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn replayed_webhook_grants_once() {
  let h = harness().await;
  let user = h.user_id("alice@example.com").await;
  h.approve_one_off("8001", user);

  assert_eq!(h.deliver("8001").await.status(), StatusCode::OK);
  assert_eq!(h.deliver("8001").await.status(), StatusCode::OK);

  let entries = h.store.entries_for_user(user).await.unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].external_reference, "8001");
}

#[tokio::test]
async fn forged_webhook_is_acknowledged_but_ignored() {
  let h = harness().await;
  let user = h.user_id("alice@example.com").await;
  h.approve_one_off("8002", user);

  let req = Request::builder()
    .method("POST")
    .uri("/webhooks/payment?data.id=8002&type=payment")
    .header("x-signature", signature::sign("req-1", "8002", Utc::now().timestamp(), "wrong"))
    .header("x-request-id", "req-1")
    .body(Body::empty())
    .unwrap();
  let resp = h.app.clone().oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::OK);
  assert!(body_bytes(resp).await.is_empty());

  let req = Request::builder()
    .method("POST")
    .uri("/webhooks/payment")
    .body(Body::from("{}"))
    .unwrap();
  assert_eq!(h.app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);

  assert!(h.store.entries_for_user(user).await.unwrap().is_empty());
  assert!(h.provider.lookups().is_empty());
}

#[tokio::test]
async fn webhook_during_provider_outage_is_still_200() {
  let h = harness().await;
  h.provider.set_failing(true);
  assert_eq!(h.deliver("8003").await.status(), StatusCode::OK);
}

// ─── Checkout ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn checkout_requires_a_session() {
  let h = harness().await;
  let resp = h.send("POST", "/checkout/subscription", None, None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  let resp = h
    .send("POST", &format!("/checkout/one-off/{}", h.bundle), None, None)
    .await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(h.provider.idempotency_keys().is_empty());
}

#[tokio::test]
async fn every_checkout_uses_a_fresh_idempotency_key() {
  let h = harness().await;
  let cookie = h.login("alice@example.com").await;

  for _ in 0..2 {
    let resp = h.send("POST", "/checkout/subscription", Some(&cookie), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let url = body_json(resp).await["redirect_url"].as_str().unwrap().to_owned();
    assert!(url.starts_with("https://pay.example.com/subscription/"));
  }
  let resp = h
    .send("POST", &format!("/checkout/one-off/{}", h.bundle), Some(&cookie), None)
    .await;
  assert_eq!(resp.status(), StatusCode::OK);

  let keys = h.provider.idempotency_keys();
  assert_eq!(keys.len(), 3);
  assert_ne!(keys[0], keys[1]);
  assert_ne!(keys[1], keys[2]);
  assert_ne!(keys[0], keys[2]);
}

#[tokio::test]
async fn one_off_checkout_for_unknown_bundle_is_404() {
  let h = harness().await;
  let cookie = h.login("alice@example.com").await;
  let resp = h
    .send("POST", &format!("/checkout/one-off/{}", Uuid::new_v4()), Some(&cookie), None)
    .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert!(h.provider.idempotency_keys().is_empty());
}

#[tokio::test]
async fn provider_failure_is_a_generic_502() {
  let h = harness().await;
  let cookie = h.login("alice@example.com").await;
  h.provider.set_failing(true);

  let resp = h.send("POST", "/checkout/subscription", Some(&cookie), None).await;
  assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
  let body = body_bytes(resp).await;
  let text = std::str::from_utf8(&body).unwrap();
  assert!(text.contains("payment service unavailable"));
  assert!(!text.contains("provider-internal-detail"));
}
