pub mod assets;
pub mod bundles;
pub mod checkout;
pub mod session;
pub mod webhooks;

/// Liveness probe.
pub async fn healthz() -> &'static str { "ok" }
