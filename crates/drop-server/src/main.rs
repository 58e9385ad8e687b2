//! drop-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `DROPS_*` environment variables, opens the SQLite store and blob
//! directory, and serves the HTTP API.
//!
//! Nested keys use a double underscore, e.g.
//! `DROPS_PAYMENT__WEBHOOK_SECRET=...`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use drop_server::{
  AppState, ServerConfig, blob::FsBlobStore, provider::HttpPaymentProvider,
};
use drop_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Drop access server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("DROPS")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read configuration")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if !server_cfg.session.secure_cookie {
    tracing::warn!("session cookies will be sent without the Secure attribute");
  }

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let blob_dir = expand_tilde(&server_cfg.blob_dir);
  tokio::fs::create_dir_all(&blob_dir)
    .await
    .with_context(|| format!("failed to create blob directory {blob_dir:?}"))?;

  let provider = HttpPaymentProvider::new(&server_cfg.payment)
    .context("failed to build payment client")?;

  let state = AppState::new(
    Arc::new(store),
    Arc::new(FsBlobStore::new(blob_dir)),
    Arc::new(provider),
    &server_cfg,
  );

  let app = drop_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
