//! dispensary server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the inventory API over HTTP under
//! `/api`. Every setting can be overridden with a `DISPENSARY_`-prefixed
//! environment variable, e.g. `DISPENSARY_PORT=9000`.

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use dispensary_api::{ApiState, api_router};
use dispensary_core::clock::{Clock, SystemClock};
use dispensary_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{ServerConfig, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Pharmacy inventory server")]
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

  let server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  anyhow::ensure!(
    server_cfg.alert_lookahead_days >= 0,
    "alert_lookahead_days must not be negative"
  );

  let store_path = expand_tilde(&server_cfg.store_path);
  let clock: Arc<dyn Clock> = Arc::new(SystemClock);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_clock(clock.clone());
  tracing::info!(path = ?store_path, "store opened");

  let state = Arc::new(ApiState {
    store: Arc::new(store),
    clock,
    alert_lookahead_days: server_cfg.alert_lookahead_days,
  });

  let app = Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http());
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
