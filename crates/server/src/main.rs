//! Mosaic server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use mosaic_core::config::AppConfig;
use mosaic_server::metrics::STALE_CLAIMS_RELEASED;
use mosaic_server::{AppState, create_router};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mosaic - chunked fragment upload and merge server
#[derive(Parser, Debug)]
#[command(name = "mosaicd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "MOSAIC_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `MOSAIC_`
/// environment variables (`MOSAIC_UPLOADS__MERGE_LEASE_SECS=600`).
fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if config_path.exists() {
        tracing::info!(config_path = %config_path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::info!(
            config_path = %config_path.display(),
            "No config file found, using defaults and environment"
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("MOSAIC_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Mosaic v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(Path::new(&args.config))?;

    mosaic_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let temp = mosaic_storage::from_config(&config.temp_storage)
        .await
        .context("failed to initialize temp storage")?;
    temp.health_check()
        .await
        .context("temp storage health check failed")?;

    let storage = mosaic_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(
        temp_backend = temp.backend_name(),
        storage_backend = storage.backend_name(),
        "Storage backends initialized"
    );

    let metadata = mosaic_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let state = AppState::new(config.clone(), temp, storage, metadata);

    if let Some(reaper) = state.uploader.reaper(&config.uploads) {
        reaper.spawn(config.uploads.reaper_interval(), |released| {
            STALE_CLAIMS_RELEASED.inc_by(released.len() as u64);
        });
    } else {
        tracing::info!("Merge reaper disabled (uploads.merge_lease_secs not set)");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
