//! # QConfig Agent
//!
//! Keeps a project's configuration cache fresh.
//!
//! ```text
//! qconfig-agent [config-path] [name ...]
//!
//!   config-path   qconfig.toml (defaults to the platform config dir)
//!   name          items to load at startup and log on every change
//! ```
//!
//! Settings can also come from `QCONFIG_*` environment variables; see
//! [`QConfigSettings`].

use std::path::PathBuf;
use std::sync::Arc;

use qconfig_sync::{QConfigSettings, RefreshTask, ReqwestTransport, SyncEngine};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let watched: Vec<String> = args.collect();

    let settings = QConfigSettings::load(config_path)?;
    let interval = settings.interval()?;
    info!(
        project = %settings.name,
        token_url = %settings.get_token_url,
        entrypoint_url = %settings.get_entrypoint_url,
        interval_secs = interval.as_secs(),
        "Configuration loaded"
    );

    let transport = Arc::new(ReqwestTransport::new(settings.request_timeout())?);
    let engine = Arc::new(SyncEngine::new(
        settings.identity()?,
        settings.base_dir()?,
        transport,
    ));
    engine.init().await?;
    info!(status = %serde_json::to_string(&engine.status())?, "Engine ready");

    for name in &watched {
        match engine.get(name).await {
            Ok(body) => info!(%name, bytes = body.len(), "Loaded config"),
            Err(e) if e.is_not_found() => warn!(%name, "Config not uploaded yet"),
            Err(e) => error!(%name, error = %e, "Failed to load config"),
        }
        engine.subscribe(name, |name, body| {
            info!(%name, bytes = body.len(), "Config changed");
        });
    }

    let refresh = RefreshTask::spawn(engine.clone(), interval);

    shutdown_signal().await;

    refresh.shutdown().await?;
    info!(status = %serde_json::to_string(&engine.status())?, "Agent stopped");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping agent...");
}
