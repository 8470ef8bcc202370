//! # courier-relay
//!
//! Binary entry point: loads settings, starts logging and metrics, and runs
//! the relay until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use courier_core::logging::{self, LogFormat};
use courier_server::{CourierServer, ServerConfig};
use courier_settings::CourierSettings;

/// Real-time presence and message relay.
#[derive(Parser, Debug)]
#[command(name = "courier-relay", about = "Courier presence and message relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.courier/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `info,courier_server=trace`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load settings from the chosen file and layer the flags on top.
    fn resolve_settings(&self) -> Result<CourierSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(courier_settings::settings_path);
        let mut settings = courier_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply_overrides(&mut settings);
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut CourierSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logging::init_subscriber(&settings.logging.level, format);

    let metrics_handle = courier_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings.server);
    let server = CourierServer::new(config, metrics_handle).context("Invalid server config")?;
    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    tracing::info!("Courier relay listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("shutdown signal received");

    let _ = server.stop(handle, None).await;
    Ok(())
}
