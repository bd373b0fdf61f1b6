//! # sitehub
//!
//! Collaboration hub binary: loads settings, wires the bulk services and
//! starts the HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sitehub_core::init_subscriber;
use sitehub_server::metrics::install_recorder;
use sitehub_server::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;
use sitehub_server::{HubServer, MemoryEntityService, ServerConfig, ServiceRegistry};
use sitehub_settings::{SitehubSettings, load_settings_from_path, settings_path};
use tracing::{info, warn};

/// Real-time collaboration hub.
#[derive(Parser, Debug)]
#[command(name = "sitehub", about = "Real-time collaboration hub")]
struct Cli {
    /// Settings file (defaults to `$SITEHUB_CONFIG` or `~/.sitehub/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, settings: &mut SitehubSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn build_services(entity_types: &[String]) -> ServiceRegistry {
    let mut services = ServiceRegistry::new();
    for entity_type in entity_types {
        services.register(entity_type, MemoryEntityService::new());
    }
    services
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    init_subscriber(&settings.logging.level, settings.logging.format);
    let metrics = install_recorder().context("Failed to install metrics recorder")?;

    let services = build_services(&settings.hub.in_memory_entities);
    let entity_types = services.entity_types();
    let server = HubServer::new(ServerConfig::from(&settings), services).with_metrics(metrics);

    let (addr, handle) = server
        .listen(server.bind_addr())
        .await
        .context("Failed to bind server")?;
    info!(?entity_types, "sitehub listening on ws://{addr}/ws/projects/{{project_id}}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("shutting down");
    server.shutdown().graceful_shutdown(None).await;
    if tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, handle).await.is_err() {
        warn!("server did not stop within {DEFAULT_SHUTDOWN_TIMEOUT:?}");
    }
    Ok(())
}
