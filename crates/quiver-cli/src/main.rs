#![warn(missing_docs)]

//! Quiver fluent-query gateway.
//!
//! Screen it, lint it, then let it touch your records.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use quiver_client::{HttpInterpreter, InstanceConfig, TimeoutInterpreter};
use quiver_config::QuiverConfig;
use quiver_pipeline::audit::TracingAuditLogger;
use quiver_pipeline::{Catalog, CatalogOverrides, ExecutionPipeline, RemoteInterpreter};
use quiver_server::QuiverServer;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

/// Default remote call timeout when the config does not set one.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Build a [`Catalog`] from config overrides.
fn build_catalog(config: &QuiverConfig) -> Result<Catalog> {
    let overrides = CatalogOverrides {
        blacklist: config.screening.blacklist.clone(),
        extra_blacklist: config.screening.extra_blacklist.clone(),
        max_script_length: config.limits.max_script_length,
    };
    Catalog::with_overrides(overrides).context("invalid screening configuration")
}

/// Locate the configuration file.
///
/// Search order:
/// 1. `QUIVER_CONFIG` environment variable
/// 2. `./quiver.toml` in the current directory
fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("QUIVER_CONFIG") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    let cwd = PathBuf::from("quiver.toml");
    if cwd.exists() {
        return Some(cwd);
    }

    None
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --version / -V before anything else
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("quiver {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = find_config_file()
        .context("no config file found: set QUIVER_CONFIG or create ./quiver.toml")?;
    tracing::info!(path = %path.display(), "loading config");
    let config = QuiverConfig::from_file_with_env(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    let catalog = build_catalog(&config)?;
    let timeout = Duration::from_secs(config.limits.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

    let interpreter = HttpInterpreter::new(InstanceConfig {
        url: config.instance.url.clone(),
        token: config.instance.token.clone(),
        default_timeout: timeout,
    })
    .context("failed to build the instance client")?;
    let interpreter: Arc<dyn RemoteInterpreter> =
        Arc::new(TimeoutInterpreter::new(Arc::new(interpreter), timeout));

    let pipeline = ExecutionPipeline::new(catalog, interpreter)
        .with_audit_logger(Arc::new(TracingAuditLogger));

    tracing::info!(
        instance = %config.instance.url,
        timeout_secs = timeout.as_secs(),
        "Quiver gateway starting"
    );

    let mut server = QuiverServer::new(Arc::new(pipeline));
    if let Some(max_results) = config.limits.test_mode_max_results {
        server = server.with_default_max_results(max_results);
    }

    // Serve over stdio (standard MCP transport)
    let service = server.serve(rmcp::transport::io::stdio()).await?;

    tokio::select! {
        result = service.waiting() => {
            result?;
            tracing::info!("client disconnected, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
        }
    }

    Ok(())
}
