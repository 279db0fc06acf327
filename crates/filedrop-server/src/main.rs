//! filedrop upload server: entry point.
//!
//! # Usage
//!
//! ```text
//! filedrop-server [OPTIONS]
//!
//! Options:
//!   -p, --port <PORT>          TCP port to listen on [default: 4445]
//!       --storage <DIR>        Directory uploads are written into
//!       --config <FILE>        TOML configuration file
//!       --max-workers <N>      Cap on concurrent connections
//! ```
//!
//! Settings are layered: built-in defaults, then the `--config` file, then
//! command-line flags (or their environment variables).
//!
//! | Variable           | Flag        |
//! |--------------------|-------------|
//! | `FILEDROP_PORT`    | `--port`    |
//! | `FILEDROP_STORAGE` | `--storage` |
//! | `FILEDROP_CONFIG`  | `--config`  |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use filedrop_server::domain::ServerConfig;
use filedrop_server::infrastructure::{load_config_file, run_server, Controller};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Receives files over TCP: one `<name>\n<bytes>` upload per connection.
#[derive(Debug, Parser)]
#[command(name = "filedrop-server", version)]
struct Cli {
    /// TCP port to listen on.
    #[arg(short, long, env = "FILEDROP_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Directory uploads are written into.
    #[arg(long, env = "FILEDROP_STORAGE")]
    storage: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, env = "FILEDROP_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of concurrent connections.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_workers: Option<u64>,
}

impl Cli {
    /// Builds the effective configuration: defaults, then the config file,
    /// then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or is invalid.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_file(path)
                .and_then(|file| file.into_server_config())
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.bind_addr = SocketAddr::new(config.bind_addr.ip(), port);
        }
        if let Some(storage) = self.storage {
            config.storage_root = storage;
        }
        if let Some(max) = self.max_workers {
            config.max_workers = Some(usize::try_from(max).context("--max-workers is too large")?);
        }

        config.validate()?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;

    info!(
        "filedrop server starting: port {}, storage {}",
        config.bind_addr.port(),
        config.storage_root.display()
    );

    let controller = Arc::new(Controller::new());

    let signal_controller = Arc::clone(&controller);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                signal_controller.on_external_shutdown();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(config, controller).await?;

    info!("filedrop server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
