//! filedrop sender: entry point.
//!
//! # Usage
//!
//! ```text
//! filedrop-send <FILE> [OPTIONS]
//!
//! Options:
//!       --host <HOST>             Server hostname or IP [default: 127.0.0.1]
//!   -p, --port <PORT>             Server port [default: 4445]
//!       --connect-timeout <SECS>  TCP connect timeout [default: 10]
//!       --write-timeout <SECS>    Per-write timeout [default: 5]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use filedrop_client::{FileSender, SendEvent, SendOptions};
use filedrop_core::DEFAULT_PORT;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Sends one file to a filedrop server.
#[derive(Debug, Parser)]
#[command(name = "filedrop-send", version)]
struct Cli {
    /// File to send.  The server stores it under its final path component.
    file: PathBuf,

    /// Server hostname or IP address.
    #[arg(long, default_value = "127.0.0.1", env = "FILEDROP_HOST")]
    host: String,

    /// Server port.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "FILEDROP_PORT",
          value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// TCP connect timeout in seconds.
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Timeout for each write in seconds.
    #[arg(long, default_value_t = 5)]
    write_timeout: u64,
}

impl Cli {
    fn server(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal.
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn options(&self) -> SendOptions {
        SendOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            write_timeout: Duration::from_secs(self.write_timeout),
            ..SendOptions::default()
        }
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

    let cli = Cli::parse();
    let server = cli.server();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(async move {
        let mut last_percent = None;
        while let Some(event) = rx.recv().await {
            match event {
                SendEvent::Progress { sent, total } => {
                    let percent = if total == 0 { 100 } else { sent * 100 / total };
                    if last_percent != Some(percent / 10) {
                        last_percent = Some(percent / 10);
                        info!("{sent}/{total} bytes ({percent}%)");
                    }
                }
                SendEvent::Finished { success, message } => {
                    if success {
                        info!("{message}");
                    }
                }
            }
        }
    });

    let sender = FileSender::new(cli.options()).with_events(tx);
    let result = sender.send(&cli.file, &server).await;
    drop(sender);
    join_reporter(reporter).await;

    let report = result.with_context(|| format!("failed to send {}", cli.file.display()))?;
    if !report.server_closed {
        info!("server did not acknowledge the close; the upload may still be in progress");
    }
    Ok(())
}

/// Waits for the progress task; its failure never fails the send.
async fn join_reporter(reporter: JoinHandle<()>) {
    if let Err(e) = reporter.await {
        debug!("progress reporter ended abnormally: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
