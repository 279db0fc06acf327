//! Send use case: one local file → one upload connection.
//!
//! ```text
//! check file ─► derive wire name ─► connect ─► "<name>\n" ─► chunks ─► half-close ─► wait for close
//!                                                               │
//!                                                               └─► SendEvent::Progress after each chunk
//! ```
//!
//! The server sends nothing back, so a successful send only means the bytes
//! left this host.  Waiting for the server to close its side narrows the gap:
//! it closes once the upload has been written.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use filedrop_core::{encode_header, FilenameError, SafeFilename};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::infrastructure::{await_close, connect_with_timeout, write_with_timeout};

/// Default time allowed for the TCP handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default time allowed for each individual write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default size of each file read and socket write.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
/// Default wait for the server to close after the half-close.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(3);

/// Tuning knobs for a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOptions {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub chunk_size: usize,
    pub linger: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            linger: DEFAULT_LINGER,
        }
    }
}

/// Summary of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub filename: String,
    pub bytes_sent: u64,
    pub total_bytes: u64,
    /// Whether the server closed the connection within the linger period.
    pub server_closed: bool,
}

/// Progress notifications published while sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendEvent {
    /// Content bytes written so far, out of the file size.
    Progress { sent: u64, total: u64 },
    /// Always the last event of a send.
    Finished { success: bool, message: String },
}

/// Why a send failed.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot send {} under its name: {reason}", path.display())]
    InvalidFilename {
        path: PathBuf,
        #[source]
        reason: FilenameError,
    },

    #[error("connection to {addr} timed out after {limit:?}")]
    ConnectTimedOut { addr: String, limit: Duration },

    #[error("cannot connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("write timed out after {sent} bytes")]
    WriteTimedOut { sent: u64 },

    #[error("write failed after {sent} bytes: {source}")]
    WriteFailed {
        sent: u64,
        #[source]
        source: io::Error,
    },
}

impl SendError {
    fn from_write(sent: u64, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::TimedOut {
            Self::WriteTimedOut { sent }
        } else {
            Self::WriteFailed { sent, source }
        }
    }
}

/// Sends files with fixed options, optionally publishing [`SendEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct FileSender {
    options: SendOptions,
    events: Option<mpsc::UnboundedSender<SendEvent>>,
}

impl FileSender {
    pub fn new(options: SendOptions) -> Self {
        Self {
            options,
            events: None,
        }
    }

    /// Attaches a channel that receives progress and completion events.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SendEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    /// Sends the file at `path` to `server` (`host:port`).
    ///
    /// # Errors
    ///
    /// See [`SendError`].  Nothing is retried.
    pub async fn send(&self, path: &Path, server: &str) -> Result<SendReport, SendError> {
        let result = self.send_inner(path, server).await;
        let finished = match &result {
            Ok(report) => SendEvent::Finished {
                success: true,
                message: format!(
                    "sent '{}' ({} bytes) to {server}",
                    report.filename, report.bytes_sent
                ),
            },
            Err(e) => SendEvent::Finished {
                success: false,
                message: e.to_string(),
            },
        };
        self.publish(finished);
        result
    }

    async fn send_inner(&self, path: &Path, server: &str) -> Result<SendReport, SendError> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SendError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(SendError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if !meta.is_file() {
            return Err(SendError::NotAFile(path.to_path_buf()));
        }
        let total = meta.len();

        let name = SafeFilename::from_path(path).map_err(|reason| SendError::InvalidFilename {
            path: path.to_path_buf(),
            reason,
        })?;

        let mut file = File::open(path)
            .await
            .map_err(|source| SendError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

        let mut stream = connect_with_timeout(server, self.options.connect_timeout)
            .await
            .map_err(|source| {
                if source.kind() == io::ErrorKind::TimedOut {
                    SendError::ConnectTimedOut {
                        addr: server.to_string(),
                        limit: self.options.connect_timeout,
                    }
                } else {
                    SendError::ConnectFailed {
                        addr: server.to_string(),
                        source,
                    }
                }
            })?;
        info!("connected to {server}, sending '{name}' ({total} bytes)");

        write_with_timeout(&mut stream, &encode_header(name.as_str()), self.options.write_timeout)
            .await
            .map_err(|e| SendError::from_write(0, e))?;

        let mut chunk = vec![0u8; self.options.chunk_size.max(1)];
        let mut sent = 0u64;
        loop {
            let n = file
                .read(&mut chunk)
                .await
                .map_err(|source| SendError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            write_with_timeout(&mut stream, &chunk[..n], self.options.write_timeout)
                .await
                .map_err(|e| SendError::from_write(sent, e))?;
            sent += n as u64;
            debug!("sent {sent}/{total} bytes");
            self.publish(SendEvent::Progress { sent, total });
        }

        if sent != total {
            warn!("'{name}' changed while sending: expected {total} bytes, sent {sent}");
        }

        if let Err(e) = stream.shutdown().await {
            debug!("half-close failed: {e}");
        }
        let server_closed = await_close(&mut stream, self.options.linger).await;
        if !server_closed {
            debug!("server did not close within {:?}", self.options.linger);
        }

        Ok(SendReport {
            filename: name.into_string(),
            bytes_sent: sent,
            total_bytes: total,
            server_closed,
        })
    }

    fn publish(&self, event: SendEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = events.send(event);
        }
    }
}

/// Sends `path` to `server` with `options` and no progress channel.
///
/// # Errors
///
/// See [`SendError`].
pub async fn send_file(
    path: &Path,
    server: &str,
    options: &SendOptions,
) -> Result<SendReport, SendError> {
    FileSender::new(options.clone()).send(path, server).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
