//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from defaults, an optional TOML file and CLI
//! flags, then shared read-only with every worker.
//!
//! # Operational constants
//!
//! | Field                  | Default          | Meaning                                   |
//! |------------------------|------------------|-------------------------------------------|
//! | `bind_addr`            | `0.0.0.0:4445`   | all interfaces, default port              |
//! | `backlog`              | 5                | pending connections queued by the kernel  |
//! | `inter_packet_timeout` | 3 s              | silence that ends a transfer (normal)     |
//! | `session_deadline`     | 30 s             | inactivity that kills a worker (fatal)    |
//! | `max_buffer_size`      | 64 KiB           | most bytes accepted per upload            |
//! | `max_filename_len`     | 255              | bytes scanned for the filename terminator |
//! | `storage_root`         | `/var/lib/filedrop` | directory uploads are written into     |
//! | `max_workers`          | unlimited        | concurrent connections admitted           |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use filedrop_core::{DEFAULT_PORT, MAX_FILENAME_LEN};
use thiserror::Error;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 5;
/// Default silence that marks the end of a transfer.
pub const DEFAULT_INTER_PACKET_TIMEOUT: Duration = Duration::from_secs(3);
/// Default inactivity after which a worker is torn down.
pub const DEFAULT_SESSION_DEADLINE: Duration = Duration::from_secs(30);
/// Default capacity of the per-session receive buffer.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024;
/// Default directory uploads are stored in.
pub const DEFAULT_STORAGE_ROOT: &str = "/var/lib/filedrop";

/// A configuration value that cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// All runtime configuration for the upload server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,
    /// Kernel listen backlog.
    pub backlog: u32,
    /// How long a connection may stay silent before the transfer is
    /// considered complete.  Silence is a normal end, not an error.
    pub inter_packet_timeout: Duration,
    /// How long a connection may go without any successful read before the
    /// worker is forcibly torn down.  Reset on every read.
    pub session_deadline: Duration,
    /// Capacity of the receive buffer; reading stops once it is full.
    pub max_buffer_size: usize,
    /// Bound passed to the frame splitter.
    pub max_filename_len: usize,
    /// Directory uploads are written into.
    pub storage_root: PathBuf,
    /// Optional cap on concurrently running workers.  `None` admits every
    /// connection.
    pub max_workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            backlog: DEFAULT_BACKLOG,
            inter_packet_timeout: DEFAULT_INTER_PACKET_TIMEOUT,
            session_deadline: DEFAULT_SESSION_DEADLINE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_filename_len: MAX_FILENAME_LEN,
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            max_workers: None,
        }
    }
}

impl ServerConfig {
    /// Checks that every value is usable.
    ///
    /// The port is not checked here: binding port 0 is how tests ask the OS
    /// for a free port.  The CLI and the TOML loader reject port 0 themselves.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog == 0 {
            return Err(ConfigError::invalid("backlog", "must be at least 1"));
        }
        if self.inter_packet_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "inter_packet_timeout",
                "must be greater than zero",
            ));
        }
        if self.session_deadline.is_zero() {
            return Err(ConfigError::invalid(
                "session_deadline",
                "must be greater than zero",
            ));
        }
        if self.max_buffer_size == 0 {
            return Err(ConfigError::invalid("max_buffer_size", "must be at least 1"));
        }
        if self.max_filename_len == 0 || self.max_filename_len > MAX_FILENAME_LEN {
            return Err(ConfigError::invalid(
                "max_filename_len",
                format!("must be between 1 and {MAX_FILENAME_LEN}"),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(ConfigError::invalid("max_workers", "must be at least 1"));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
