//! TOML configuration file for the upload server.
//!
//! The file is optional.  Every key has a default, so a partial file only
//! overrides what it names:
//!
//! ```toml
//! [network]
//! port = 4445
//! bind_address = "0.0.0.0"
//! backlog = 5
//!
//! [session]
//! inter_packet_timeout_ms = 3000
//! session_deadline_secs = 30
//! max_buffer_size = 65536
//! max_filename_len = 255
//! # max_workers = 64
//!
//! [storage]
//! root = "/var/lib/filedrop"
//! ```
//!
//! CLI flags are applied on top of the result by `main`.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use filedrop_core::{DEFAULT_PORT, MAX_FILENAME_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    ConfigError, ServerConfig, DEFAULT_BACKLOG, DEFAULT_INTER_PACKET_TIMEOUT,
    DEFAULT_MAX_BUFFER_SIZE, DEFAULT_SESSION_DEADLINE, DEFAULT_STORAGE_ROOT,
};

/// Error type for loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind_address {0:?}")]
    InvalidBindAddress(String),

    /// Port 0 is not allowed in a config file.
    #[error("port must be between 1 and 65535")]
    InvalidPort,

    /// The resulting configuration failed validation.
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub storage: StorageSection,
}

/// `[network]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

/// `[session]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_inter_packet_timeout_ms")]
    pub inter_packet_timeout_ms: u64,
    #[serde(default = "default_session_deadline_secs")]
    pub session_deadline_secs: u64,
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    #[serde(default = "default_max_filename_len")]
    pub max_filename_len: usize,
    /// Absent means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
}

/// `[storage]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}
fn default_inter_packet_timeout_ms() -> u64 {
    DEFAULT_INTER_PACKET_TIMEOUT.as_millis() as u64
}
fn default_session_deadline_secs() -> u64 {
    DEFAULT_SESSION_DEADLINE.as_secs()
}
fn default_max_buffer_size() -> usize {
    DEFAULT_MAX_BUFFER_SIZE
}
fn default_max_filename_len() -> usize {
    MAX_FILENAME_LEN
}
fn default_storage_root() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_ROOT)
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            backlog: default_backlog(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            inter_packet_timeout_ms: default_inter_packet_timeout_ms(),
            session_deadline_secs: default_session_deadline_secs(),
            max_buffer_size: default_max_buffer_size(),
            max_filename_len: default_max_filename_len(),
            max_workers: None,
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl FileConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Parse`] if the TOML is malformed.
    pub fn from_toml(text: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Converts the file layout into a validated [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// - [`ConfigFileError::InvalidPort`] for port 0.
    /// - [`ConfigFileError::InvalidBindAddress`] if `bind_address` is not an IP.
    /// - [`ConfigFileError::Invalid`] if any other value fails validation.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigFileError> {
        if self.network.port == 0 {
            return Err(ConfigFileError::InvalidPort);
        }
        let ip: IpAddr = self
            .network
            .bind_address
            .parse()
            .map_err(|_| ConfigFileError::InvalidBindAddress(self.network.bind_address.clone()))?;

        let config = ServerConfig {
            bind_addr: SocketAddr::new(ip, self.network.port),
            backlog: self.network.backlog,
            inter_packet_timeout: Duration::from_millis(self.session.inter_packet_timeout_ms),
            session_deadline: Duration::from_secs(self.session.session_deadline_secs),
            max_buffer_size: self.session.max_buffer_size,
            max_filename_len: self.session.max_filename_len,
            storage_root: self.storage.root,
            max_workers: self.session.max_workers,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Reads and parses the configuration file at `path`.
///
/// Unlike the defaults-on-missing behaviour of an implicit config location,
/// a path given explicitly must exist.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] if the file cannot be read and
/// [`ConfigFileError::Parse`] if it is not valid TOML.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::from_toml(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_default_server_config() {
        // Arrange / Act
        let cfg = FileConfig::from_toml("").unwrap().into_server_config().unwrap();

        // Assert
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_only_named_keys() {
        let text = r#"
            [network]
            port = 9000

            [session]
            inter_packet_timeout_ms = 500
        "#;

        let cfg = FileConfig::from_toml(text).unwrap().into_server_config().unwrap();

        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.inter_packet_timeout, Duration::from_millis(500));
        assert_eq!(cfg.session_deadline, Duration::from_secs(30));
        assert_eq!(cfg.backlog, 5);
    }

    #[test]
    fn test_full_file_is_applied() {
        let text = r#"
            [network]
            port = 5000
            bind_address = "127.0.0.1"
            backlog = 16

            [session]
            inter_packet_timeout_ms = 1000
            session_deadline_secs = 10
            max_buffer_size = 1024
            max_filename_len = 64
            max_workers = 8

            [storage]
            root = "/srv/uploads"
        "#;

        let cfg = FileConfig::from_toml(text).unwrap().into_server_config().unwrap();

        assert_eq!(cfg.bind_addr, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(cfg.backlog, 16);
        assert_eq!(cfg.session_deadline, Duration::from_secs(10));
        assert_eq!(cfg.max_buffer_size, 1024);
        assert_eq!(cfg.max_filename_len, 64);
        assert_eq!(cfg.max_workers, Some(8));
        assert_eq!(cfg.storage_root, PathBuf::from("/srv/uploads"));
    }

    #[test]
    fn test_port_zero_is_rejected() {
        let result = FileConfig::from_toml("[network]\nport = 0\n")
            .unwrap()
            .into_server_config();
        assert!(matches!(result, Err(ConfigFileError::InvalidPort)));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let result = FileConfig::from_toml("[network]\nbind_address = \"not-an-ip\"\n")
            .unwrap()
            .into_server_config();
        assert!(matches!(result, Err(ConfigFileError::InvalidBindAddress(_))));
    }

    #[test]
    fn test_invalid_value_fails_validation() {
        let result = FileConfig::from_toml("[session]\nmax_buffer_size = 0\n")
            .unwrap()
            .into_server_config();
        assert!(matches!(result, Err(ConfigFileError::Invalid(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = FileConfig::from_toml("[network\nport = ");
        assert!(matches!(result, Err(ConfigFileError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config_file(Path::new("/nonexistent/filedrop/config.toml"));
        assert!(matches!(result, Err(ConfigFileError::Io { .. })));
    }
}
