//! Domain layer for filedrop-server.
//!
//! Pure configuration types with no dependency on sockets, timers or the file
//! system.  The infrastructure layer fills them in from a TOML file and the
//! command line.

pub mod config;

pub use config::{
    ConfigError, ServerConfig, DEFAULT_BACKLOG, DEFAULT_INTER_PACKET_TIMEOUT,
    DEFAULT_MAX_BUFFER_SIZE, DEFAULT_SESSION_DEADLINE, DEFAULT_STORAGE_ROOT,
};
