//! Infrastructure layer for filedrop-server.
//!
//! Everything that touches the outside world lives here: the listening
//! socket, per-connection tasks, timers, the storage directory and the
//! configuration file.

pub mod config_file;
pub mod controller;
pub mod session;
pub mod storage;
pub mod supervisor;

pub use config_file::{load_config_file, ConfigFileError, FileConfig};
pub use controller::{Controller, WorkerExit, WorkerRecord, WorkerReport};
pub use session::{run_session, SessionError, SessionLimits, SessionOutcome};
pub use storage::FsUploadSink;
pub use supervisor::{bind_listener, handle_connection, run_server, serve_forever};
