//! filedrop-server library crate.
//!
//! Receives one file per TCP connection.  The sender writes
//! `<filename>\n<content>` and then closes or simply stops; the server treats
//! a close *or* a short silence as the end of the file.
//!
//! # Architecture
//!
//! ```text
//! TCP client  (filename line + raw bytes)
//!         ↓
//! [filedrop-server]
//!   ├── domain/           ServerConfig and its validation
//!   ├── application/      Frame → filename check → UploadSink
//!   └── infrastructure/
//!         ├── supervisor/ accept loop, one task per connection, reaping
//!         ├── controller/ session deadline + shutdown broadcast
//!         ├── session/    the silence-terminated receive loop
//!         ├── storage/    UploadSink writing into the storage root
//!         └── config_file/ TOML configuration file
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` depends on `domain` and `filedrop-core`; storage is reached
//!   only through the [`application::UploadSink`] trait.
//! - `infrastructure` owns sockets, timers and the file system.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: turning a received buffer into a stored upload.
pub mod application;

/// Infrastructure layer: sockets, timers, tasks and files.
pub mod infrastructure;
