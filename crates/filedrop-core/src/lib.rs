//! # filedrop-core
//!
//! Shared library for filedrop containing the wire framing rules and the
//! filename policy used by both the upload server and the sender client.
//!
//! This crate has zero dependencies on sockets, timers, or the file system.
//!
//! # Architecture overview
//!
//! filedrop moves exactly one file per TCP connection.  There is no length
//! prefix and no end marker on the wire:
//!
//! ```text
//! <filename>\n<raw file bytes ...>   then the sender closes or goes quiet
//! ```
//!
//! The receiver decides the file is complete when the peer closes the
//! connection or stops sending for a short while.  Everything that is pure
//! logic about that byte layout lives here:
//!
//! - **`protocol`** – Locating the filename/content boundary in a received
//!   buffer ([`split`], [`Frame`]) and building the header a sender writes
//!   ([`encode_header`]).
//!
//! - **`domain`** – The rules a filename must satisfy before it may be used as
//!   a path component on the receiving machine ([`SafeFilename`]).

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `filedrop_core::Frame` instead of `filedrop_core::protocol::frame::Frame`.
pub use domain::filename::{FilenameError, SafeFilename};
pub use protocol::constants::{DEFAULT_PORT, MAX_FILENAME_LEN, MAX_NAME_BYTES};
pub use protocol::frame::{encode_header, split, Frame, FrameError};
