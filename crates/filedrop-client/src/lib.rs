//! filedrop-client library crate.
//!
//! Sends one file to a filedrop server: the file name on its own line, then
//! the raw content, then a half-close.
//!
//! ```no_run
//! use std::path::Path;
//! use filedrop_client::{send_file, SendOptions};
//!
//! # async fn example() -> Result<(), filedrop_client::SendError> {
//! let report = send_file(Path::new("notes.txt"), "127.0.0.1:4445", &SendOptions::default()).await?;
//! println!("sent {} bytes", report.bytes_sent);
//! # Ok(())
//! # }
//! ```

/// Application layer: the send use case and its progress events.
pub mod application;

/// Infrastructure layer: TCP connect and write helpers with timeouts.
pub mod infrastructure;

pub use application::send_file::{
    send_file, FileSender, SendError, SendEvent, SendOptions, SendReport,
};
