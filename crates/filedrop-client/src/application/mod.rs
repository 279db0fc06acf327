//! Application layer for filedrop-client.

pub mod send_file;

pub use send_file::{send_file, FileSender, SendError, SendEvent, SendOptions, SendReport};
