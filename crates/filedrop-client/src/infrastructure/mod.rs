//! Infrastructure layer for filedrop-client.

pub mod connection;

pub use connection::{await_close, connect_with_timeout, write_with_timeout};
