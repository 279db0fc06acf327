//! Domain layer: filename rules shared by the sender and the receiver.
//!
//! Nothing in here touches the file system; the types only describe which
//! names are acceptable.

pub mod filename;

pub use filename::{FilenameError, SafeFilename};
