//! Application layer for filedrop-server.
//!
//! Knows *what* happens to a fully received buffer (split, validate, store)
//! but delegates *how* bytes reach the disk to an [`UploadSink`].
//!
//! # What does NOT belong here?
//!
//! - Reading from sockets or deciding when a transfer ended (infrastructure)
//! - Task spawning and timers (infrastructure)

pub mod ingest;

pub use ingest::{ingest_upload, IngestError, StoreError, StoredUpload, UploadSink};
