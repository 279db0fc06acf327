//! Ingest use case: received bytes → validated filename → stored file.
//!
//! Runs once per session, after the receive loop has decided the transfer is
//! over.  Every failure here is local to the upload: it is logged and the
//! upload is dropped.  The sender is never told, because the wire format has
//! no channel back to it.

use std::path::PathBuf;

use async_trait::async_trait;
use filedrop_core::{FilenameError, Frame, FrameError, SafeFilename};
use thiserror::Error;
use tracing::{info, warn};

/// Failure to persist an upload.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot create file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {path} failed after {written} bytes: {source}")]
    Write {
        path: PathBuf,
        written: u64,
        #[source]
        source: std::io::Error,
    },
}

/// Why an upload was dropped.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The buffer could not be split into filename and content.
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    /// The filename failed validation.
    #[error("unsafe filename rejected: {reason} ({name:?})")]
    UnsafeFilename {
        /// Lossy rendering of the raw bytes, for logs only.
        name: String,
        #[source]
        reason: FilenameError,
    },

    /// The sink could not write the file.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a successful store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Full path of the written file.
    pub path: PathBuf,
    /// Bytes handed to the file.
    pub bytes_written: u64,
    /// File size read back after closing, when it could be read.
    pub size_on_disk: Option<u64>,
}

/// Destination for validated uploads.
///
/// The file-system implementation lives in
/// `infrastructure::storage::FsUploadSink`; tests use an in-memory recorder.
#[async_trait]
pub trait UploadSink: Send + Sync {
    /// Writes `content` under `name`, replacing any existing upload of the
    /// same name.
    async fn store(&self, name: &SafeFilename, content: &[u8]) -> Result<StoredUpload, StoreError>;
}

/// Splits `buffer`, validates the filename and hands the content to `sink`.
///
/// # Errors
///
/// - [`IngestError::Frame`] for an empty buffer or an overlong unterminated
///   filename.
/// - [`IngestError::UnsafeFilename`] for names that are empty, too long, or
///   could escape the storage root.
/// - [`IngestError::Store`] when the sink fails.
pub async fn ingest_upload(
    buffer: &[u8],
    max_filename_len: usize,
    sink: &dyn UploadSink,
) -> Result<StoredUpload, IngestError> {
    let frame = Frame::parse(buffer, max_filename_len)?;

    if !frame.terminated {
        warn!(
            "no line terminator in {} bytes; whole buffer taken as filename",
            buffer.len()
        );
    }

    let name = SafeFilename::parse(frame.filename).map_err(|reason| {
        let name = String::from_utf8_lossy(frame.filename).into_owned();
        warn!("unsafe filename rejected: {name:?} ({reason})");
        IngestError::UnsafeFilename { name, reason }
    })?;

    info!(
        "filename '{name}': {} bytes total, content offset {}, content {} bytes",
        buffer.len(),
        buffer.len() - frame.content.len(),
        frame.content.len()
    );

    if frame.content.is_empty() {
        warn!("empty file: '{name}' has no content");
    }

    let stored = sink.store(&name, frame.content).await?;
    info!("saved '{name}' ({} bytes)", stored.bytes_written);
    Ok(stored)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
