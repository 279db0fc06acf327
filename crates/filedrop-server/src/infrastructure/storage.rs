//! File-system [`UploadSink`]: writes uploads into the storage root.
//!
//! An existing file with the same name is truncated and replaced.  Partial
//! files left by a failed write are not removed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use filedrop_core::SafeFilename;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::application::{StoreError, StoredUpload, UploadSink};

/// Stores uploads as regular files directly under `root`.
#[derive(Debug, Clone)]
pub struct FsUploadSink {
    root: PathBuf,
}

impl FsUploadSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the storage root if it does not exist yet.
    pub async fn prepare(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root).await
    }
}

#[async_trait]
impl UploadSink for FsUploadSink {
    async fn store(&self, name: &SafeFilename, content: &[u8]) -> Result<StoredUpload, StoreError> {
        let path = self.root.join(name);

        let mut file = File::create(&path)
            .await
            .map_err(|source| StoreError::Create {
                path: path.clone(),
                source,
            })?;

        // Not `write_all`: a failed write must report how many bytes landed.
        let mut written = 0u64;
        let mut remaining = content;
        while !remaining.is_empty() {
            match file.write(remaining).await {
                Ok(0) => {
                    return Err(StoreError::Write {
                        path,
                        written,
                        source: std::io::Error::from(std::io::ErrorKind::WriteZero),
                    });
                }
                Ok(n) => {
                    written += n as u64;
                    remaining = &remaining[n..];
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(StoreError::Write {
                        path,
                        written,
                        source,
                    });
                }
            }
        }

        if let Err(source) = file.flush().await {
            return Err(StoreError::Write {
                path,
                written,
                source,
            });
        }
        drop(file);

        let size_on_disk = match fs::metadata(&path).await {
            Ok(meta) => {
                if meta.len() != written {
                    warn!(
                        "size mismatch for {}: wrote {written} bytes, file has {}",
                        path.display(),
                        meta.len()
                    );
                }
                Some(meta.len())
            }
            Err(e) => {
                debug!("cannot stat {}: {e}", path.display());
                None
            }
        };

        Ok(StoredUpload {
            path,
            bytes_written: written,
            size_on_disk,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
