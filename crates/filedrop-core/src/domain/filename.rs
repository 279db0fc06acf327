//! Filename validation.
//!
//! The filename arrives from an untrusted peer and is joined onto the
//! server's storage root, so it must be a single plain path component.
//! [`SafeFilename`] can only be constructed through [`SafeFilename::parse`],
//! which makes "this name was checked" part of the type.

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::protocol::constants::MAX_NAME_BYTES;
use crate::protocol::frame::is_line_terminator;

/// Reasons a filename is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilenameError {
    #[error("filename is empty")]
    Empty,

    #[error("filename is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("filename is not valid UTF-8")]
    NotUtf8,

    #[error("filename contains a parent directory reference")]
    ParentReference,

    #[error("filename is an absolute path")]
    Absolute,

    #[error("filename contains a path separator")]
    Separator,

    #[error("filename contains a NUL byte")]
    Nul,

    #[error("filename contains a line terminator")]
    LineTerminator,
}

/// A filename that is safe to use as one path component under a storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafeFilename(String);

impl SafeFilename {
    /// Validates raw filename bytes as received on the wire.
    ///
    /// # Errors
    ///
    /// Returns the first [`FilenameError`] rule the name breaks.  Rules are
    /// checked in this order: empty, length, `..`, leading `/`, separators,
    /// NUL, line terminators, UTF-8.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use filedrop_core::{FilenameError, SafeFilename};
    ///
    /// assert_eq!(SafeFilename::parse(b"report.txt").unwrap().as_str(), "report.txt");
    /// assert_eq!(
    ///     SafeFilename::parse(b"../../etc/passwd"),
    ///     Err(FilenameError::ParentReference)
    /// );
    /// ```
    pub fn parse(raw: &[u8]) -> Result<Self, FilenameError> {
        if raw.is_empty() {
            return Err(FilenameError::Empty);
        }
        if raw.len() > MAX_NAME_BYTES {
            return Err(FilenameError::TooLong {
                len: raw.len(),
                max: MAX_NAME_BYTES,
            });
        }
        if raw.windows(2).any(|w| w == b"..") {
            return Err(FilenameError::ParentReference);
        }
        if raw[0] == b'/' {
            return Err(FilenameError::Absolute);
        }
        if raw.iter().any(|&b| b == b'/' || b == b'\\') {
            return Err(FilenameError::Separator);
        }
        if raw.contains(&0) {
            return Err(FilenameError::Nul);
        }
        if raw.iter().any(|&b| is_line_terminator(b)) {
            return Err(FilenameError::LineTerminator);
        }

        let name = std::str::from_utf8(raw).map_err(|_| FilenameError::NotUtf8)?;
        Ok(Self(name.to_owned()))
    }

    /// Derives the wire filename from the last component of a local path.
    ///
    /// # Errors
    ///
    /// Returns [`FilenameError::Empty`] when the path has no final component
    /// (e.g. `/` or `..`), [`FilenameError::NotUtf8`] when that component is
    /// not UTF-8, or any rule [`SafeFilename::parse`] enforces.
    pub fn from_path(path: &Path) -> Result<Self, FilenameError> {
        let name = path.file_name().ok_or(FilenameError::Empty)?;
        let name = name.to_str().ok_or(FilenameError::NotUtf8)?;
        Self::parse(name.as_bytes())
    }

    /// Returns the validated name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned name.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SafeFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for SafeFilename {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
