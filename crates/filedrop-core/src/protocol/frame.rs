//! Frame splitter for the filename-then-content byte stream.
//!
//! Wire format:
//! ```text
//! [filename bytes][\n or \r][content bytes ...]
//! ```
//! There is no length field.  The first `\n` or `\r` inside the first
//! `bound` bytes separates the filename from the content; any later
//! terminator bytes are ordinary content.

use thiserror::Error;

use crate::protocol::constants::FILENAME_TERMINATOR;

/// Errors that can occur while splitting a received buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Nothing was received, so there is no filename to extract.
    #[error("cannot split an empty buffer")]
    EmptyBuffer,

    /// The caller asked for a zero-length filename bound.
    #[error("filename bound must be positive")]
    ZeroBound,

    /// No terminator appeared within the bound and more bytes follow it.
    ///
    /// Produced only by [`Frame::parse`]; [`split`] reports the truncated
    /// prefix instead.
    #[error("no line terminator within the first {bound} bytes of a {len}-byte buffer")]
    FilenameTooLong { bound: usize, len: usize },
}

/// Returns `true` for the two bytes that may end a filename.
#[inline]
pub fn is_line_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Locates the filename/content boundary in `buffer`.
///
/// Scans at most `bound` bytes.  Returns the bytes before the first line
/// terminator as the filename and the index just past that terminator as the
/// content offset.
///
/// When no terminator is found within the scanned bytes the whole scanned
/// prefix is the filename and the content offset equals its length, so the
/// content is absorbed into the filename.
///
/// # Errors
///
/// Returns [`FrameError::EmptyBuffer`] for an empty buffer and
/// [`FrameError::ZeroBound`] when `bound` is zero.
///
/// # Examples
///
/// ```rust
/// use filedrop_core::split;
///
/// let (name, offset) = split(b"report.txt\nhello", 255).unwrap();
/// assert_eq!(name, b"report.txt");
/// assert_eq!(offset, 11);
/// ```
pub fn split(buffer: &[u8], bound: usize) -> Result<(&[u8], usize), FrameError> {
    if bound == 0 {
        return Err(FrameError::ZeroBound);
    }
    if buffer.is_empty() {
        return Err(FrameError::EmptyBuffer);
    }

    let scan_len = buffer.len().min(bound);
    match buffer[..scan_len].iter().position(|&b| is_line_terminator(b)) {
        Some(i) => Ok((&buffer[..i], i + 1)),
        None => Ok((&buffer[..scan_len], scan_len)),
    }
}

/// Builds the header a sender writes before the file content.
///
/// The caller is responsible for validating `filename` first (see
/// [`crate::SafeFilename`]); this function only appends the terminator.
pub fn encode_header(filename: &str) -> Vec<u8> {
    let mut header = Vec::with_capacity(filename.len() + 1);
    header.extend_from_slice(filename.as_bytes());
    header.push(FILENAME_TERMINATOR);
    header
}

// ── Parsed frame ──────────────────────────────────────────────────────────────

/// A received buffer viewed as filename plus content.
///
/// Both fields borrow from the buffer that was parsed; nothing is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Raw filename bytes, not yet validated.
    pub filename: &'a [u8],
    /// Everything after the first terminator.
    pub content: &'a [u8],
    /// Whether a line terminator was found inside the bound.
    pub terminated: bool,
}

impl<'a> Frame<'a> {
    /// Parses `buffer` into a frame using [`split`].
    ///
    /// Unlike [`split`], this refuses a buffer whose first `bound` bytes hold
    /// no terminator while more bytes follow: those trailing bytes would
    /// otherwise be dropped without a trace.  A short unterminated buffer is
    /// accepted as a filename with empty content.
    ///
    /// # Errors
    ///
    /// Returns any [`split`] error, or [`FrameError::FilenameTooLong`].
    pub fn parse(buffer: &'a [u8], bound: usize) -> Result<Self, FrameError> {
        let (filename, content_offset) = split(buffer, bound)?;
        let terminated = content_offset > filename.len();

        if !terminated && buffer.len() > bound {
            return Err(FrameError::FilenameTooLong {
                bound,
                len: buffer.len(),
            });
        }

        let content = if terminated {
            &buffer[content_offset..]
        } else {
            &[]
        };

        Ok(Self {
            filename,
            content,
            terminated,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
