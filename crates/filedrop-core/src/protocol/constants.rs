//! Wire-level constants shared by the server and the sender.

/// TCP port the server listens on when none is configured.
pub const DEFAULT_PORT: u16 = 4445;

/// Maximum number of bytes scanned for the line terminator.
///
/// The splitter never looks further than this, so the terminator must sit
/// inside the first `MAX_FILENAME_LEN` bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// Longest filename that fits in front of its terminator within
/// [`MAX_FILENAME_LEN`].
pub const MAX_NAME_BYTES: usize = MAX_FILENAME_LEN - 1;

/// Byte a sender writes after the filename.
pub const FILENAME_TERMINATOR: u8 = b'\n';
