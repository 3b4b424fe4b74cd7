//! Error types for the replay engine.
//!
//! This module defines the error hierarchy shared by every component:
//! the replay codec, the opcode resolver, the library manager and the
//! engine context. Codec failures (short reads and failed size checks) are
//! grouped under [`ReplayError::is_malformed`].

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for replay engine operations.
///
/// # Example
///
/// ```
/// use duty_replay::error::{ReplayError, Result};
///
/// fn example_operation() -> Result<()> {
///     Err(ReplayError::MalformedReplay {
///         reason: "chapter count out of range".to_string(),
///     })
/// }
///
/// assert!(example_operation().unwrap_err().is_malformed());
/// ```
#[derive(Error, Debug)]
pub enum ReplayError {
    /// An I/O error occurred while reading or moving a replay file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The header magic does not identify a replay file.
    #[error("Invalid magic bytes: expected {expected}, found {found}")]
    InvalidMagic {
        /// The expected magic bytes (as hex string for display).
        expected: String,
        /// The bytes found at the start of the file (as hex string).
        found: String,
    },

    /// The replay header or chapter array failed a size check.
    #[error("Malformed replay: {reason}")]
    MalformedReplay {
        /// A description of the failed check.
        reason: String,
    },

    /// The data ended before the required bytes could be read.
    #[error("Unexpected end of data: expected {expected} bytes, but only {available} available")]
    UnexpectedEof {
        /// The number of bytes that were expected to be available.
        expected: usize,
        /// The actual number of bytes available.
        available: usize,
    },

    /// An opcode table document could not be loaded.
    #[error("Invalid opcode table {}: {reason}", path.display())]
    OpcodeTable {
        /// The document that failed to load.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// No opcode table is registered for a protocol version.
    #[error("No opcode table for protocol version {0}")]
    UnknownVersion(u16),

    /// Archiving replays failed and the archive was restored from backup.
    #[error("Archive failed: {reason}")]
    Archive {
        /// A description of the failure.
        reason: String,
    },

    /// The archive container could not be read or written.
    #[error("Archive container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A JSON document could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file could not be decoded.
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// The configuration could not be encoded for saving.
    #[error("Configuration encoding error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),
}

impl ReplayError {
    /// Creates an `InvalidMagic` error with the given byte slices.
    ///
    /// The bytes are converted to hex strings for human-readable display.
    ///
    /// # Example
    ///
    /// ```
    /// use duty_replay::error::ReplayError;
    ///
    /// let err = ReplayError::invalid_magic(b"FFXIVREPLAY", b"\x00\x00\x00\x00");
    /// assert!(err.to_string().contains("Invalid magic bytes"));
    /// ```
    #[must_use]
    pub fn invalid_magic(expected: &[u8], found: &[u8]) -> Self {
        ReplayError::InvalidMagic {
            expected: bytes_to_hex(expected),
            found: bytes_to_hex(found),
        }
    }

    /// Creates an `UnexpectedEof` error with the given sizes.
    #[must_use]
    pub fn unexpected_eof(expected: usize, available: usize) -> Self {
        ReplayError::UnexpectedEof { expected, available }
    }

    /// Creates a `MalformedReplay` error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        ReplayError::MalformedReplay {
            reason: reason.into(),
        }
    }

    /// Returns whether this error means the replay bytes themselves are bad
    /// (truncated, wrong magic, or failed a size check).
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ReplayError::MalformedReplay { .. }
                | ReplayError::UnexpectedEof { .. }
                | ReplayError::InvalidMagic { .. }
        )
    }
}

/// Converts a byte slice to a hexadecimal string representation.
///
/// If the slice is 8 bytes or less, formats as space-separated hex values.
/// If longer, shows the first 8 bytes followed by "...".
fn bytes_to_hex(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(8)];
    let prefix = shown
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");

    if bytes.len() <= 8 {
        prefix
    } else {
        format!("{prefix}... ({} bytes total)", bytes.len())
    }
}

/// A specialized Result type for replay engine operations.
pub type Result<T> = std::result::Result<T, ReplayError>;
