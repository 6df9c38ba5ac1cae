//! Error types for caskdb.

use std::io;
use thiserror::Error;

/// Result type alias for caskdb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for database operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Key is not present in the index.
    #[error("Key not found")]
    KeyNotFound,

    /// Key is too large.
    #[error("Key too large: {size} bytes (max: {max})")]
    KeyTooLarge { size: usize, max: usize },

    /// Value is too large.
    #[error("Value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// CRC checksum mismatch on a value read back from disk.
    #[error("Checksum failed: expected {expected:#x}, got {actual:#x}")]
    ChecksumFailed { expected: u32, actual: u32 },

    /// Database is locked by another process.
    #[error("Database is locked by another process")]
    DatabaseLocked,

    /// A write was attempted on a sealed datafile.
    #[error("Datafile is read-only")]
    ReadonlyDatafile,

    /// A random-access read returned fewer bytes than requested or fell
    /// outside the datafile.
    #[error("Read error")]
    ReadError,

    /// The persisted index file contains out-of-bounds sizes or truncates
    /// mid-binding.
    #[error("Index corruption: {0}")]
    IndexCorruption(String),

    /// The decoder ran out of bytes in the middle of a record.
    #[error("Unexpected end of file")]
    UnexpectedEof,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A stored value could not be decoded as the requested type.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create an index corruption error with the given message.
    pub fn index_corruption<S: Into<String>>(msg: S) -> Self {
        Error::IndexCorruption(msg.into())
    }

    /// Check if this error indicates corruption of persisted data.
    ///
    /// Recovery uses this to decide whether the index can be rebuilt from
    /// the segments instead of failing the open.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::IndexCorruption(_) | Error::ChecksumFailed { .. } | Error::UnexpectedEof
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::KeyTooLarge { size: 100, max: 64 };
        assert_eq!(format!("{}", err), "Key too large: 100 bytes (max: 64)");

        let err = Error::index_corruption("key size 99 exceeds maximum 64");
        assert_eq!(
            format!("{}", err),
            "Index corruption: key size 99 exceeds maximum 64"
        );
    }

    #[test]
    fn test_error_is_corruption() {
        assert!(Error::index_corruption("bad").is_corruption());
        assert!(Error::ChecksumFailed {
            expected: 1,
            actual: 2
        }
        .is_corruption());
        assert!(Error::UnexpectedEof.is_corruption());
        assert!(!Error::KeyNotFound.is_corruption());
        assert!(!Error::DatabaseLocked.is_corruption());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
