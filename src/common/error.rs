//! Error types for bucketdb.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in bucketdb.
///
/// `Io`, `CorruptedTree` and `CorruptedPage` abort the operation that hit
/// them. Everything else is an ordinary, recoverable outcome.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from a file seek, read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Get/Update/Delete on a key that is not in the bucket.
    #[error("key not found")]
    KeyNotFound,

    /// A fixed-width slot or page cannot hold what was asked of it.
    #[error("{what} exceeds capacity: {size} > {max}")]
    CapacityExceeded {
        /// What overflowed (key, value, bucket directory, ...).
        what: &'static str,
        /// Requested size.
        size: usize,
        /// Maximum supported size.
        max: usize,
    },

    /// A structural tree invariant does not hold.
    ///
    /// This indicates a bug or a damaged file and is never retried.
    #[error("corrupted tree at page {page_id}: {reason}")]
    CorruptedTree {
        /// Page where the violation was detected.
        page_id: u64,
        /// Human-readable description.
        reason: String,
    },

    /// A page failed to decode (checksum, type byte, header fields).
    #[error("corrupted page {page_id}: {reason}")]
    CorruptedPage {
        /// Page that failed to decode.
        page_id: u64,
        /// Human-readable description.
        reason: String,
    },

    /// Page id 0 is reserved for the meta directory.
    #[error("invalid page id: {0}")]
    InvalidPageId(u64),

    /// Keys must contain at least one byte after trailing NULs are trimmed.
    #[error("key is empty")]
    EmptyKey,

    /// Bucket names must be non-empty and NUL-free.
    #[error("invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn corrupted_tree(page_id: crate::PageId, reason: impl Into<String>) -> Self {
        Error::CorruptedTree {
            page_id: page_id.0,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupted_page(page_id: crate::PageId, reason: impl Into<String>) -> Self {
        Error::CorruptedPage {
            page_id: page_id.0,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PageId;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", Error::KeyNotFound), "key not found");

        let err = Error::CapacityExceeded {
            what: "value",
            size: 2000,
            max: 1000,
        };
        assert_eq!(format!("{}", err), "value exceeds capacity: 2000 > 1000");

        let err = Error::corrupted_tree(PageId::new(7), "internal node has no children");
        assert_eq!(
            format!("{}", err),
            "corrupted tree at page 7: internal node has no children"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error as _;

        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io_err.into();
        assert!(err.source().is_some());
        assert!(Error::KeyNotFound.source().is_none());
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }
}
