use thiserror::Error;

/// Result type alias for disk image operations
pub type Result<T> = std::result::Result<T, DiskError>;

/// Errors that can occur when working with Apple II disk images
#[derive(Debug, Error)]
pub enum DiskError {
    /// I/O error occurred while reading or writing the image file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// None of the probed layouts or filesystems validated
    #[error("Unrecognized format: {0}")]
    FormatNotRecognized(String),

    /// Invalid container or image structure outside the filesystem
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A computed byte range falls outside the image buffer
    #[error("Out of range: {unit} {index} needs bytes {start}..{end}, image has {len}")]
    OutOfRange {
        /// Addressing unit ("block" or "sector")
        unit: &'static str,
        /// Logical unit index
        index: usize,
        /// Start of the computed byte range
        start: usize,
        /// End of the computed byte range
        end: usize,
        /// Length of the image buffer
        len: usize,
    },

    /// The allocator cannot satisfy a request
    #[error("Not enough free {unit}: need {needed}, have {available}")]
    InsufficientSpace {
        /// Allocation unit ("blocks" or "sectors")
        unit: &'static str,
        /// Units requested
        needed: usize,
        /// Units currently free
        available: usize,
    },

    /// Named file or directory does not exist
    #[error("Not found: {0}")]
    EntryNotFound(String),

    /// Name already taken and no free suffix was left
    #[error("Name collision: {0}")]
    NameCollision(String),

    /// Cyclic or out-of-range chain pointers, or invalid structure constants
    #[error("Structural corruption: {0}")]
    StructuralCorruption(String),

    /// Invalid filename
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// File or directory is locked against the requested change
    #[error("File locked: {0}")]
    FileLocked(String),

    /// Directory still has entries
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Payload exceeds what the filesystem can describe
    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge {
        /// Requested size in bytes
        size: usize,
        /// Maximum size in bytes
        max: usize,
    },

    /// Operation not available on this filesystem
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl DiskError {
    /// Create a structural corruption error
    pub fn corrupt<S: Into<String>>(message: S) -> Self {
        DiskError::StructuralCorruption(message.into())
    }

    /// Create an invalid format error
    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        DiskError::InvalidFormat(message.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        DiskError::EntryNotFound(name.into())
    }

    /// Create an unsupported-operation error
    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        DiskError::Unsupported(message.into())
    }

    /// Whether format probing may move on to the next hypothesis after this error
    pub fn is_recoverable_probe_failure(&self) -> bool {
        matches!(
            self,
            DiskError::FormatNotRecognized(_)
                | DiskError::StructuralCorruption(_)
                | DiskError::OutOfRange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_space_display() {
        let err = DiskError::InsufficientSpace {
            unit: "blocks",
            needed: 2,
            available: 1,
        };
        assert_eq!(err.to_string(), "Not enough free blocks: need 2, have 1");
    }

    #[test]
    fn test_out_of_range_display() {
        let err = DiskError::OutOfRange {
            unit: "block",
            index: 300,
            start: 153600,
            end: 154112,
            len: 143360,
        };
        assert_eq!(
            err.to_string(),
            "Out of range: block 300 needs bytes 153600..154112, image has 143360"
        );
    }

    #[test]
    fn test_probe_recoverability() {
        assert!(DiskError::corrupt("loop").is_recoverable_probe_failure());
        assert!(!DiskError::not_found("X").is_recoverable_probe_failure());
    }
}
