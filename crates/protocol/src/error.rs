//! Error types for the protocol crate.

use thiserror::Error;

/// Longest segment accepted in a folder key, mirroring common filesystem limits.
pub const MAX_SEGMENT_LEN: usize = 255;

/// Longest username accepted at the boundary.
pub const MAX_USERNAME_LEN: usize = 128;

/// Validation failures for values that cross the controller/core boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    // Folder key errors
    /// A folder key contained an empty segment (e.g. `a//b`).
    #[error("folder key contains an empty segment: {0:?}")]
    EmptySegment(String),

    /// A segment was `.` or `..`.
    #[error("folder key segment is reserved: {0:?}")]
    ReservedSegment(String),

    /// A segment contained a control character.
    #[error("folder key segment contains a control character: {0:?}")]
    ControlCharacter(String),

    /// A segment contained a path separator.
    #[error("folder key segment contains a path separator: {0:?}")]
    PathSeparator(String),

    /// A segment exceeded [`MAX_SEGMENT_LEN`].
    #[error("folder key segment is {len} bytes, maximum is {max}")]
    SegmentTooLong {
        /// Actual segment length in bytes.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    // Username errors
    /// A username was empty, too long, or contained forbidden characters.
    #[error("invalid username: {0:?}")]
    InvalidUsername(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
