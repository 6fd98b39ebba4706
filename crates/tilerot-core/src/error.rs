//! Error types for the rotation shim
//!
//! None of these reach the intercepted application. A failing driver call
//! made on the application's behalf is returned as-is; these errors describe
//! the engine's own side work (rotation, tracking, signal setup) and are
//! logged by whoever receives them.

use core::fmt;

/// Result type for engine operations
pub type Result<T> = core::result::Result<T, TilerError>;

/// Errors raised by the engine's own work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TilerError {
    /// A driver call issued by the engine failed
    Driver { request: u64, errno: i32 },

    /// The object exposes no property with the wanted name
    PropertyNotFound { object: u32 },

    /// The driver reported more entries than the bounded buffer holds
    ListOverflow { reported: u32, capacity: usize },

    /// Tracking table is full; the resource is not tracked
    TableFull { capacity: usize },

    /// Argument block could not be decoded for its request code
    Decode(DecodeError),

    /// Installing a signal handler failed
    Signal { signum: i32, errno: i32 },
}

impl fmt::Display for TilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TilerError::Driver { request, errno } => {
                write!(f, "driver request {:#x} failed: errno {}", request, errno)
            }
            TilerError::PropertyNotFound { object } => {
                write!(f, "object {} has no rotation property", object)
            }
            TilerError::ListOverflow { reported, capacity } => {
                write!(f, "driver reported {} entries, buffer holds {}", reported, capacity)
            }
            TilerError::TableFull { capacity } => {
                write!(f, "tracking table full ({} slots)", capacity)
            }
            TilerError::Decode(e) => write!(f, "decode error: {}", e),
            TilerError::Signal { signum, errno } => {
                write!(f, "installing handler for signal {} failed: errno {}", signum, errno)
            }
        }
    }
}

impl std::error::Error for TilerError {}

/// Argument-block decode failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Argument pointer is null
    Null,

    /// Argument pointer is not aligned for the decoded type
    Misaligned,

    /// Size encoded in the request code differs from the decoded type
    SizeMismatch { expected: usize, found: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Null => write!(f, "null argument"),
            DecodeError::Misaligned => write!(f, "misaligned argument"),
            DecodeError::SizeMismatch { expected, found } => {
                write!(f, "argument size {} (expected {})", found, expected)
            }
        }
    }
}

impl From<DecodeError> for TilerError {
    fn from(e: DecodeError) -> Self {
        TilerError::Decode(e)
    }
}
