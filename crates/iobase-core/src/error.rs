//! Error types for iobase

use core::fmt;

/// Result type for fallible iobase operations
pub type IobResult<T> = Result<T, IobError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IobError {
    /// A system call failed. `op` names the call ("open", "mmap", ...).
    Os { op: &'static str, errno: i32 },

    /// Temporary-file template does not end in `XXXXXX`
    BadTemplate(String),

    /// Path contains an interior NUL byte
    BadPath,
}

impl IobError {
    #[inline]
    pub fn os(op: &'static str, errno: i32) -> Self {
        IobError::Os { op, errno }
    }

    /// errno of an `Os` error, `None` otherwise
    pub fn errno(&self) -> Option<i32> {
        match self {
            IobError::Os { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

impl fmt::Display for IobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IobError::Os { op, errno } => write!(f, "{}: errno {}", op, errno),
            IobError::BadTemplate(t) => write!(f, "bad temporary file template: {:?}", t),
            IobError::BadPath => write!(f, "path contains a NUL byte"),
        }
    }
}

impl std::error::Error for IobError {}
