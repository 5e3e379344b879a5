use std::{fmt, io};

/// Crate-wide error type, covering the five failure kinds enumerated by the
/// core's contract: I/O failure, buffer pool exhaustion, a handle that could
/// not be revalidated, a detected deadlock, and an invariant violation.
#[derive(Debug)]
pub enum DbError {
    Io(io::Error),
    PoolExhausted,
    InvalidHandle,
    Deadlock,
    Invariant(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DbError::Io(e) => write!(f, "io failure: {}", e),
            DbError::PoolExhausted => {
                write!(f, "buffer pool exhausted: all frames pinned")
            }
            DbError::InvalidHandle => {
                write!(f, "buffer handle could not be revalidated")
            }
            DbError::Deadlock => {
                write!(f, "transaction aborted: deadlock detected")
            }
            DbError::Invariant(msg) => write!(f, "invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        DbError::Io(e)
    }
}
