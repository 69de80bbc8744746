//! Error types for store operations.

use std::fmt;

/// Errors surfaced by the storage engine.
///
/// All of these are fatal to the operation that produced them, never to the
/// process; the one intentionally process-fatal path (the `exit` corruption
/// policy) terminates before an error value is ever constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The database file could not be opened or bootstrapped.
    Open(String),

    /// The database file failed its integrity check. Surfaced only when the
    /// configured corruption policy could not recover a usable store.
    Corrupt(String),

    /// A statement failed to prepare or execute.
    Query(String),

    /// A transaction control statement failed.
    Transaction(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(msg) => write!(f, "store open failed: {}", msg),
            Self::Corrupt(msg) => write!(f, "store corrupt: {}", msg),
            Self::Query(msg) => write!(f, "query failed: {}", msg),
            Self::Transaction(msg) => write!(f, "transaction failed: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", StoreError::Open("no such directory".into())),
            "store open failed: no such directory"
        );
        assert_eq!(
            format!("{}", StoreError::Corrupt("quick_check: row 3".into())),
            "store corrupt: quick_check: row 3"
        );
        assert_eq!(
            format!("{}", StoreError::Query("no such table".into())),
            "query failed: no such table"
        );
        assert_eq!(
            format!("{}", StoreError::Transaction("cannot commit".into())),
            "transaction failed: cannot commit"
        );
    }

    #[test]
    fn test_error_is_error_trait() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<StoreError>();
    }
}
