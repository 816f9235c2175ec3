use crate::column::ColumnType;

use thiserror::Error;

/// Result type used across the provider contract.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can cross the provider contract.
///
/// `UserCancel`, `DeadlineExceeded` and `NotImplemented` are sentinels: match on
/// them (or use the `is_*` helpers) instead of inspecting messages.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller cancelled the context of a blocking operation.
    #[error("user cancel")]
    UserCancel,

    /// The deadline of the context expired before the operation finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The provider does not support the requested capability.
    #[error("not implemented")]
    NotImplemented,

    /// The caller violated the operation contract.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// A single-row query produced no row.
    #[error("no rows in result set")]
    NoRows,

    /// A type tag outside the closed set.
    #[error("unknown column type: `{0}`")]
    UnknownType(String),

    /// An appender rejected some rows while flushing.
    #[error("{fail} rows rejected ({success} appended): {reason}")]
    AppendRejected {
        /// Rows accepted by the table.
        success: u64,
        /// Rows rejected by the table.
        fail: u64,
        /// First rejection reason.
        reason: String,
    },

    /// Credentials were rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Error reported by the server.
    #[error("server error: {0}")]
    Server(String),

    /// Decoder input that does not follow the format.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// IO error on a sink or source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for both cancellation kinds (`UserCancel` and `DeadlineExceeded`).
    #[must_use]
    pub const fn is_cancel(&self) -> bool {
        matches!(self, Self::UserCancel | Self::DeadlineExceeded)
    }

    /// Returns true if the provider does not implement the capability.
    #[must_use]
    pub const fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented)
    }

    /// Returns true for contract violations by the caller.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

/// Contract violations. These are detected synchronously and never partially apply.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum UsageError {
    /// `scan` or `values` before the first successful `next`.
    #[error("cursor is not positioned on a row; call next first")]
    NotPositioned,

    /// `scan` or `values` after `next` returned false.
    #[error("cursor is exhausted")]
    Exhausted,

    /// The resource was already closed.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// Wrong number of values for the bound columns.
    #[error("expected {expected} values, got {actual}")]
    ArityMismatch {
        /// Number of bound columns.
        expected: usize,
        /// Number of values, tuple fields or cells the caller supplied.
        actual: usize,
    },

    /// A value that cannot be stored in the column.
    #[error("column `{column}` expects {expected}, got {actual}")]
    TypeMismatch {
        /// Column name (or position when unnamed).
        column: String,
        /// Declared column type.
        expected: ColumnType,
        /// Kind of the offending value.
        actual: &'static str,
    },

    /// A null where the target cannot hold one.
    #[error("column `{column}` is null")]
    NullValue {
        /// Column name (or position when unnamed).
        column: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_distinguishable() {
        assert!(Error::UserCancel.is_cancel());
        assert!(Error::DeadlineExceeded.is_cancel());
        assert!(!Error::NotImplemented.is_cancel());
        assert!(Error::NotImplemented.is_not_implemented());

        let io = Error::from(std::io::Error::other("broken pipe"));
        assert!(!io.is_cancel());
        assert!(!io.is_usage());
    }

    #[test]
    fn test_usage_display() {
        let err = Error::from(UsageError::ArityMismatch {
            expected: 2,
            actual: 1,
        });
        assert!(err.is_usage());
        assert_eq!(err.to_string(), "expected 2 values, got 1");
    }
}
