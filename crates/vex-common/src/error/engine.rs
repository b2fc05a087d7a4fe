//! Engine error types.
//!
//! All errors raised by the execution runtime are fail-fast: detection
//! aborts the query with a typed, message-carrying error. There is no
//! retry or partial-result degradation inside the core.

use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and are
/// stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Operation not supported.
    NotSupported = 0x0002,
    /// Operation was cancelled.
    Cancelled = 0x0003,

    // Data errors (0x0100 - 0x01FF)
    /// Implicit coercion failed.
    Cast = 0x0100,
    /// Runtime schema incompatible with the compile-time schema.
    SchemaMismatch = 0x0101,
    /// A row-count assertion was exceeded.
    RowCountExceeded = 0x0102,
    /// A structural invariant of the batch model was violated.
    Invariant = 0x0103,
}

impl ErrorCode {
    /// Returns the numeric value of this error code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Unified error type for the VEX execution runtime.
///
/// # Example
///
/// ```rust
/// use vex_common::{VexError, VexResult};
///
/// fn require_boolean(type_name: &str) -> VexResult<()> {
///     if type_name != "Boolean" {
///         return Err(VexError::invariant(format!(
///             "expected a Boolean vector, got {type_name}"
///         )));
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Error)]
pub enum VexError {
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Operation not supported.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Query execution was cancelled via the cooperative abort flag.
    #[error("query execution was cancelled")]
    Cancelled,

    /// Implicit coercion failed (unparsable number/boolean/date string,
    /// or unsupported target type).
    #[error("cannot cast '{value}' to {target}")]
    Cast {
        /// Display form of the offending value.
        value: String,
        /// Name of the requested target type.
        target: String,
    },

    /// Runtime schema is incompatible with the compile-time schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the incompatibility.
        message: String,
    },

    /// A row-count assertion was exceeded.
    #[error("result exceeded maximum row count of {limit}")]
    RowCountExceeded {
        /// The asserted maximum.
        limit: usize,
    },

    /// A structural invariant was violated (mismatched vector sizes,
    /// non-boolean filter vector, wrong vector kind for an operation).
    #[error("invariant violation: {message}")]
    Invariant {
        /// Description of the violation.
        message: String,
    },
}

impl VexError {
    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a not-supported error.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Creates a cast error.
    pub fn cast(value: impl std::fmt::Display, target: impl Into<String>) -> Self {
        Self::Cast {
            value: value.to_string(),
            target: target.into(),
        }
    }

    /// Creates a schema-mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Creates an invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Cast { .. } => ErrorCode::Cast,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::RowCountExceeded { .. } => ErrorCode::RowCountExceeded,
            Self::Invariant { .. } => ErrorCode::Invariant,
        }
    }

    /// Returns true if this error indicates a bug in the engine.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(VexError::Cancelled.code().as_u16(), 0x0003);
        assert_eq!(VexError::cast("abc", "Int").code(), ErrorCode::Cast);
        assert_eq!(
            VexError::schema_mismatch("count").code(),
            ErrorCode::SchemaMismatch
        );
        assert_eq!(
            VexError::RowCountExceeded { limit: 1 }.code(),
            ErrorCode::RowCountExceeded
        );
    }

    #[test]
    fn display_carries_message() {
        let err = VexError::cast("abc", "Int");
        assert_eq!(err.to_string(), "cannot cast 'abc' to Int");

        let err = VexError::invariant("vector sizes differ");
        assert!(err.to_string().contains("vector sizes differ"));
    }
}
