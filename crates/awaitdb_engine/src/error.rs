//! Error types for host engine operations.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by the host engine.
///
/// These are the failure modes a host engine surfaces through request
/// completions. The adapter layer passes them through opaquely except
/// where a kind carries open-lifecycle meaning (`VersionTooLow`,
/// `Blocked`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// An open requested a version below the stored version.
    #[error("requested version {requested} is below stored version {stored}")]
    VersionTooLow {
        /// The version the open asked for.
        requested: u64,
        /// The version currently on disk.
        stored: u64,
    },

    /// The requested version is zero or otherwise unusable.
    #[error("invalid database version: {0}")]
    InvalidVersion(u64),

    /// A schema mutation conflicted with the existing schema.
    #[error("schema conflict: {message}")]
    SchemaConflict {
        /// Description of the conflict.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A named object store or index does not exist, or lies outside
    /// the transaction's scope.
    #[error("not found: {name}")]
    NotFound {
        /// The name that failed to resolve.
        name: String,
    },

    /// A uniqueness constraint was violated.
    #[error("constraint violation: {message}")]
    ConstraintViolation {
        /// Description of the violation.
        message: String,
    },

    /// A write was attempted through a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction was rolled back.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the rollback.
        reason: String,
    },

    /// A key or value could not be used for the requested operation.
    #[error("data error: {message}")]
    DataError {
        /// Description of the problem.
        message: String,
    },

    /// Another open connection prevents the upgrade or deletion from
    /// proceeding. The underlying host request stays pending.
    #[error("blocked by another open connection")]
    Blocked,

    /// The connection or database is gone.
    #[error("connection is closed")]
    Closed,
}

impl EngineError {
    /// Creates a schema conflict error.
    pub fn schema_conflict(message: impl Into<String>) -> Self {
        Self::SchemaConflict {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::DataError {
            message: message.into(),
        }
    }
}
