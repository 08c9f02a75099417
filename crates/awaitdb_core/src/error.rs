//! Error types for the adapter layer.

use awaitdb_engine::EngineError;
use thiserror::Error;

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the adapter layer.
///
/// Host engine failures pass through as [`Error::Host`]; the
/// remaining variants are produced by the adapter itself. On a single
/// open attempt, [`Error::UpgradeFailed`] takes precedence over
/// whatever the host reports afterwards, success included.
#[derive(Debug, Error)]
pub enum Error {
    /// `open` was called on a handle that is already connected.
    #[error("database is already open")]
    AlreadyOpen,

    /// Another open connection prevents the upgrade or deletion. The
    /// underlying host request stays pending independently of this
    /// rejection and is not retried.
    #[error("blocked by another open connection")]
    Blocked,

    /// The upgrade hook failed; carries the hook's original error.
    #[error("upgrade failed: {source}")]
    UpgradeFailed {
        /// The error the hook returned.
        source: Box<Error>,
    },

    /// A caller-constructed error, typically returned from an
    /// upgrade hook.
    #[error("{message}")]
    Custom {
        /// The caller's message.
        message: String,
    },

    /// An error reported by the host engine, passed through
    /// opaquely.
    #[error(transparent)]
    Host(#[from] EngineError),
}

impl Error {
    /// Creates a caller error, for failing an upgrade hook with a
    /// domain-specific message.
    ///
    /// # Example
    ///
    /// ```rust
    /// use awaitdb_core::Error;
    ///
    /// let error = Error::custom("schema migration not supported");
    /// assert_eq!(error.to_string(), "schema migration not supported");
    /// ```
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    /// Wraps a hook error as the upgrade failure it caused.
    pub(crate) fn upgrade_failed(source: Error) -> Self {
        Self::UpgradeFailed {
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_convert() {
        let error: Error = EngineError::invalid_state("nope").into();
        assert!(matches!(error, Error::Host(EngineError::InvalidState { .. })));
    }

    #[test]
    fn upgrade_failed_preserves_the_source_message() {
        let error = Error::upgrade_failed(Error::custom("boom"));
        assert_eq!(error.to_string(), "upgrade failed: boom");
    }
}
