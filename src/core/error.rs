//! Error types for the scanquorum library.
//!
//! Errors are split by who has to deal with them:
//!
//! - [`EngineError`] stays inside the engine fan-out. Every variant is turned
//!   into an [`EngineOutcome`](crate::core::EngineOutcome) before a verdict is
//!   computed, so callers never see it from a scan attempt.
//! - [`RegistryError`] is a caller error, returned synchronously and never
//!   retried by the library.
//! - [`ConfigError`] is raised while validating an engine pool.

use std::time::Duration;
use thiserror::Error;

/// A failure raised by an engine adapter.
///
/// Adapters are expected to report ordinary failures as outcomes. This type
/// covers the remaining cases, which the dispatcher converts to an `Unknown`
/// outcome carrying the error message.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine is not reachable or refused to serve the request.
    #[error("engine '{engine}' is unavailable: {reason}")]
    Unavailable {
        /// Name of the engine.
        engine: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The engine did not answer in time.
    #[error("engine '{engine}' timed out after {elapsed:?}")]
    Timeout {
        /// Name of the engine.
        engine: String,
        /// How long the call ran.
        elapsed: Duration,
    },

    /// A network connection to the engine failed.
    #[error("connection to engine '{engine}' failed: {message}")]
    ConnectionFailed {
        /// Name of the engine.
        engine: String,
        /// Error message.
        message: String,
    },

    /// A spawned engine process failed.
    #[error("engine '{engine}' process failed: {message}")]
    Process {
        /// Name of the engine.
        engine: String,
        /// Error message.
        message: String,
    },

    /// The engine answered with something we could not interpret.
    #[error("ambiguous response from engine '{engine}': {details}")]
    AmbiguousResponse {
        /// Name of the engine.
        engine: String,
        /// What was wrong with the response.
        details: String,
    },

    /// The attempt was cancelled while the engine was running.
    #[error("engine call was cancelled")]
    Cancelled,

    /// An I/O error occurred while reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The adapter is misconfigured.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },
}

impl EngineError {
    /// Returns the engine name if this error is tied to one.
    pub fn engine(&self) -> Option<&str> {
        match self {
            Self::Unavailable { engine, .. }
            | Self::Timeout { engine, .. }
            | Self::ConnectionFailed { engine, .. }
            | Self::Process { engine, .. }
            | Self::AmbiguousResponse { engine, .. } => Some(engine),
            _ => None,
        }
    }

    /// Returns `true` if this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Creates an `Unavailable` error.
    pub fn unavailable(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConnectionFailed` error.
    pub fn connection_failed(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Creates a `Process` error.
    pub fn process(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Process {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// A rejected request against the operation registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The caller did not supply a user session.
    #[error("user session id is required")]
    MissingSession,

    /// No open operation has this id.
    #[error("operation not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// The registry is in global-stop mode and refuses new operations.
    #[error("system is stopping all operations; retry in {retry_after:?}")]
    SystemStopping {
        /// Time left until new operations are accepted again.
        retry_after: Duration,
    },

    /// The submitted file exceeds the configured maximum size.
    #[error("file size {size} bytes exceeds maximum {max} bytes")]
    FileTooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        max: u64,
    },

    /// The operation was cancelled before it produced a verdict.
    #[error("operation {id} was cancelled")]
    Cancelled {
        /// The cancelled operation.
        id: String,
    },

    /// An I/O error occurred while inspecting the submitted file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Returns `true` if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SystemStopping { .. })
    }
}

/// Invalid engine pool configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No engines were configured.
    #[error("at least one engine is required")]
    EmptyPool,

    /// A service was built without a consensus engine.
    #[error("a consensus engine is required")]
    NoEngines,

    /// An engine has an empty name.
    #[error("engine names must not be empty")]
    EmptyName,

    /// Two engines share a name.
    #[error("duplicate engine '{name}'")]
    DuplicateEngine {
        /// The duplicated name.
        name: String,
    },

    /// An engine weight is negative or not finite.
    #[error("invalid weight {weight} for engine '{name}'")]
    InvalidWeight {
        /// Engine name.
        name: String,
        /// The rejected weight.
        weight: f64,
    },

    /// Nominal weights do not add up to 100.
    #[error("engine weights must sum to 100, got {total}")]
    WeightSum {
        /// The actual sum.
        total: f64,
    },

    /// A configured engine has no adapter.
    #[error("no adapter registered for engine '{name}'")]
    MissingAdapter {
        /// Engine name.
        name: String,
    },
}

/// A specialized `Result` type for engine adapters.
pub type EngineResult<T> = Result<T, EngineError>;

/// A specialized `Result` type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A specialized `Result` type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_engine() {
        let err = EngineError::unavailable("clamav", "binary missing");
        assert_eq!(err.engine(), Some("clamav"));

        let io_err = EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io_err.engine(), None);
        assert!(!io_err.is_cancelled());
        assert!(EngineError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::FileTooLarge {
            size: 2_000_000_000,
            max: 1_073_741_824,
        };
        assert!(err.to_string().contains("2000000000"));
        assert!(err.to_string().contains("1073741824"));

        let stopping = RegistryError::SystemStopping {
            retry_after: Duration::from_secs(3),
        };
        assert!(stopping.is_transient());
        assert!(!RegistryError::MissingSession.is_transient());
    }
}
