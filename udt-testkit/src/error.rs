// Error types for the test kit

use std::time::Duration;
use thiserror::Error;

/// Boxed error raised by an injected probe.
pub type ProbeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Test kit errors
#[derive(Debug, Error)]
pub enum TestkitError {
    /// The probe itself failed; never retried.
    #[error("Probe failed: {0}")]
    ProbeFailed(#[source] ProbeError),

    #[error("Failed to allocate address for '{host}' after {attempts} attempts")]
    AllocationExhausted { host: String, attempts: u32 },

    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("Condition not met after {probes} probes in {elapsed:?}")]
    WaitTimedOut { probes: u32, elapsed: Duration },

    #[error("Wait cancelled")]
    Cancelled,

    #[error("Process error: {0}")]
    Process(String),

    #[error("Property '{0}' not defined")]
    MissingProperty(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TestkitError {
    /// Wrap a probe error.
    pub fn probe<E>(error: E) -> Self
    where
        E: Into<ProbeError>,
    {
        Self::ProbeFailed(error.into())
    }

    /// True for [`TestkitError::AllocationExhausted`].
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::AllocationExhausted { .. })
    }

    /// True for [`TestkitError::WaitTimedOut`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::WaitTimedOut { .. })
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, TestkitError>;
