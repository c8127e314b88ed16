//! Error types for the deposit/refund pipeline.
//!
//! [`PipelineError`] is the taxonomy surfaced to hosts (UI, daemon):
//! configuration, network, operation, timeout and verification failures.
//! Component crates define their own errors and convert into it.

use std::fmt;

use crate::auth::VerificationError;

/// A required option is missing or a configured value is malformed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required option is not set.
    #[error("{option} is not configured")]
    Missing {
        /// Name of the option (as its environment variable).
        option: &'static str,
    },
    /// An option is set but cannot be used.
    #[error("{option} is invalid: {reason}")]
    Invalid {
        /// Name of the option (as its environment variable).
        option: &'static str,
        /// What is wrong with the value.
        reason: String,
    },
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for the expected schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Creates an [`ConfigError::Invalid`] for `option`.
    #[must_use]
    pub fn invalid(option: &'static str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            option,
            reason: reason.to_string(),
        }
    }
}

/// Machine-readable kind of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Required endpoint, contract address or option missing or malformed.
    Configuration,
    /// Transport failure reaching the chain RPC or the bundler.
    Network,
    /// Sponsorship rejected or on-chain execution reverted.
    Operation,
    /// Confirmation not observed in time.
    Timeout,
    /// Authentication collaborator rejected the user.
    Verification,
}

impl ErrorKind {
    /// Returns the kind as a stable lowercase string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Network => "network",
            Self::Operation => "operation",
            Self::Timeout => "timeout",
            Self::Verification => "verification",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Required configuration is missing or invalid. Never retried.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Transport failure or invalid response from the chain or bundler.
    #[error("network error: {0}")]
    Network(String),

    /// The bundler/paymaster rejected the operation, or it reverted on-chain.
    #[error("operation error: {0}")]
    Operation(String),

    /// Confirmation was not observed before the deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The authentication collaborator rejected the user.
    #[error("verification error: {0}")]
    Verification(#[from] VerificationError),
}

impl PipelineError {
    /// Creates a network error from any displayable cause.
    #[must_use]
    pub fn network(cause: impl fmt::Display) -> Self {
        Self::Network(cause.to_string())
    }

    /// Creates an operation error from any displayable cause.
    #[must_use]
    pub fn operation(cause: impl fmt::Display) -> Self {
        Self::Operation(cause.to_string())
    }

    /// Returns the machine-readable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Network(_) => ErrorKind::Network,
            Self::Operation(_) => ErrorKind::Operation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Verification(_) => ErrorKind::Verification,
        }
    }
}
