use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for idkeep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while caching, fetching or validating credentials
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed argument, malformed certificate material or missing input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The identity authority could not be reached or returned an error
    #[error("credential fetch failed: {0}")]
    FetchFailure(String),

    /// Claimed or verified identity differs from the expected one
    #[error("identity mismatch: expected {expected}, got {actual}")]
    IdentityMismatch {
        /// Identity the caller required
        expected: String,
        /// Identity actually presented
        actual: String,
    },

    /// Certificate is not valid yet, even after allowing for clock skew
    #[error("certificate not valid before {not_before} (now {now})")]
    NotYetValid {
        /// Start of the validity window
        not_before: DateTime<Utc>,
        /// Evaluation time
        now: DateTime<Utc>,
    },

    /// Certificate has expired, even after allowing for clock skew
    #[error("certificate expired at {not_after} (now {now})")]
    Expired {
        /// End of the validity window
        not_after: DateTime<Utc>,
        /// Evaluation time
        now: DateTime<Utc>,
    },

    /// Chain of trust could not be established, or no trust bundles are configured
    #[error("certificate chain invalid: {0}")]
    ChainInvalid(String),

    /// The cache has been closed
    #[error("credential cache is closed")]
    Closed,

    /// Configuration is unreadable or invalid
    #[error("configuration error: {0}")]
    Config(String),
}

/// Discriminant of an [`Error`], for branching without matching payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    FetchFailure,
    IdentityMismatch,
    NotYetValid,
    Expired,
    ChainInvalid,
    Closed,
    Config,
}

impl Error {
    /// Shorthand for an [`Error::IdentityMismatch`] built from displayable identities.
    pub fn identity_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::IdentityMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Returns the kind of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::FetchFailure(_) => ErrorKind::FetchFailure,
            Self::IdentityMismatch { .. } => ErrorKind::IdentityMismatch,
            Self::NotYetValid { .. } => ErrorKind::NotYetValid,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::ChainInvalid(_) => ErrorKind::ChainInvalid,
            Self::Closed => ErrorKind::Closed,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns true if a later attempt may succeed.
    ///
    /// Nothing in this workspace retries on its own; this is a hint for callers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailure(_))
    }

    /// Returns true for time-window violations
    #[must_use]
    pub const fn is_validity_error(&self) -> bool {
        matches!(self, Self::NotYetValid { .. } | Self::Expired { .. })
    }
}
