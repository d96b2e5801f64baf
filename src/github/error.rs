//! Error taxonomy for the extraction pipeline.

use thiserror::Error;

use super::rate_limit::RateLimitInfo;
use crate::persistence::StoreError;

/// Errors surfaced while configuring, fetching, or storing extraction data.
///
/// The variants encode the propagation policy: [`ExtractError::Transient`]
/// is retried with bounded backoff, [`ExtractError::RateLimited`] suspends
/// the fetch until the forge-reported reset and is not a failure,
/// [`ExtractError::Malformed`] is absorbed at the normalizer boundary, and
/// the remaining variants abort the current run while leaving committed
/// batches and the checkpoint intact.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The authentication token was missing.
    #[error("personal access token is required")]
    MissingToken,

    /// The authentication token was rejected by the forge.
    #[error("GitHub rejected the token: {message}")]
    Authentication {
        /// Forge error message returned with the 401/403 response.
        message: String,
    },

    /// The request failed at the transport level and may succeed on retry.
    #[error("transient network error talking to GitHub: {message}")]
    Transient {
        /// Transport-level error detail.
        message: String,
    },

    /// The primary or secondary rate limit is exhausted.
    ///
    /// Not a failure: the paginator suspends until the reset time elapses
    /// and resumes from the same cursor.
    #[error("GitHub API rate limit exceeded: {message}")]
    RateLimited {
        /// Rate limit state if available from the quota endpoint.
        rate_limit: Option<RateLimitInfo>,
        /// Error message from the forge.
        message: String,
    },

    /// The forge returned a non-authentication API error.
    #[error("GitHub API error: {message}")]
    Api {
        /// Response body from the forge describing the failure.
        message: String,
    },

    /// A fetched record could not be fully normalized.
    ///
    /// Absorbed at the normalizer: the row is stored with an unknown-type
    /// marker and processing continues.
    #[error("malformed record: {message}")]
    Malformed {
        /// What was wrong with the record.
        message: String,
    },

    /// Writing a batch to the table store failed.
    ///
    /// Fatal for the current batch; the checkpoint is not advanced and the
    /// next run retries the batch from scratch.
    #[error("storage write failed: {0}")]
    Storage(#[from] StoreError),

    /// The retry budget for one fetch unit was exhausted.
    #[error("retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The last error observed.
        message: String,
    },

    /// A URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The repository coordinates are incomplete.
    #[error("repository owner and name are required")]
    MissingRepository,

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        /// Details about the configuration failure.
        message: String,
    },

    /// Local I/O operation failed.
    #[error("I/O error: {message}")]
    Io {
        /// Error detail from the underlying I/O operation.
        message: String,
    },
}

impl ExtractError {
    /// Returns true when the run must stop immediately with no checkpoint
    /// advance.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. }
                | Self::Storage(_)
                | Self::Configuration { .. }
                | Self::MissingToken
                | Self::MissingRepository
        )
    }
}
