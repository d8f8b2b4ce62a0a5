//! Error types for the transaction tracker

use std::time::Duration;
use thiserror::Error;

/// Terminal failure causes reported by the tracker.
///
/// Every variant except [`TrackerError::Config`] ends up in the caller's
/// `on_error` callback; none of them is ever returned as `Err` from
/// `SubmissionTracker::submit`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Signer rejected transaction: {0}")]
    SignerRejected(String),

    #[error("Network rejected transaction: {0}")]
    SubmissionRejected(String),

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("RPC error while querying {hash}: {message} (code {code})")]
    FatalQuery {
        hash: String,
        code: i64,
        message: String,
    },

    #[error("Transaction failed: {detail}")]
    ExecutionFailed { hash: String, detail: String },

    #[error("Transaction timeout after {waited_secs} seconds. Hash: {hash}")]
    ConfirmationTimeout { hash: String, waited_secs: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    pub(crate) fn timeout(hash: &str, waited: Duration) -> Self {
        TrackerError::ConfirmationTimeout {
            hash: hash.to_string(),
            waited_secs: waited.as_secs(),
        }
    }

    /// Transaction hash the error refers to, if the submission got that far
    pub fn transaction_hash(&self) -> Option<&str> {
        match self {
            TrackerError::FatalQuery { hash, .. }
            | TrackerError::ExecutionFailed { hash, .. }
            | TrackerError::ConfirmationTimeout { hash, .. } => Some(hash),
            _ => None,
        }
    }

    /// Short label used for metrics and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::SignerRejected(_) => "signer_rejected",
            TrackerError::SubmissionRejected(_) => "submission_rejected",
            TrackerError::MalformedTransaction(_) => "malformed_transaction",
            TrackerError::FatalQuery { .. } => "fatal_query",
            TrackerError::ExecutionFailed { .. } => "execution_failed",
            TrackerError::ConfirmationTimeout { .. } => "confirmation_timeout",
            TrackerError::Config(_) => "config",
            TrackerError::Internal(_) => "internal",
        }
    }
}

/// Errors from a status or submission query against the network.
///
/// The split between transient and fatal is explicit: only `Transport` and
/// `NotFound` are retried by the confirmation loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not found (code {code}): {message}")]
    NotFound { code: i64, message: String },

    #[error("RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    Decode(String),
}

impl QueryError {
    /// Check if the confirmation loop may retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, QueryError::Transport(_) | QueryError::NotFound { .. })
    }

    /// JSON-RPC error code, or 0 for errors that never reached the RPC layer
    pub fn code(&self) -> i64 {
        match self {
            QueryError::NotFound { code, .. } | QueryError::Rpc { code, .. } => *code,
            _ => 0,
        }
    }
}

/// Errors reported by a transaction signer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("signing rejected: {0}")]
    Rejected(String),

    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;
