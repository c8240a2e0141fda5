//! Error types for the lending coordinator

use crate::wallet::TxHandle;
use thiserror::Error;

/// Coordinator error type
#[derive(Error, Debug)]
pub enum Error {
    /// A private record required as a transaction input was not found
    /// (not yet visible, already spent, or never created)
    #[error("Required record unavailable: {0}")]
    InputUnavailable(String),

    /// The wallet or ledger refused the transaction before broadcast
    #[error("Transaction submission rejected: {0}")]
    SubmissionRejected(String),

    /// The transaction was broadcast but rejected on execution
    #[error("Transaction {tx} was rejected: {reason}")]
    FinalizationRejected { tx: TxHandle, reason: String },

    /// The polling budget ran out while the transaction was still pending
    #[error("Transaction {tx} still pending after {attempts} status checks")]
    FinalizationTimeout { tx: TxHandle, attempts: u32 },

    /// The flow was cancelled before its next step was broadcast
    #[error("Flow cancelled before submission: {0}")]
    Cancelled(String),

    /// The caller stopped waiting; the transaction may still finalize
    #[error("Stopped waiting for transaction {tx}; it may still finalize")]
    Abandoned { tx: TxHandle },

    /// Request failed local validation before any submission
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Another flow of the same kind is already in flight
    #[error("A {0} flow is already in progress")]
    FlowInFlight(String),

    /// The flow state machine was driven with an event its state does not accept
    #[error("Invalid flow transition: {0}")]
    InvalidTransition(String),

    /// A ledger read failed and should be retried on the next pass
    #[error("Ledger read failed: {0}")]
    ReadFailure(String),

    /// Ledger response could not be interpreted
    #[error("Malformed ledger response: {0}")]
    MalformedResponse(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Timeouts are retryable from the caller's point of view: the outcome is
    /// unknown, not failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ReadFailure(_)
                | Error::Http(_)
                | Error::FinalizationTimeout { .. }
                | Error::Abandoned { .. }
                | Error::InputUnavailable(_)
                | Error::FlowInFlight(_)
        )
    }

    /// Short message suitable for showing to the person who started the flow
    pub fn user_message(&self) -> String {
        match self {
            Error::InputUnavailable(what) => {
                format!("{what}. It may not be visible in your wallet yet.")
            }
            Error::SubmissionRejected(reason) | Error::FinalizationRejected { reason, .. } => {
                format!("Transaction was rejected: {reason}")
            }
            Error::FinalizationTimeout { .. } | Error::Abandoned { .. } => {
                "Transaction is still processing, check back shortly".to_string()
            }
            Error::Cancelled(_) => "Cancelled before anything was submitted".to_string(),
            Error::ValidationFailed(reason) => reason.clone(),
            Error::FlowInFlight(kind) => format!("A {kind} request is already in progress"),
            other => other.to_string(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_and_rejection_messages_differ() {
        let tx = TxHandle::new("at1abc");
        let timeout = Error::FinalizationTimeout {
            tx: tx.clone(),
            attempts: 20,
        };
        let rejected = Error::FinalizationRejected {
            tx,
            reason: "insufficient collateral".to_string(),
        };

        assert!(timeout.user_message().contains("still processing"));
        assert!(rejected.user_message().contains("rejected"));
        assert!(timeout.is_retryable());
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn test_read_failure_is_retryable() {
        assert!(Error::ReadFailure("connection reset".into()).is_retryable());
        assert!(!Error::SubmissionRejected("bad inputs".into()).is_retryable());
    }
}
