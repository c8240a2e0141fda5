//! Wallet provider boundary
//!
//! Submission, status lookup and record listing are supplied by the user's
//! wallet. This is the only mutating boundary the orchestrator calls.

use crate::records::RawRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Handle returned by the wallet for a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHandle(String);

impl TxHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution request handed to the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub program: String,
    pub function: String,
    pub inputs: Vec<String>,

    /// Fee in microcredits
    pub fee: u64,
    pub private_fee: bool,
}

/// Entry from the wallet's own transaction history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHistoryEntry {
    pub transaction_id: String,

    #[serde(default)]
    pub function_name: Option<String>,

    #[serde(default)]
    pub status: String,

    /// Unix milliseconds
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// Wallet-side failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    /// The wallet refused the request (malformed inputs, insufficient fee,
    /// user declined)
    #[error("{0}")]
    Rejected(String),

    /// The wallet could not be reached or is not connected
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

/// Finalization status of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollStatus {
    Pending,
    Finalized,
    Rejected,
}

/// Classify a wallet status string.
///
/// Wallets report free-form text (`"Accepted"`, `"Completed"`,
/// `"Finalized"`, `"Failed"`, ...). Anything not recognizably terminal is
/// `Pending`.
pub fn classify_status(raw: &str) -> PollStatus {
    let s = raw.to_ascii_lowercase();
    if ["accepted", "completed", "finalized", "success"]
        .iter()
        .any(|k| s.contains(k))
    {
        PollStatus::Finalized
    } else if ["failed", "rejected", "error", "aborted"]
        .iter()
        .any(|k| s.contains(k))
    {
        PollStatus::Rejected
    } else {
        PollStatus::Pending
    }
}

/// Primitives provided by the connected wallet
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Sign and broadcast a transaction
    async fn submit(&self, request: &TransactionRequest) -> Result<TxHandle, WalletError>;

    /// Raw status text for a submitted transaction
    async fn status(&self, handle: &TxHandle) -> Result<String, WalletError>;

    /// Records of `program` currently visible to the wallet
    async fn list_records(&self, program: &str) -> Result<Vec<RawRecord>, WalletError>;

    /// The wallet's own history of transactions against `program`
    async fn transaction_history(
        &self,
        _program: &str,
    ) -> Result<Vec<RawHistoryEntry>, WalletError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status("Accepted"), PollStatus::Finalized);
        assert_eq!(classify_status("completed"), PollStatus::Finalized);
        assert_eq!(classify_status("Finalized"), PollStatus::Finalized);
        assert_eq!(classify_status("Failed"), PollStatus::Rejected);
        assert_eq!(classify_status("rejected"), PollStatus::Rejected);
        assert_eq!(classify_status("Pending"), PollStatus::Pending);
        assert_eq!(classify_status("Generating proof"), PollStatus::Pending);
        assert_eq!(classify_status(""), PollStatus::Pending);
    }

    #[test]
    fn test_request_wire_shape() {
        let request = TransactionRequest {
            program: "privlend.aleo".to_string(),
            function: "liquidate_loan".to_string(),
            inputs: vec!["3u32".to_string()],
            fee: 100_000,
            private_fee: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["privateFee"], false);
        assert_eq!(json["inputs"][0], "3u32");
    }
}
