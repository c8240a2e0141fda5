//! Wallet transaction history

use crate::transaction::FunctionKind;
use crate::wallet::{classify_status, PollStatus, RawHistoryEntry, WalletProvider};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One row of transaction history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionItem {
    pub id: String,
    pub label: String,
    pub status: PollStatus,

    /// Unix milliseconds, when the wallet reports one
    pub timestamp: Option<u64>,
}

/// Human label for a program function name
pub fn label_for(function_name: Option<&str>) -> String {
    let Some(name) = function_name else {
        return "Unknown".to_string();
    };
    if let Some(kind) = FunctionKind::from_function_name(name) {
        return kind.label().to_string();
    }

    // wallets sometimes prefix the program id
    let label = if name.contains("create_credit_tier") {
        FunctionKind::CreateCreditTier.label()
    } else if name.contains("create_loan") {
        FunctionKind::CreateLoanPrivate.label()
    } else if name.contains("repay") {
        FunctionKind::RepayLoanPrivate.label()
    } else if name.contains("liquidate") {
        FunctionKind::LiquidateLoan.label()
    } else {
        name
    };
    label.to_string()
}

/// Convert raw wallet entries, newest first
pub fn map_history(entries: Vec<RawHistoryEntry>) -> Vec<TransactionItem> {
    let mut items: Vec<TransactionItem> = entries
        .into_iter()
        .map(|entry| TransactionItem {
            label: label_for(entry.function_name.as_deref()),
            status: classify_status(&entry.status),
            timestamp: entry.timestamp,
            id: entry.transaction_id,
        })
        .collect();

    // entries without a timestamp sort last
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    items
}

/// Load the wallet's history for `program`.
///
/// A wallet that cannot produce its history yields an empty list.
pub async fn load_history<W>(wallet: &W, program: &str) -> Vec<TransactionItem>
where
    W: WalletProvider + ?Sized,
{
    match wallet.transaction_history(program).await {
        Ok(entries) => {
            let items = map_history(entries);
            debug!("Loaded {} history entries for {}", items.len(), program);
            items
        }
        Err(e) => {
            warn!("Could not load transaction history for {}: {}", program, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedWallet;

    fn entry(
        id: &str,
        function: Option<&str>,
        status: &str,
        timestamp: Option<u64>,
    ) -> RawHistoryEntry {
        RawHistoryEntry {
            transaction_id: id.to_string(),
            function_name: function.map(str::to_string),
            status: status.to_string(),
            timestamp,
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(label_for(Some("create_credit_tier")), "Create Credit Tier");
        assert_eq!(label_for(Some("create_loan_private")), "Create Loan");
        assert_eq!(label_for(Some("privlend.aleo/repay_loan_private")), "Repay Loan");
        assert_eq!(label_for(Some("liquidate_loan")), "Liquidate");
        assert_eq!(label_for(Some("transfer_public")), "transfer_public");
        assert_eq!(label_for(None), "Unknown");
    }

    #[test]
    fn test_map_history_orders_and_classifies() {
        let items = map_history(vec![
            entry("a", Some("liquidate_loan"), "Completed", Some(10)),
            entry("b", None, "Pending", None),
            entry("c", Some("create_credit_tier"), "Failed", Some(30)),
        ]);

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(items[0].status, PollStatus::Rejected);
        assert_eq!(items[1].status, PollStatus::Finalized);
        assert_eq!(items[2].status, PollStatus::Pending);
    }

    #[tokio::test]
    async fn test_load_failure_yields_empty_list() {
        let wallet = ScriptedWallet::new();
        wallet.fail_history("not connected");
        assert!(load_history(&wallet, "privlend.aleo").await.is_empty());

        let wallet = ScriptedWallet::new();
        wallet.set_history(vec![entry("a", Some("liquidate_loan"), "Accepted", Some(1))]);
        let items = load_history(&wallet, "privlend.aleo").await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "Liquidate");
    }
}
