//! Ledger state aggregator
//!
//! Reconstructs the loan set from flat public mappings. The ledger only
//! exposes `loan_counter` plus three per-loan mappings, so a scan reads the
//! counter `N` and then the `active`, `owner` and `deadline` entries for
//! every identifier in `1..=N`.

use crate::config::AggregatorConfig;
use crate::ledger::LedgerReader;
use crate::literal::{
    format_literal, literals_equal, parse_address, parse_bool, parse_u32, parse_u64, LiteralType,
};
use crate::types::{LoanId, LoanPublic, LoanStatus, NetworkStats};
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Mapping holding the highest registered loan id (key `0u32`)
pub const LOAN_COUNTER_MAPPING: &str = "loan_counter";
pub const LOAN_ACTIVE_MAPPING: &str = "loan_active";
pub const LOAN_OWNER_MAPPING: &str = "loan_owner";
pub const LOAN_DEADLINE_MAPPING: &str = "loan_deadline";

/// Why a loan identifier was left out of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// At least one of the three mappings has no entry yet
    Incomplete,

    /// A mapping value could not be parsed
    Malformed(String),

    /// A read failed; the identifier is retried on the next scan
    ReadFailed(String),
}

/// Non-fatal issue encountered while scanning one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanIssue {
    pub loan_id: LoanId,
    pub reason: SkipReason,
}

/// Outcome of reading one loan's public view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanRead {
    Complete(LoanPublic),
    Skipped(SkipReason),
}

/// Result of one scan over `[1, loan_counter]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Height the statuses are derived against
    pub height: u64,

    /// Loan counter read at the start of the scan
    pub loan_counter: u32,

    /// Completely-read loans, ordered by id
    pub loans: Vec<LoanPublic>,

    /// Identifiers omitted from `loans`, ordered by id
    pub issues: Vec<ScanIssue>,
}

impl LedgerSnapshot {
    /// Every completely-read loan
    pub fn all_loans(&self) -> &[LoanPublic] {
        &self.loans
    }

    /// Loans borrowed by `owner`
    pub fn loans_owned_by(&self, owner: &str) -> Vec<LoanPublic> {
        self.loans
            .iter()
            .filter(|loan| literals_equal(&loan.owner, owner))
            .cloned()
            .collect()
    }

    /// Active loans past their deadline
    pub fn liquidatable_loans(&self) -> Vec<LoanPublic> {
        self.loans
            .iter()
            .filter(|loan| loan.status(self.height) == LoanStatus::Liquidatable)
            .cloned()
            .collect()
    }

    pub fn get(&self, loan_id: LoanId) -> Option<&LoanPublic> {
        self.loans
            .binary_search_by_key(&loan_id, |loan| loan.loan_id)
            .ok()
            .map(|i| &self.loans[i])
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats::from_loans(self.loan_counter, &self.loans, self.height)
    }
}

/// Ledger state aggregator
///
/// Stateless apart from its reader; safe to invoke repeatedly and
/// concurrently with itself.
pub struct LedgerAggregator<L> {
    reader: Arc<L>,
    config: AggregatorConfig,
}

impl<L: LedgerReader> LedgerAggregator<L> {
    /// Create a new aggregator
    pub fn new(reader: Arc<L>, config: AggregatorConfig) -> Self {
        Self { reader, config }
    }

    pub fn reader(&self) -> &Arc<L> {
        &self.reader
    }

    /// Current block height
    pub async fn latest_height(&self) -> Result<u64> {
        self.reader.latest_height().await
    }

    /// Highest registered loan id; zero when no loan was ever registered
    pub async fn loan_counter(&self) -> Result<u32> {
        let key = format_literal(0u32, LiteralType::U32);
        match self.reader.mapping_value(LOAN_COUNTER_MAPPING, &key).await? {
            None => Ok(0),
            Some(raw) => parse_u32(&raw).ok_or_else(|| {
                Error::MalformedResponse(format!("{LOAN_COUNTER_MAPPING}: {raw}"))
            }),
        }
    }

    /// Read and stitch the three mappings for one loan
    pub async fn read_loan(&self, loan_id: LoanId) -> LoanRead {
        let key = format_literal(loan_id, LiteralType::U32);
        let (active, owner, deadline) = tokio::join!(
            self.reader.mapping_value(LOAN_ACTIVE_MAPPING, &key),
            self.reader.mapping_value(LOAN_OWNER_MAPPING, &key),
            self.reader.mapping_value(LOAN_DEADLINE_MAPPING, &key),
        );

        let (active, owner, deadline) = match (active, owner, deadline) {
            (Ok(Some(a)), Ok(Some(o)), Ok(Some(d))) => (a, o, d),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                return LoanRead::Skipped(SkipReason::ReadFailed(e.to_string()));
            }
            _ => return LoanRead::Skipped(SkipReason::Incomplete),
        };

        match (parse_bool(&active), parse_address(&owner), parse_u64(&deadline)) {
            (Some(active), Some(owner), Some(deadline)) => LoanRead::Complete(LoanPublic {
                loan_id,
                owner,
                deadline,
                active,
            }),
            _ => {
                warn!(
                    "Loan {} has unparsable mapping values: active={:?} owner={:?} deadline={:?}",
                    loan_id, active, owner, deadline
                );
                LoanRead::Skipped(SkipReason::Malformed(format!(
                    "active={active} owner={owner} deadline={deadline}"
                )))
            }
        }
    }

    /// Public view of a single loan, if all three reads succeed
    pub async fn fetch_loan(&self, loan_id: LoanId) -> Result<Option<LoanPublic>> {
        match self.read_loan(loan_id).await {
            LoanRead::Complete(loan) => Ok(Some(loan)),
            LoanRead::Skipped(SkipReason::ReadFailed(e)) => Err(Error::ReadFailure(e)),
            LoanRead::Skipped(_) => Ok(None),
        }
    }

    /// Read every loan in `[1, loan_counter]`.
    ///
    /// Reads for different identifiers run concurrently and may complete in
    /// any order; results are keyed by id so the snapshot is identical
    /// regardless. Identifiers with any missing or failed read are reported
    /// in `issues` and never appear in `loans`.
    pub async fn scan_loans(&self, loan_counter: u32, height: u64) -> LedgerSnapshot {
        let reads: Vec<(LoanId, LoanRead)> = stream::iter(1..=loan_counter)
            .map(|loan_id| async move { (loan_id, self.read_loan(loan_id).await) })
            .buffer_unordered(self.config.max_concurrent_reads.max(1))
            .collect()
            .await;

        let mut loans = BTreeMap::new();
        let mut issues = BTreeMap::new();
        for (loan_id, read) in reads {
            match read {
                LoanRead::Complete(loan) => {
                    loans.insert(loan_id, loan);
                }
                LoanRead::Skipped(reason) => {
                    if let SkipReason::ReadFailed(ref e) = reason {
                        warn!("Dropping loan {} from this scan: {}", loan_id, e);
                    }
                    issues.insert(loan_id, reason);
                }
            }
        }

        debug!(
            "Scanned {} loan ids: {} complete, {} skipped",
            loan_counter,
            loans.len(),
            issues.len()
        );

        LedgerSnapshot {
            height,
            loan_counter,
            loans: loans.into_values().collect(),
            issues: issues
                .into_iter()
                .map(|(loan_id, reason)| ScanIssue { loan_id, reason })
                .collect(),
        }
    }

    /// Read height and counter, then scan the full loan range.
    ///
    /// Fails only when the height or counter cannot be read; per-loan read
    /// failures are reported in the snapshot.
    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let (height, counter) = tokio::join!(self.latest_height(), self.loan_counter());
        let (height, counter) = (height?, counter?);

        let snapshot = self.scan_loans(counter, height).await;
        info!(
            "Ledger snapshot at height {}: {} of {} loans read",
            height,
            snapshot.loans.len(),
            counter
        );
        Ok(snapshot)
    }

    /// All completely-read loans
    pub async fn all_loans(&self) -> Result<Vec<LoanPublic>> {
        Ok(self.snapshot().await?.loans)
    }

    /// Loans borrowed by `owner`
    pub async fn loans_owned_by(&self, owner: &str) -> Result<Vec<LoanPublic>> {
        Ok(self.snapshot().await?.loans_owned_by(owner))
    }

    /// Active loans whose deadline has passed
    pub async fn liquidatable_loans(&self) -> Result<Vec<LoanPublic>> {
        Ok(self.snapshot().await?.liquidatable_loans())
    }
}
