//! # PrivLend Coordinator
//!
//! Client-side coordinator for a private lending program whose state is split
//! between wallet-held private records and public ledger mappings.
//!
//! This crate provides:
//! - A ledger read client and an aggregator that rebuilds the loan set from
//!   flat public mappings
//! - Private record decoding and selection
//! - A transaction orchestrator driving multi-step flows to finalization
//! - Transaction lifecycle tracking and history
//! - A session state store with replace-only refresh

#![warn(missing_docs, rust_2018_idioms)]
#![forbid(unsafe_code)]
#![allow(missing_docs)] // Internal implementation details

mod aggregator;
mod config;
mod coordinator;
mod error;
mod flow;
mod history;
mod ledger;
mod lifecycle;
mod literal;
mod orchestrator;
mod records;
mod selector;
mod session;
mod submission;
mod transaction;
mod types;
mod wallet;

#[cfg(test)]
mod testing;

pub use aggregator::{
    LedgerAggregator, LedgerSnapshot, LoanRead, ScanIssue, SkipReason, LOAN_ACTIVE_MAPPING,
    LOAN_COUNTER_MAPPING, LOAN_DEADLINE_MAPPING, LOAN_OWNER_MAPPING,
};
pub use config::{
    AggregatorConfig, CoordinatorConfig, LedgerConfig, LifecycleConfig, OrchestratorConfig,
    SessionConfig,
};
pub use coordinator::{HttpLendingCoordinator, LendingCoordinator};
pub use error::{Error, Result};
pub use flow::{FlowEvent, FlowMachine, FlowState, PollOutcome, StepFailure};
pub use history::{label_for, load_history, map_history, TransactionItem};
pub use ledger::{HttpLedgerClient, LedgerReader};
pub use lifecycle::{LifecycleManager, LifecycleStatistics, TransactionLifecycle, TransactionStatus};
pub use literal::{format_literal, literals_equal, parse_numeric, strip_literal, LiteralType};
pub use orchestrator::{
    CancelSignal, FlightGuard, FlightTracker, FlowCanceller, FlowReceipt, RefreshHook, StepReceipt,
    TransactionOrchestrator,
};
pub use records::{
    decode_records, CreditTierRecord, LoanRecord, LoanRecordStatus, PrivateRecord, RawRecord,
    RecordKind,
};
pub use selector::{select, select_all, select_by, RecordPredicate, RecordQuery};
pub use session::{SessionStore, SessionView};
pub use submission::{SubmissionHandler, SubmissionResult};
pub use transaction::{
    plan_liquidate, plan_open_credit_profile, plan_open_loan, plan_repay, random_field_nonce,
    FlowKind, FlowPlan, FunctionKind, LoanTerms, StepInput, TransactionStep, MIN_PRINCIPAL,
};
pub use types::{total_due, CreditTier, LoanId, LoanPublic, LoanStatus, NetworkStats};
pub use wallet::{
    classify_status, PollStatus, RawHistoryEntry, TransactionRequest, TxHandle, WalletError,
    WalletProvider,
};

/// Current Unix time in milliseconds
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
