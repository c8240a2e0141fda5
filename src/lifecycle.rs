//! Transaction lifecycle management
//!
//! Tracks every submitted transaction from broadcast to its last known
//! outcome.

use crate::config::LifecycleConfig;
use crate::history::TransactionItem;
use crate::transaction::{FlowKind, FunctionKind};
use crate::wallet::{PollStatus, TxHandle};
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transaction status in the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Broadcast and awaiting finalization
    Pending,

    /// Finalized successfully
    Finalized,

    /// Finalized as rejected
    Rejected,

    /// Polling budget exhausted; outcome unknown
    TimedOut,

    /// Caller stopped waiting; outcome unknown
    Abandoned,
}

impl TransactionStatus {
    /// Check if the ledger outcome is known
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Finalized | TransactionStatus::Rejected)
    }

    /// Check if this status indicates success
    pub fn is_successful(&self) -> bool {
        matches!(self, TransactionStatus::Finalized)
    }

    /// Collapse onto the poll classification; unknown outcomes are pending
    pub fn as_poll_status(&self) -> PollStatus {
        match self {
            TransactionStatus::Finalized => PollStatus::Finalized,
            TransactionStatus::Rejected => PollStatus::Rejected,
            _ => PollStatus::Pending,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "Pending"),
            TransactionStatus::Finalized => write!(f, "Finalized"),
            TransactionStatus::Rejected => write!(f, "Rejected"),
            TransactionStatus::TimedOut => write!(f, "TimedOut"),
            TransactionStatus::Abandoned => write!(f, "Abandoned"),
        }
    }
}

/// Lifecycle of one submitted transaction
#[derive(Debug, Clone)]
pub struct TransactionLifecycle {
    pub handle: TxHandle,

    pub function: FunctionKind,

    pub flow: FlowKind,

    pub status: TransactionStatus,

    /// Submission timestamp (Unix milliseconds)
    pub submitted_at: u64,

    /// When the status last left `Pending` (Unix milliseconds)
    pub resolved_at: Option<u64>,

    /// Status checks performed so far
    pub polls: u32,

    /// Rejection reason, if any
    pub error: Option<String>,
}

impl TransactionLifecycle {
    /// Create a new pending transaction lifecycle
    pub fn new_pending(
        handle: TxHandle,
        function: FunctionKind,
        flow: FlowKind,
        submitted_at: u64,
    ) -> Self {
        Self {
            handle,
            function,
            flow,
            status: TransactionStatus::Pending,
            submitted_at,
            resolved_at: None,
            polls: 0,
            error: None,
        }
    }

    fn resolve(&mut self, status: TransactionStatus, timestamp: u64) {
        self.status = status;
        self.resolved_at = Some(timestamp);
    }

    /// Time from submission to a known outcome (milliseconds)
    pub fn total_time_ms(&self) -> Option<u64> {
        if !self.status.is_terminal() {
            return None;
        }
        self.resolved_at.map(|t| t.saturating_sub(self.submitted_at))
    }

    /// History entry for this transaction
    pub fn to_item(&self) -> TransactionItem {
        TransactionItem {
            id: self.handle.to_string(),
            label: self.function.label().to_string(),
            status: self.status.as_poll_status(),
            timestamp: Some(self.submitted_at),
        }
    }
}

/// Transaction lifecycle manager
///
/// Bounded in size. Entries are only removed by pruning.
pub struct LifecycleManager {
    /// Tracked transactions (handle -> lifecycle)
    transactions: Arc<DashMap<TxHandle, TransactionLifecycle>>,

    config: LifecycleConfig,

    /// Current time provider (for testing)
    current_time_fn: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl LifecycleManager {
    /// Create a new lifecycle manager
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            transactions: Arc::new(DashMap::new()),
            config,
            current_time_fn: Box::new(crate::now_millis),
        }
    }

    /// Set the current time function (for testing)
    pub fn with_time_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.current_time_fn = Box::new(f);
        self
    }

    /// Register a newly submitted transaction
    pub fn register_pending(
        &self,
        handle: TxHandle,
        function: FunctionKind,
        flow: FlowKind,
    ) -> Result<()> {
        if self.transactions.len() >= self.config.max_tracked_transactions {
            self.prune_old_transactions(self.config.max_finalized_age.as_millis() as u64);

            if self.transactions.len() >= self.config.max_tracked_transactions {
                return Err(Error::Internal(format!(
                    "Maximum tracked transactions reached: {}",
                    self.config.max_tracked_transactions
                )));
            }
        }

        let timestamp = (self.current_time_fn)();
        debug!("Tracking {} transaction {}", function, handle);
        self.transactions.insert(
            handle.clone(),
            TransactionLifecycle::new_pending(handle, function, flow, timestamp),
        );
        Ok(())
    }

    /// Record one status check
    pub fn record_poll(&self, handle: &TxHandle) -> Result<u32> {
        let mut lifecycle = self.get_mut(handle)?;
        lifecycle.polls += 1;
        Ok(lifecycle.polls)
    }

    /// Mark a transaction as finalized
    pub fn mark_finalized(&self, handle: &TxHandle) -> Result<()> {
        let timestamp = (self.current_time_fn)();
        self.get_mut(handle)?.resolve(TransactionStatus::Finalized, timestamp);
        info!("Transaction {} finalized", handle);
        Ok(())
    }

    /// Mark a transaction as rejected
    pub fn mark_rejected(&self, handle: &TxHandle, error: String) -> Result<()> {
        let timestamp = (self.current_time_fn)();
        let mut lifecycle = self.get_mut(handle)?;
        lifecycle.resolve(TransactionStatus::Rejected, timestamp);
        warn!("Transaction {} rejected: {}", handle, error);
        lifecycle.error = Some(error);
        Ok(())
    }

    /// Mark a transaction whose polling budget ran out
    pub fn mark_timed_out(&self, handle: &TxHandle) -> Result<()> {
        let timestamp = (self.current_time_fn)();
        let mut lifecycle = self.get_mut(handle)?;
        lifecycle.resolve(TransactionStatus::TimedOut, timestamp);
        warn!("Transaction {} still pending after {} checks", handle, lifecycle.polls);
        Ok(())
    }

    /// Mark a transaction the caller stopped waiting for
    pub fn mark_abandoned(&self, handle: &TxHandle) -> Result<()> {
        let timestamp = (self.current_time_fn)();
        self.get_mut(handle)?.resolve(TransactionStatus::Abandoned, timestamp);
        info!("Stopped waiting for transaction {}", handle);
        Ok(())
    }

    /// Mark `handle` abandoned only if it is still pending.
    ///
    /// Returns whether the status changed.
    pub fn abandon_if_pending(&self, handle: &TxHandle) -> bool {
        let timestamp = (self.current_time_fn)();
        match self.transactions.get_mut(handle) {
            Some(mut lifecycle) if lifecycle.status == TransactionStatus::Pending => {
                lifecycle.resolve(TransactionStatus::Abandoned, timestamp);
                true
            }
            _ => false,
        }
    }

    fn get_mut(
        &self,
        handle: &TxHandle,
    ) -> Result<dashmap::mapref::one::RefMut<'_, TxHandle, TransactionLifecycle>> {
        self.transactions
            .get_mut(handle)
            .ok_or_else(|| Error::Internal(format!("Transaction {handle} is not tracked")))
    }

    /// Get transaction status
    pub fn get_status(&self, handle: &TxHandle) -> Option<TransactionStatus> {
        self.transactions.get(handle).map(|lifecycle| lifecycle.status)
    }

    /// Get transaction lifecycle
    pub fn get_lifecycle(&self, handle: &TxHandle) -> Option<TransactionLifecycle> {
        self.transactions.get(handle).map(|lifecycle| lifecycle.clone())
    }

    /// Transactions whose ledger outcome is not yet known
    pub fn get_unresolved_transactions(&self) -> Vec<TxHandle> {
        self.transactions
            .iter()
            .filter(|entry| !entry.value().status.is_terminal())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Tracked transactions as history items, newest first
    pub fn local_history(&self) -> Vec<TransactionItem> {
        let mut entries: Vec<TransactionLifecycle> =
            self.transactions.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.handle.cmp(&a.handle))
        });
        entries.iter().map(TransactionLifecycle::to_item).collect()
    }

    /// Remove resolved transactions older than the given age (milliseconds)
    pub fn prune_old_transactions(&self, max_age_ms: u64) -> usize {
        let current_time = (self.current_time_fn)();
        let cutoff_time = current_time.saturating_sub(max_age_ms);

        let to_remove: Vec<TxHandle> = self
            .transactions
            .iter()
            .filter(|entry| {
                entry.value().status != TransactionStatus::Pending
                    && entry.value().resolved_at.map(|t| t < cutoff_time).unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect();

        let count = to_remove.len();
        for handle in to_remove {
            self.transactions.remove(&handle);
        }

        if count > 0 {
            debug!("Pruned {} old transactions", count);
        }

        count
    }

    /// Get statistics about tracked transactions
    pub fn get_statistics(&self) -> LifecycleStatistics {
        let mut stats = LifecycleStatistics::default();

        for entry in self.transactions.iter() {
            let lifecycle = entry.value();

            match lifecycle.status {
                TransactionStatus::Pending => stats.pending_count += 1,
                TransactionStatus::Finalized => stats.finalized_count += 1,
                TransactionStatus::Rejected => stats.rejected_count += 1,
                TransactionStatus::TimedOut => stats.timed_out_count += 1,
                TransactionStatus::Abandoned => stats.abandoned_count += 1,
            }

            if let Some(time) = lifecycle.total_time_ms() {
                stats.total_latency_ms += time;
                stats.latency_sample_count += 1;
            }
        }

        stats.total_count = self.transactions.len();
        stats
    }
}

/// Lifecycle statistics
#[derive(Debug, Clone, Default)]
pub struct LifecycleStatistics {
    pub total_count: usize,
    pub pending_count: usize,
    pub finalized_count: usize,
    pub rejected_count: usize,
    pub timed_out_count: usize,
    pub abandoned_count: usize,

    /// Total submit-to-outcome latency (milliseconds)
    pub total_latency_ms: u64,

    /// Number of samples for latency calculation
    pub latency_sample_count: usize,
}

impl LifecycleStatistics {
    /// Get average latency (milliseconds)
    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.latency_sample_count > 0 {
            Some(self.total_latency_ms as f64 / self.latency_sample_count as f64)
        } else {
            None
        }
    }

    /// Share of transactions with a known outcome that finalized (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        let resolved = self.finalized_count + self.rejected_count;
        if resolved > 0 {
            self.finalized_count as f64 / resolved as f64
        } else {
            0.0
        }
    }
}
