//! Transaction orchestrator
//!
//! Drives flow plans through the flow state machine: submits each step,
//! polls the wallet until the step finalizes, is rejected, or runs out of
//! attempts, and only then moves to the next step. Completed flows trigger a
//! refresh of the aggregated ledger view.

use crate::aggregator::LedgerAggregator;
use crate::config::{CoordinatorConfig, LifecycleConfig, OrchestratorConfig};
use crate::flow::{FlowEvent, FlowMachine, FlowState, PollOutcome, StepFailure};
use crate::history::{load_history, TransactionItem};
use crate::ledger::LedgerReader;
use crate::lifecycle::{LifecycleManager, LifecycleStatistics, TransactionStatus};
use crate::records::decode_records;
use crate::selector::{select, RecordPredicate};
use crate::submission::SubmissionHandler;
use crate::transaction::{
    plan_liquidate, plan_open_credit_profile, plan_open_loan, plan_repay, random_field_nonce,
    FlowKind, FlowPlan, FunctionKind, LoanTerms,
};
use crate::types::{CreditTier, LoanId};
use crate::wallet::{classify_status, PollStatus, TxHandle, WalletProvider};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Called after a flow completes so read-side state can catch up
#[async_trait]
pub trait RefreshHook: Send + Sync {
    async fn on_flow_completed(&self, kind: FlowKind);
}

/// Receiving half of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the canceller was dropped
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Sending half of a cancellation pair.
///
/// Cancelling before a step is broadcast ends the flow with
/// [`Error::Cancelled`]. Cancelling while a step awaits finalization only
/// stops the polling: the flow ends with [`Error::Abandoned`] and the
/// transaction may still finalize.
#[derive(Debug)]
pub struct FlowCanceller {
    tx: watch::Sender<bool>,
}

impl FlowCanceller {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Tracks which flow kinds currently have a flow running
#[derive(Debug, Clone, Default)]
pub struct FlightTracker {
    in_flight: Arc<DashSet<FlowKind>>,
}

impl FlightTracker {
    /// Claim `kind`; fails while another guard for it is alive
    pub fn acquire(&self, kind: FlowKind) -> Result<FlightGuard> {
        if !self.in_flight.insert(kind) {
            return Err(Error::FlowInFlight(kind.to_string()));
        }
        Ok(FlightGuard {
            kind,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn is_in_flight(&self, kind: FlowKind) -> bool {
        self.in_flight.contains(&kind)
    }
}

/// Held while a flow of one kind runs; released on drop
#[derive(Debug)]
pub struct FlightGuard {
    kind: FlowKind,
    in_flight: Arc<DashSet<FlowKind>>,
}

impl FlightGuard {
    pub fn kind(&self) -> FlowKind {
        self.kind
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.kind);
    }
}

/// Marks the watched transaction `Abandoned` when a flow is dropped while
/// the transaction is still pending
struct PendingWatch {
    manager: Arc<LifecycleManager>,
    handle: Option<TxHandle>,
}

impl PendingWatch {
    fn new(manager: Arc<LifecycleManager>) -> Self {
        Self {
            manager,
            handle: None,
        }
    }

    fn watch(&mut self, handle: TxHandle) {
        self.handle = Some(handle);
    }
}

impl Drop for PendingWatch {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if self.manager.abandon_if_pending(&handle) {
                warn!("Flow dropped while {} was pending", handle);
            }
        }
    }
}

/// One finalized step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReceipt {
    pub function: FunctionKind,
    pub tx: TxHandle,

    /// Status checks until finalization
    pub polls: u32,
}

/// Outcome of a completed flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowReceipt {
    pub kind: FlowKind,
    pub steps: Vec<StepReceipt>,
}

impl FlowReceipt {
    /// Handle of the last finalized transaction
    pub fn final_tx(&self) -> Option<&TxHandle> {
        self.steps.last().map(|s| &s.tx)
    }
}

/// Transaction orchestrator
///
/// Stateless per flow: every call to [`execute`](Self::execute) runs its own
/// state machine. Concurrent flows of the same kind are refused through the
/// flight tracker.
pub struct TransactionOrchestrator<W, L> {
    config: OrchestratorConfig,

    lifecycle_config: LifecycleConfig,

    wallet: Arc<W>,

    aggregator: Arc<LedgerAggregator<L>>,

    submission_handler: SubmissionHandler<W>,

    lifecycle_manager: Arc<LifecycleManager>,

    flights: FlightTracker,

    refresh_hook: Option<Arc<dyn RefreshHook>>,
}

impl<W, L> TransactionOrchestrator<W, L>
where
    W: WalletProvider + 'static,
    L: LedgerReader + 'static,
{
    /// Create a new orchestrator
    pub fn new(
        config: &CoordinatorConfig,
        wallet: Arc<W>,
        aggregator: Arc<LedgerAggregator<L>>,
    ) -> Self {
        let program_id = config.ledger.program_id.clone();
        Self {
            config: config.orchestrator.clone(),
            lifecycle_config: config.lifecycle.clone(),
            submission_handler: SubmissionHandler::new(wallet.clone(), program_id),
            wallet,
            aggregator,
            lifecycle_manager: Arc::new(LifecycleManager::new(config.lifecycle.clone())),
            flights: FlightTracker::default(),
            refresh_hook: None,
        }
    }

    /// Refresh read-side state after every completed flow
    pub fn with_refresh_hook(mut self, hook: Arc<dyn RefreshHook>) -> Self {
        self.refresh_hook = Some(hook);
        self
    }

    /// Replace the lifecycle manager (for testing)
    pub fn with_lifecycle_manager(mut self, manager: Arc<LifecycleManager>) -> Self {
        self.lifecycle_manager = manager;
        self
    }

    pub fn program_id(&self) -> &str {
        self.submission_handler.program_id()
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle_manager
    }

    pub fn flights(&self) -> &FlightTracker {
        &self.flights
    }

    /// Run a plan to completion
    pub async fn execute(&self, plan: FlowPlan) -> Result<FlowReceipt> {
        self.execute_cancellable(plan, CancelSignal::never()).await
    }

    /// Run a plan to completion unless `cancel` fires first.
    ///
    /// Dropping the returned future stops waiting like a cancellation: a
    /// transaction still pending is tracked as `Abandoned`.
    pub async fn execute_cancellable(
        &self,
        plan: FlowPlan,
        mut cancel: CancelSignal,
    ) -> Result<FlowReceipt> {
        plan.validate()?;
        let _guard = self.flights.acquire(plan.kind)?;
        let mut pending = PendingWatch::new(self.lifecycle_manager.clone());

        info!("Starting {} flow with {} steps", plan.kind, plan.steps.len());
        let mut machine = FlowMachine::new(plan.steps.len(), self.config.max_poll_attempts);
        let mut receipts = Vec::with_capacity(plan.steps.len());
        machine.apply(FlowEvent::Advance)?;

        loop {
            match machine.state().clone() {
                FlowState::Submitting { step } => {
                    if cancel.is_cancelled() {
                        machine.apply(FlowEvent::Cancel)?;
                        continue;
                    }

                    let function = plan.steps[step].function;
                    let event = match self.submission_handler.submit_step(&plan.steps[step]).await {
                        Ok(submitted) => {
                            self.track(self.lifecycle_manager.register_pending(
                                submitted.handle.clone(),
                                function,
                                plan.kind,
                            ));
                            pending.watch(submitted.handle.clone());
                            FlowEvent::Submitted(submitted.handle)
                        }
                        Err(e @ Error::ValidationFailed(_)) => return Err(e),
                        Err(Error::InputUnavailable(reason)) => FlowEvent::InputMissing(reason),
                        Err(Error::SubmissionRejected(reason)) => FlowEvent::SubmitFailed(reason),
                        Err(e) => FlowEvent::SubmitFailed(e.to_string()),
                    };
                    machine.apply(event)?;
                }

                FlowState::AwaitingFinalization { tx, .. } => {
                    let event = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => FlowEvent::Cancel,
                        outcome = self.poll_once(&tx) => FlowEvent::Polled(outcome),
                    };

                    match machine.apply(event)? {
                        FlowState::StepSucceeded { tx, .. } => {
                            self.track(self.lifecycle_manager.mark_finalized(tx))
                        }
                        FlowState::StepFailed { failure, .. } => self.track_failure(failure),
                        _ => {}
                    }
                }

                FlowState::StepSucceeded { step, tx, polls } => {
                    receipts.push(StepReceipt {
                        function: plan.steps[step].function,
                        tx,
                        polls,
                    });
                    machine.apply(FlowEvent::Advance)?;
                }

                FlowState::StepFailed { .. } => {
                    machine.apply(FlowEvent::Advance)?;
                }

                FlowState::FlowCompleted => {
                    info!("{} flow completed", plan.kind);
                    self.notify_refresh(plan.kind).await;
                    return Ok(FlowReceipt {
                        kind: plan.kind,
                        steps: receipts,
                    });
                }

                FlowState::FlowFailed { step, failure } => {
                    warn!("{} flow failed at step {}: {:?}", plan.kind, step, failure);
                    return Err(failure.into_error(step));
                }

                FlowState::Idle => {
                    return Err(Error::Internal("flow machine did not leave Idle".to_string()));
                }
            }
        }
    }

    /// Wait one interval, then check status once.
    ///
    /// Wallet errors count as pending.
    async fn poll_once(&self, tx: &TxHandle) -> PollOutcome {
        tokio::time::sleep(self.config.poll_interval).await;
        if let Ok(polls) = self.lifecycle_manager.record_poll(tx) {
            debug!("Status check {} for {}", polls, tx);
        }

        match self.wallet.status(tx).await {
            Ok(raw) => {
                let status = classify_status(&raw);
                debug!("Transaction {} status {:?} ({})", tx, status, raw);
                PollOutcome::from_status(status, &raw)
            }
            Err(e) => {
                warn!("Status check for {} failed, counting as pending: {}", tx, e);
                PollOutcome::Pending
            }
        }
    }

    fn track_failure(&self, failure: &StepFailure) {
        match failure {
            StepFailure::Rejected { tx, reason } => {
                self.track(self.lifecycle_manager.mark_rejected(tx, reason.clone()))
            }
            StepFailure::TimedOut { tx, .. } => {
                self.track(self.lifecycle_manager.mark_timed_out(tx))
            }
            StepFailure::Abandoned { tx } => {
                self.track(self.lifecycle_manager.mark_abandoned(tx))
            }
            _ => {}
        }
    }

    /// Tracking is bookkeeping; it never fails a flow
    fn track(&self, result: Result<()>) {
        if let Err(e) = result {
            warn!("Lifecycle tracking failed: {}", e);
        }
    }

    /// Run the refresh hook, waiting at most `refresh_timeout` for it.
    ///
    /// A refresh still running at the deadline keeps running on its own task.
    async fn notify_refresh(&self, kind: FlowKind) {
        let Some(hook) = self.refresh_hook.clone() else {
            return;
        };

        let refresh = tokio::spawn(async move { hook.on_flow_completed(kind).await });
        match tokio::time::timeout(self.config.refresh_timeout, refresh).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Refresh after {} flow failed: {}", kind, e),
            Err(_) => warn!(
                "Refresh after {} flow still running after {:?}; not waiting for it",
                kind, self.config.refresh_timeout
            ),
        }
    }

    /// Plan for a new credit tier record
    pub fn prepare_open_credit_profile(&self, tier: CreditTier) -> FlowPlan {
        plan_open_credit_profile(tier, random_field_nonce())
    }

    /// Plan for a new loan.
    ///
    /// The loan id is the current counter plus one and the start height is
    /// the current ledger height, both read now. Another borrower finalizing
    /// first makes the program reject the creation step.
    pub async fn prepare_open_loan(&self, borrower: &str, terms: &LoanTerms) -> Result<FlowPlan> {
        terms.validate()?;

        let (height, counter) = tokio::join!(
            self.aggregator.latest_height(),
            self.aggregator.loan_counter()
        );
        let (height, counter) = (height?, counter?);

        let loan_id = counter
            .checked_add(1)
            .ok_or_else(|| Error::Internal("loan counter exhausted".to_string()))?;
        let start_height = u32::try_from(height)
            .map_err(|_| Error::MalformedResponse(format!("height {height} does not fit in u32")))?;

        debug!("Preparing loan {} at height {}", loan_id, start_height);
        plan_open_loan(loan_id, start_height, borrower, terms)
    }

    /// Plan repaying `loan_id` in full.
    ///
    /// The open loan record is read now to compute the total due; the
    /// repayment step selects it again when submitted.
    pub async fn prepare_repay(&self, loan_id: LoanId) -> Result<FlowPlan> {
        let raw = self
            .wallet
            .list_records(self.program_id())
            .await
            .map_err(|e| Error::InputUnavailable(format!("could not list wallet records: {e}")))?;
        let records = decode_records(&raw);

        let predicate = RecordPredicate::open_loan(loan_id);
        let record = select(&records, &predicate)
            .ok_or_else(|| Error::InputUnavailable(format!("no {} found", predicate.describe())))?;
        let loan = record
            .as_loan()
            .ok_or_else(|| Error::Internal(format!("record {} is not a loan", record.id)))?;

        Ok(plan_repay(loan))
    }

    /// Plan liquidating `loan_id`.
    ///
    /// Refuses loans whose public view shows they are not liquidatable. When
    /// the view cannot be read the plan is built anyway and the program has
    /// the final word.
    pub async fn prepare_liquidate(&self, loan_id: LoanId) -> Result<FlowPlan> {
        let (height, loan) = tokio::join!(
            self.aggregator.latest_height(),
            self.aggregator.fetch_loan(loan_id)
        );

        match (height, loan) {
            (Ok(height), Ok(Some(loan))) if !loan.is_liquidatable(height) => {
                return Err(Error::ValidationFailed(format!(
                    "loan #{loan_id} is {} at height {height} (deadline {})",
                    loan.status(height),
                    loan.deadline
                )));
            }
            (Ok(_), Ok(Some(_))) => {}
            (height, loan) => {
                let reason = height.err().or(loan.err()).map(|e| e.to_string());
                debug!(
                    "Liquidation pre-check for loan {} skipped: {}",
                    loan_id,
                    reason.as_deref().unwrap_or("loan not registered")
                );
            }
        }

        Ok(plan_liquidate(loan_id))
    }

    /// Create a credit tier record
    pub async fn open_credit_profile(&self, tier: CreditTier) -> Result<FlowReceipt> {
        self.execute(self.prepare_open_credit_profile(tier)).await
    }

    /// Create and register a loan
    pub async fn open_loan(&self, borrower: &str, terms: &LoanTerms) -> Result<FlowReceipt> {
        self.execute(self.prepare_open_loan(borrower, terms).await?).await
    }

    /// Repay a loan and mark it settled
    pub async fn repay(&self, loan_id: LoanId) -> Result<FlowReceipt> {
        self.execute(self.prepare_repay(loan_id).await?).await
    }

    /// Liquidate an expired loan
    pub async fn liquidate(&self, loan_id: LoanId) -> Result<FlowReceipt> {
        self.execute(self.prepare_liquidate(loan_id).await?).await
    }

    /// Check each timed-out or abandoned transaction once.
    ///
    /// Returns how many reached a final outcome.
    pub async fn reconcile_unresolved(&self) -> usize {
        let candidates: Vec<TxHandle> = self
            .lifecycle_manager
            .get_unresolved_transactions()
            .into_iter()
            .filter(|h| {
                matches!(
                    self.lifecycle_manager.get_status(h),
                    Some(TransactionStatus::TimedOut | TransactionStatus::Abandoned)
                )
            })
            .collect();

        let mut resolved = 0;
        for handle in candidates {
            let raw = match self.wallet.status(&handle).await {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("Reconcile check for {} failed: {}", handle, e);
                    continue;
                }
            };

            match classify_status(&raw) {
                PollStatus::Finalized => {
                    self.track(self.lifecycle_manager.mark_finalized(&handle));
                    resolved += 1;
                    if let Some(lifecycle) = self.lifecycle_manager.get_lifecycle(&handle) {
                        self.notify_refresh(lifecycle.flow).await;
                    }
                }
                PollStatus::Rejected => {
                    self.track(self.lifecycle_manager.mark_rejected(&handle, raw));
                    resolved += 1;
                }
                PollStatus::Pending => {}
            }
        }

        if resolved > 0 {
            info!("Reconciled {} transactions", resolved);
        }
        resolved
    }

    /// Prune old entries and reconcile unresolved transactions
    pub async fn run_cleanup(&self) -> Result<()> {
        debug!("Running cleanup tasks");

        let pruned = self
            .lifecycle_manager
            .prune_old_transactions(self.lifecycle_config.max_finalized_age.as_millis() as u64);
        if pruned > 0 {
            info!("Pruned {} old transactions", pruned);
        }

        self.reconcile_unresolved().await;
        Ok(())
    }

    /// Start the orchestrator background tasks
    pub fn start_background_tasks(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(orchestrator.lifecycle_config.cleanup_interval).await;

                if let Err(e) = orchestrator.run_cleanup().await {
                    error!("Error running cleanup: {}", e);
                }
            }
        });

        info!("Transaction orchestrator background tasks started");
        handle
    }

    /// The wallet's history for this program, newest first
    pub async fn history(&self) -> Vec<TransactionItem> {
        load_history(self.wallet.as_ref(), self.program_id()).await
    }

    /// Transactions submitted through this orchestrator, newest first
    pub fn local_history(&self) -> Vec<TransactionItem> {
        self.lifecycle_manager.local_history()
    }

    /// Get orchestrator statistics
    pub fn get_statistics(&self) -> LifecycleStatistics {
        self.lifecycle_manager.get_statistics()
    }
}
