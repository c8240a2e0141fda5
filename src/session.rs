//! Session state store
//!
//! Holds the latest aggregated ledger view for presentation code. The view
//! is an immutable value behind a watch channel and is only ever replaced
//! whole, so readers never observe a half-updated view.
//!
//! Refreshes may overlap (the periodic task and post-flow refreshes). Each
//! refresh takes a sequence number when it starts, and a finished refresh
//! only lands if no later-started refresh has landed first.

use crate::aggregator::{LedgerAggregator, LedgerSnapshot, ScanIssue};
use crate::config::SessionConfig;
use crate::ledger::LedgerReader;
use crate::literal::literals_equal;
use crate::orchestrator::RefreshHook;
use crate::transaction::FlowKind;
use crate::types::{LoanPublic, NetworkStats};
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One consistent view of the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    /// Refresh sequence number; zero before the first refresh
    pub seq: u64,

    pub height: u64,
    pub loan_counter: u32,

    /// Account the per-user view was filtered for
    pub account: Option<String>,

    pub all_loans: Vec<LoanPublic>,
    pub user_loans: Vec<LoanPublic>,
    pub liquidatable_loans: Vec<LoanPublic>,
    pub stats: NetworkStats,

    /// Identifiers left out of this view
    pub issues: Vec<ScanIssue>,

    /// Unix milliseconds
    pub refreshed_at: u64,
}

impl SessionView {
    fn from_snapshot(
        seq: u64,
        snapshot: LedgerSnapshot,
        account: Option<String>,
        refreshed_at: u64,
    ) -> Self {
        let stats = snapshot.stats();
        let liquidatable_loans = snapshot.liquidatable_loans();
        let user_loans = user_loans(&snapshot.loans, account.as_deref());

        Self {
            seq,
            height: snapshot.height,
            loan_counter: snapshot.loan_counter,
            account,
            all_loans: snapshot.loans,
            user_loans,
            liquidatable_loans,
            stats,
            issues: snapshot.issues,
            refreshed_at,
        }
    }
}

fn user_loans(loans: &[LoanPublic], account: Option<&str>) -> Vec<LoanPublic> {
    match account {
        Some(account) => loans
            .iter()
            .filter(|loan| literals_equal(&loan.owner, account))
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

/// Session state store
pub struct SessionStore<L> {
    aggregator: Arc<LedgerAggregator<L>>,

    config: SessionConfig,

    view: watch::Sender<Arc<SessionView>>,

    account: watch::Sender<Option<String>>,

    next_seq: AtomicU64,
}

impl<L: LedgerReader + 'static> SessionStore<L> {
    /// Create a store holding an empty view
    pub fn new(aggregator: Arc<LedgerAggregator<L>>, config: SessionConfig) -> Self {
        let (view, _) = watch::channel(Arc::new(SessionView::default()));
        let (account, _) = watch::channel(None);
        Self {
            aggregator,
            config,
            view,
            account,
            next_seq: AtomicU64::new(0),
        }
    }

    /// The latest view
    pub fn current(&self) -> Arc<SessionView> {
        self.view.borrow().clone()
    }

    /// Receiver notified on every replacement
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionView>> {
        self.view.subscribe()
    }

    /// Switch the connected account.
    ///
    /// The current view is replaced by one filtered for the new account;
    /// ledger data is not re-read.
    pub fn set_account(&self, account: Option<String>) {
        self.account.send_replace(account.clone());
        self.view.send_modify(|view| {
            let mut next = (**view).clone();
            next.user_loans = user_loans(&next.all_loans, account.as_deref());
            next.account = account;
            *view = Arc::new(next);
        });
    }

    pub fn account(&self) -> Option<String> {
        self.account.borrow().clone()
    }

    /// Re-scan the ledger and replace the view.
    ///
    /// On failure the previous view stays in place. Returns the view current
    /// after this refresh, which may come from a refresh started later.
    pub async fn refresh(&self) -> Result<Arc<SessionView>> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let snapshot = match self.aggregator.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Session refresh {} failed, keeping previous view: {}", seq, e);
                return Err(e);
            }
        };

        let refreshed_at = crate::now_millis();
        let landed = self.view.send_if_modified(|view| {
            if view.seq >= seq {
                return false;
            }
            // read at replacement time so a concurrent account switch is kept
            let account = self.account.borrow().clone();
            *view = Arc::new(SessionView::from_snapshot(seq, snapshot, account, refreshed_at));
            true
        });

        if landed {
            debug!("Session view {} replaced", seq);
        } else {
            debug!("Session refresh {} superseded by a newer view", seq);
        }
        Ok(self.current())
    }

    /// Refresh on the configured cadence, starting immediately
    pub fn spawn_periodic_refresh(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = self.config.refresh_interval;
        info!("Session refresh every {:?}", period);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // failures are logged by refresh; the previous view stays
                let _ = self.refresh().await;
            }
        })
    }
}

#[async_trait]
impl<L: LedgerReader + 'static> RefreshHook for SessionStore<L> {
    async fn on_flow_completed(&self, kind: FlowKind) {
        debug!("Refreshing session after {} flow", kind);
        let _ = self.refresh().await;
    }
}
