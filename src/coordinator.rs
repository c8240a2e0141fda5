//! Lending coordinator
//!
//! Wires the read side (ledger client, aggregator, session store) to the
//! write side (orchestrator) so completed flows refresh the session view.

use crate::aggregator::LedgerAggregator;
use crate::config::CoordinatorConfig;
use crate::ledger::{HttpLedgerClient, LedgerReader};
use crate::orchestrator::TransactionOrchestrator;
use crate::session::{SessionStore, SessionView};
use crate::wallet::WalletProvider;
use crate::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Coordinator over the HTTP ledger client
pub type HttpLendingCoordinator<W> = LendingCoordinator<W, HttpLedgerClient>;

/// Everything a client session needs, built from one configuration
pub struct LendingCoordinator<W, L> {
    config: CoordinatorConfig,
    aggregator: Arc<LedgerAggregator<L>>,
    session: Arc<SessionStore<L>>,
    orchestrator: Arc<TransactionOrchestrator<W, L>>,
}

impl<W> LendingCoordinator<W, HttpLedgerClient>
where
    W: WalletProvider + 'static,
{
    /// Build a coordinator reading the ledger over HTTP
    pub fn connect(config: CoordinatorConfig, wallet: Arc<W>) -> Result<Self> {
        let reader = Arc::new(HttpLedgerClient::new(config.ledger.clone())?);
        Ok(Self::new(config, wallet, reader))
    }
}

impl<W, L> LendingCoordinator<W, L>
where
    W: WalletProvider + 'static,
    L: LedgerReader + 'static,
{
    /// Create a new coordinator
    pub fn new(config: CoordinatorConfig, wallet: Arc<W>, reader: Arc<L>) -> Self {
        let aggregator = Arc::new(LedgerAggregator::new(reader, config.aggregator.clone()));
        let session = Arc::new(SessionStore::new(aggregator.clone(), config.session.clone()));
        let orchestrator = TransactionOrchestrator::new(&config, wallet, aggregator.clone())
            .with_refresh_hook(session.clone());

        Self {
            config,
            aggregator,
            session,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &Arc<LedgerAggregator<L>> {
        &self.aggregator
    }

    pub fn session(&self) -> &Arc<SessionStore<L>> {
        &self.session
    }

    pub fn orchestrator(&self) -> &Arc<TransactionOrchestrator<W, L>> {
        &self.orchestrator
    }

    /// Switch the connected account and refresh the view for it
    pub async fn set_account(&self, account: Option<String>) -> Result<Arc<SessionView>> {
        self.session.set_account(account);
        self.session.refresh().await
    }

    /// Start the periodic session refresh and the lifecycle cleanup task
    pub fn start_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let handles = vec![
            self.session.clone().spawn_periodic_refresh(),
            self.orchestrator.clone().start_background_tasks(),
        ];
        info!("Lending coordinator background tasks started");
        handles
    }
}
