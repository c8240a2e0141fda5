//! Coordinator configuration
//!
//! Every struct has a `Default` matching the reference dashboard and a
//! `from_env()` constructor that overrides fields from `PRIVLEND_*`
//! environment variables. Unset or unparsable variables fall back to the
//! default.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default public ledger API endpoint
pub const DEFAULT_API_ENDPOINT: &str = "https://api.explorer.provable.com/v2";

/// Default lending program identifier
pub const DEFAULT_PROGRAM_ID: &str = "privlend.aleo";

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Ledger read endpoint configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL of the public ledger API
    pub base_url: String,

    /// Network path segment (e.g. `testnet`)
    pub network: String,

    /// Program whose mappings are read
    pub program_id: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_ENDPOINT.to_string(),
            network: "testnet".to_string(),
            program_id: DEFAULT_PROGRAM_ID.to_string(),
            timeout_secs: 30,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - PRIVLEND_API_ENDPOINT: ledger API base URL
    /// - PRIVLEND_NETWORK: network path segment
    /// - PRIVLEND_PROGRAM_ID: program identifier
    /// - PRIVLEND_HTTP_TIMEOUT_SECS: request timeout in seconds
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("PRIVLEND_API_ENDPOINT").unwrap_or(defaults.base_url),
            network: env::var("PRIVLEND_NETWORK").unwrap_or(defaults.network),
            program_id: env::var("PRIVLEND_PROGRAM_ID").unwrap_or(defaults.program_id),
            timeout_secs: env_or("PRIVLEND_HTTP_TIMEOUT_SECS", defaults.timeout_secs),
        }
    }
}

/// Transaction orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay between finalization status checks
    pub poll_interval: Duration,

    /// Status checks per step before the step times out
    pub max_poll_attempts: u32,

    /// Longest a completed flow waits for the read-side refresh
    pub refresh_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(3_000),
            max_poll_attempts: 20, // ~60s per step
            refresh_timeout: Duration::from_secs(10),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - PRIVLEND_POLL_INTERVAL_MS
    /// - PRIVLEND_MAX_POLL_ATTEMPTS
    /// - PRIVLEND_REFRESH_TIMEOUT_MS
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_millis(env_or(
                "PRIVLEND_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            max_poll_attempts: env_or("PRIVLEND_MAX_POLL_ATTEMPTS", defaults.max_poll_attempts)
                .max(1),
            refresh_timeout: Duration::from_millis(env_or(
                "PRIVLEND_REFRESH_TIMEOUT_MS",
                defaults.refresh_timeout.as_millis() as u64,
            )),
        }
    }

    /// Upper bound on time spent waiting for one step to finalize
    pub fn step_timeout(&self) -> Duration {
        self.poll_interval * self.max_poll_attempts
    }
}

/// Ledger state aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Loan identifiers read concurrently during a scan
    pub max_concurrent_reads: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reads: 16,
        }
    }
}

impl AggregatorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - PRIVLEND_MAX_CONCURRENT_READS
    pub fn from_env() -> Self {
        Self {
            max_concurrent_reads: env_or(
                "PRIVLEND_MAX_CONCURRENT_READS",
                Self::default().max_concurrent_reads,
            )
            .max(1),
        }
    }
}

/// Session state store configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cadence of the background refresh task
    pub refresh_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(20),
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - PRIVLEND_REFRESH_INTERVAL_SECS
    pub fn from_env() -> Self {
        Self {
            refresh_interval: Duration::from_secs(env_or(
                "PRIVLEND_REFRESH_INTERVAL_SECS",
                Self::default().refresh_interval.as_secs(),
            )),
        }
    }
}

/// Transaction lifecycle tracking configuration
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Maximum number of transactions to track
    pub max_tracked_transactions: usize,

    /// Age after which resolved transactions are pruned
    pub max_finalized_age: Duration,

    /// Cadence of the background cleanup and reconciliation task
    pub cleanup_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_tracked_transactions: 10_000,
            max_finalized_age: Duration::from_secs(3_600), // 1 hour
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Complete coordinator configuration
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    pub ledger: LedgerConfig,
    pub orchestrator: OrchestratorConfig,
    pub aggregator: AggregatorConfig,
    pub session: SessionConfig,
    pub lifecycle: LifecycleConfig,
}

impl CoordinatorConfig {
    /// Load every section from environment variables
    pub fn from_env() -> Self {
        Self {
            ledger: LedgerConfig::from_env(),
            orchestrator: OrchestratorConfig::from_env(),
            aggregator: AggregatorConfig::from_env(),
            session: SessionConfig::from_env(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}
