//! In-memory ledger and wallet doubles for tests

use crate::ledger::LedgerReader;
use crate::records::RawRecord;
use crate::wallet::{RawHistoryEntry, TransactionRequest, TxHandle, WalletError, WalletProvider};
use crate::{aggregator, Error, Result};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::VecDeque;
use std::result::Result as StdResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A syntactically valid 63-character account address made of `c`
pub fn address(c: char) -> String {
    format!("aleo1{}", c.to_string().repeat(58))
}

/// Route test logs through the test writer; honours `RUST_LOG`
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Ledger backed by a map of `(mapping, key) -> literal`
#[derive(Default)]
pub struct MockLedger {
    height: AtomicU64,
    values: DashMap<(String, String), String>,
    failures: DashSet<(String, String)>,
    delays: DashMap<String, Duration>,
    reads: AtomicU64,
}

impl MockLedger {
    pub fn new(height: u64) -> Self {
        let ledger = Self::default();
        ledger.set_height(height);
        ledger
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn put(&self, mapping: &str, key: &str, value: &str) {
        self.values
            .insert((mapping.to_string(), key.to_string()), value.to_string());
    }

    pub fn set_counter(&self, counter: u32) {
        self.put(aggregator::LOAN_COUNTER_MAPPING, "0u32", &format!("{counter}u32"));
    }

    /// Write all three public mappings for one loan
    pub fn put_loan(&self, loan_id: u32, owner: &str, deadline: u64, active: bool) {
        let key = format!("{loan_id}u32");
        self.put(aggregator::LOAN_ACTIVE_MAPPING, &key, &active.to_string());
        self.put(aggregator::LOAN_OWNER_MAPPING, &key, owner);
        self.put(aggregator::LOAN_DEADLINE_MAPPING, &key, &format!("{deadline}u32"));
    }

    /// Make reads of `(mapping, key)` fail
    pub fn fail(&self, mapping: &str, key: &str) {
        self.failures.insert((mapping.to_string(), key.to_string()));
    }

    pub fn heal(&self, mapping: &str, key: &str) {
        self.failures.remove(&(mapping.to_string(), key.to_string()));
    }

    /// Delay every mapping read for `key`
    pub fn delay(&self, key: &str, delay: Duration) {
        self.delays.insert(key.to_string(), delay);
    }

    pub fn clear_delay(&self, key: &str) {
        self.delays.remove(key);
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerReader for MockLedger {
    async fn latest_height(&self) -> Result<u64> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn mapping_value(&self, mapping: &str, key: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.get(key).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let id = (mapping.to_string(), key.to_string());
        if self.failures.contains(&id) {
            return Err(Error::ReadFailure(format!("injected failure for {mapping}/{key}")));
        }
        Ok(self.values.get(&id).map(|v| v.clone()))
    }
}

/// Wallet that hands out sequential handles and replays scripted statuses
pub struct ScriptedWallet {
    next_handle: AtomicU64,
    submitted: Mutex<Vec<TransactionRequest>>,
    rejections: Mutex<VecDeque<String>>,
    records: Mutex<Vec<RawRecord>>,
    records_error: Mutex<Option<String>>,
    statuses: DashMap<TxHandle, VecDeque<StdResult<String, WalletError>>>,
    default_status: Mutex<String>,
    status_calls: DashMap<TxHandle, u32>,
    history: Mutex<StdResult<Vec<RawHistoryEntry>, String>>,
}

impl Default for ScriptedWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedWallet {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            submitted: Mutex::new(Vec::new()),
            rejections: Mutex::new(VecDeque::new()),
            records: Mutex::new(Vec::new()),
            records_error: Mutex::new(None),
            statuses: DashMap::new(),
            default_status: Mutex::new("Pending".to_string()),
            status_calls: DashMap::new(),
            history: Mutex::new(Ok(Vec::new())),
        }
    }

    /// Handle the `n`th submission (1-based) will receive
    pub fn handle(n: u64) -> TxHandle {
        TxHandle::new(format!("at{n}"))
    }

    /// Status text returned once a handle's script runs out
    pub fn set_default_status(&self, status: &str) {
        *self.default_status.lock().unwrap() = status.to_string();
    }

    /// Statuses returned, in order, for `handle`
    pub fn script(&self, handle: TxHandle, statuses: &[&str]) {
        self.script_results(handle, statuses.iter().map(|s| Ok(s.to_string())).collect());
    }

    pub fn script_results(&self, handle: TxHandle, results: Vec<StdResult<String, WalletError>>) {
        self.statuses.entry(handle).or_default().extend(results);
    }

    pub fn reject_next_submit(&self, reason: &str) {
        self.rejections.lock().unwrap().push_back(reason.to_string());
    }

    pub fn add_record(&self, value: serde_json::Value) {
        let record: RawRecord = serde_json::from_value(value).unwrap();
        self.records.lock().unwrap().push(record);
    }

    pub fn fail_records(&self, reason: &str) {
        *self.records_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn set_history(&self, entries: Vec<RawHistoryEntry>) {
        *self.history.lock().unwrap() = Ok(entries);
    }

    pub fn fail_history(&self, reason: &str) {
        *self.history.lock().unwrap() = Err(reason.to_string());
    }

    pub fn submitted(&self) -> Vec<TransactionRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_functions(&self) -> Vec<String> {
        self.submitted().into_iter().map(|r| r.function).collect()
    }

    pub fn status_calls(&self, handle: &TxHandle) -> u32 {
        self.status_calls.get(handle).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn submit(&self, request: &TransactionRequest) -> StdResult<TxHandle, WalletError> {
        if let Some(reason) = self.rejections.lock().unwrap().pop_front() {
            return Err(WalletError::Rejected(reason));
        }
        self.submitted.lock().unwrap().push(request.clone());
        Ok(Self::handle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    async fn status(&self, handle: &TxHandle) -> StdResult<String, WalletError> {
        *self.status_calls.entry(handle.clone()).or_insert(0) += 1;
        let scripted = self.statuses.get_mut(handle).and_then(|mut q| q.pop_front());
        match scripted {
            Some(result) => result,
            None => Ok(self.default_status.lock().unwrap().clone()),
        }
    }

    async fn list_records(&self, _program: &str) -> StdResult<Vec<RawRecord>, WalletError> {
        if let Some(reason) = self.records_error.lock().unwrap().clone() {
            return Err(WalletError::Unavailable(reason));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn transaction_history(
        &self,
        _program: &str,
    ) -> StdResult<Vec<RawHistoryEntry>, WalletError> {
        self.history
            .lock()
            .unwrap()
            .clone()
            .map_err(WalletError::Unavailable)
    }
}
