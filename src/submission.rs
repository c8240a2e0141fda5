//! Transaction step submission
//!
//! Resolves a step's inputs, validates it, and hands it to the wallet.
//! Nothing is submitted when a required record cannot be resolved.

use crate::records::decode_records;
use crate::selector::select;
use crate::transaction::{FunctionKind, StepInput, TransactionStep};
use crate::wallet::{TransactionRequest, TxHandle, WalletProvider};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of submitting one step
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    /// Wallet handle of the broadcast transaction
    pub handle: TxHandle,

    pub function: FunctionKind,

    /// Submission timestamp (Unix milliseconds)
    pub timestamp: u64,
}

impl SubmissionResult {
    pub fn new(handle: TxHandle, function: FunctionKind, timestamp: u64) -> Self {
        Self {
            handle,
            function,
            timestamp,
        }
    }
}

/// Transaction submission handler
///
/// Turns planned steps into wallet requests against one program.
pub struct SubmissionHandler<W> {
    wallet: Arc<W>,

    program_id: String,

    /// Current time provider (for testing)
    current_time_fn: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl<W: WalletProvider> SubmissionHandler<W> {
    /// Create a new submission handler
    pub fn new(wallet: Arc<W>, program_id: impl Into<String>) -> Self {
        Self {
            wallet,
            program_id: program_id.into(),
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

    pub fn program_id(&self) -> &str {
        &self.program_id
    }

    /// Submit one step.
    ///
    /// 1. Validate the step against the fee schedule
    /// 2. Resolve record inputs through the selector
    /// 3. Hand the request to the wallet
    pub async fn submit_step(&self, step: &TransactionStep) -> Result<SubmissionResult> {
        let start = std::time::Instant::now();

        self.validate_step(step)?;
        let inputs = self.resolve_inputs(step).await?;

        let request = TransactionRequest {
            program: self.program_id.clone(),
            function: step.function.function_name().to_string(),
            inputs,
            fee: step.fee,
            private_fee: false,
        };
        debug!("Submitting {} with {} inputs", request.function, request.inputs.len());

        let handle = self.wallet.submit(&request).await.map_err(|e| {
            warn!("Wallet refused {}: {}", request.function, e);
            Error::SubmissionRejected(e.to_string())
        })?;

        info!(
            "Submitted {} as {} in {:?}",
            step.function,
            handle,
            start.elapsed()
        );

        Ok(SubmissionResult::new(handle, step.function, (self.current_time_fn)()))
    }

    fn validate_step(&self, step: &TransactionStep) -> Result<()> {
        if step.fee != step.function.fee() {
            return Err(Error::ValidationFailed(format!(
                "{} fee must be {} microcredits, got {}",
                step.function,
                step.function.fee(),
                step.fee
            )));
        }
        if step.inputs.is_empty() {
            return Err(Error::ValidationFailed(format!("{} has no inputs", step.function)));
        }
        Ok(())
    }

    /// Replace record references with the selected record's handle.
    ///
    /// Records are listed once per step, and only when the step needs one.
    async fn resolve_inputs(&self, step: &TransactionStep) -> Result<Vec<String>> {
        let needs_records = step.inputs.iter().any(|i| matches!(i, StepInput::Record(_)));
        let records = if needs_records {
            let raw = self
                .wallet
                .list_records(&self.program_id)
                .await
                .map_err(|e| {
                    Error::InputUnavailable(format!("could not list wallet records: {e}"))
                })?;
            decode_records(&raw)
        } else {
            Vec::new()
        };

        step.inputs
            .iter()
            .map(|input| match input {
                StepInput::Literal(value) => Ok(value.clone()),
                StepInput::Record(predicate) => select(&records, predicate)
                    .map(|r| r.id.clone())
                    .ok_or_else(|| {
                        Error::InputUnavailable(format!("no {} found", predicate.describe()))
                    }),
            })
            .collect()
    }
}
