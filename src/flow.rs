//! Per-flow state machine
//!
//! States and transitions of one flow instance, kept free of I/O so that
//! synthetic status sequences can drive it in tests:
//!
//! ```text
//! Idle -> Submitting(step) -> AwaitingFinalization(step, tx)
//!      -> StepSucceeded | StepFailed
//! StepSucceeded -> Submitting(step + 1) | FlowCompleted
//! StepFailed    -> FlowFailed
//! ```
//!
//! A machine that reached `FlowCompleted` or `FlowFailed` accepts no further
//! events; the caller starts a new flow from `Idle`.

use crate::wallet::{PollStatus, TxHandle};
use crate::{Error, Result};
use std::fmt;

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    /// A required private record was absent; nothing was submitted
    InputUnavailable(String),

    /// The wallet refused the transaction before broadcast
    SubmissionRejected(String),

    /// The transaction finalized as rejected
    Rejected { tx: TxHandle, reason: String },

    /// The attempt budget ran out while the transaction was still pending
    TimedOut { tx: TxHandle, attempts: u32 },

    /// Caller cancelled before the step was submitted
    Cancelled,

    /// Caller stopped waiting; the transaction may still finalize
    Abandoned { tx: TxHandle },
}

impl StepFailure {
    /// Map onto the crate error taxonomy
    pub fn into_error(self, step: usize) -> Error {
        match self {
            StepFailure::InputUnavailable(reason) => Error::InputUnavailable(reason),
            StepFailure::SubmissionRejected(reason) => Error::SubmissionRejected(reason),
            StepFailure::Rejected { tx, reason } => Error::FinalizationRejected { tx, reason },
            StepFailure::TimedOut { tx, attempts } => Error::FinalizationTimeout { tx, attempts },
            StepFailure::Cancelled => Error::Cancelled(format!(
                "flow cancelled before step {step} was submitted"
            )),
            StepFailure::Abandoned { tx } => Error::Abandoned { tx },
        }
    }
}

/// One classified poll result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Finalized,
    Rejected(String),
}

impl PollOutcome {
    pub fn from_status(status: PollStatus, raw: &str) -> Self {
        match status {
            PollStatus::Pending => PollOutcome::Pending,
            PollStatus::Finalized => PollOutcome::Finalized,
            PollStatus::Rejected => PollOutcome::Rejected(raw.to_string()),
        }
    }
}

/// Flow state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Submitting {
        step: usize,
    },
    AwaitingFinalization {
        step: usize,
        tx: TxHandle,
        polls: u32,
    },
    StepSucceeded {
        step: usize,
        tx: TxHandle,
        polls: u32,
    },
    StepFailed {
        step: usize,
        failure: StepFailure,
    },
    FlowCompleted,
    FlowFailed {
        step: usize,
        failure: StepFailure,
    },
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::FlowCompleted | FlowState::FlowFailed { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            FlowState::Idle => "Idle",
            FlowState::Submitting { .. } => "Submitting",
            FlowState::AwaitingFinalization { .. } => "AwaitingFinalization",
            FlowState::StepSucceeded { .. } => "StepSucceeded",
            FlowState::StepFailed { .. } => "StepFailed",
            FlowState::FlowCompleted => "FlowCompleted",
            FlowState::FlowFailed { .. } => "FlowFailed",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::Submitting { step } | FlowState::StepFailed { step, .. } => {
                write!(f, "{}({step})", self.name())
            }
            FlowState::AwaitingFinalization { step, tx, .. }
            | FlowState::StepSucceeded { step, tx, .. } => {
                write!(f, "{}({step}, {tx})", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Move out of `Idle`, `StepSucceeded` or `StepFailed`
    Advance,

    /// Wallet accepted the step and returned a handle
    Submitted(TxHandle),

    /// Wallet refused the step before broadcast
    SubmitFailed(String),

    /// A required record could not be resolved
    InputMissing(String),

    /// One poll tick
    Polled(PollOutcome),

    /// Caller gave up
    Cancel,
}

/// State machine for one flow instance
#[derive(Debug, Clone)]
pub struct FlowMachine {
    state: FlowState,
    steps: usize,
    max_attempts: u32,
}

impl FlowMachine {
    /// Machine for a flow of `steps` transactions, each allowed
    /// `max_attempts` polls
    pub fn new(steps: usize, max_attempts: u32) -> Self {
        Self {
            state: FlowState::Idle,
            steps,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn step_count(&self) -> usize {
        self.steps
    }

    /// Apply one event, returning the new state
    pub fn apply(&mut self, event: FlowEvent) -> Result<&FlowState> {
        let next = match (&self.state, event) {
            (FlowState::Idle, FlowEvent::Advance) if self.steps > 0 => {
                FlowState::Submitting { step: 0 }
            }
            (FlowState::Idle, FlowEvent::Cancel) => FlowState::FlowFailed {
                step: 0,
                failure: StepFailure::Cancelled,
            },

            (FlowState::Submitting { step }, FlowEvent::Submitted(tx)) => {
                FlowState::AwaitingFinalization {
                    step: *step,
                    tx,
                    polls: 0,
                }
            }
            (FlowState::Submitting { step }, FlowEvent::SubmitFailed(reason)) => {
                FlowState::StepFailed {
                    step: *step,
                    failure: StepFailure::SubmissionRejected(reason),
                }
            }
            (FlowState::Submitting { step }, FlowEvent::InputMissing(reason)) => {
                FlowState::StepFailed {
                    step: *step,
                    failure: StepFailure::InputUnavailable(reason),
                }
            }
            (FlowState::Submitting { step }, FlowEvent::Cancel) => FlowState::StepFailed {
                step: *step,
                failure: StepFailure::Cancelled,
            },

            (FlowState::AwaitingFinalization { step, tx, polls }, FlowEvent::Polled(outcome)) => {
                let polls = polls + 1;
                match outcome {
                    PollOutcome::Finalized => FlowState::StepSucceeded {
                        step: *step,
                        tx: tx.clone(),
                        polls,
                    },
                    PollOutcome::Rejected(reason) => FlowState::StepFailed {
                        step: *step,
                        failure: StepFailure::Rejected { tx: tx.clone(), reason },
                    },
                    PollOutcome::Pending if polls >= self.max_attempts => FlowState::StepFailed {
                        step: *step,
                        failure: StepFailure::TimedOut {
                            tx: tx.clone(),
                            attempts: polls,
                        },
                    },
                    PollOutcome::Pending => FlowState::AwaitingFinalization {
                        step: *step,
                        tx: tx.clone(),
                        polls,
                    },
                }
            }
            (FlowState::AwaitingFinalization { step, tx, .. }, FlowEvent::Cancel) => {
                FlowState::StepFailed {
                    step: *step,
                    failure: StepFailure::Abandoned { tx: tx.clone() },
                }
            }

            (FlowState::StepSucceeded { step, .. }, FlowEvent::Advance) => {
                if step + 1 < self.steps {
                    FlowState::Submitting { step: step + 1 }
                } else {
                    FlowState::FlowCompleted
                }
            }
            (FlowState::StepSucceeded { step, .. }, FlowEvent::Cancel) if step + 1 < self.steps => {
                FlowState::FlowFailed {
                    step: step + 1,
                    failure: StepFailure::Cancelled,
                }
            }

            (FlowState::StepFailed { step, failure }, FlowEvent::Advance) => FlowState::FlowFailed {
                step: *step,
                failure: failure.clone(),
            },

            (state, event) => {
                return Err(Error::InvalidTransition(format!(
                    "{event:?} is not valid in state {state}"
                )));
            }
        };

        self.state = next;
        Ok(&self.state)
    }
}
