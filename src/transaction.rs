//! Transaction steps and flow plans
//!
//! A flow is an ordered list of steps. Each step names a program function,
//! carries its inputs, and pays the function's fixed fee. Plans are pure
//! values built here and executed by the orchestrator.

use crate::literal::{format_literal, is_valid_address, LiteralType};
use crate::records::LoanRecord;
use crate::selector::RecordPredicate;
use crate::types::{total_due, CreditTier, LoanId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Program functions called by the lending flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    CreateCreditTier,
    CreateLoanPrivate,
    RegisterLoanPublic,
    RepayLoanPrivate,
    MarkRepaidPublic,
    LiquidateLoan,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 6] = [
        FunctionKind::CreateCreditTier,
        FunctionKind::CreateLoanPrivate,
        FunctionKind::RegisterLoanPublic,
        FunctionKind::RepayLoanPrivate,
        FunctionKind::MarkRepaidPublic,
        FunctionKind::LiquidateLoan,
    ];

    /// On-chain function name
    pub fn function_name(&self) -> &'static str {
        match self {
            FunctionKind::CreateCreditTier => "create_credit_tier",
            FunctionKind::CreateLoanPrivate => "create_loan_private",
            FunctionKind::RegisterLoanPublic => "register_loan_public",
            FunctionKind::RepayLoanPrivate => "repay_loan_private",
            FunctionKind::MarkRepaidPublic => "mark_repaid_public",
            FunctionKind::LiquidateLoan => "liquidate_loan",
        }
    }

    /// Fixed fee in microcredits
    pub fn fee(&self) -> u64 {
        match self {
            FunctionKind::CreateCreditTier => 150_000,
            FunctionKind::CreateLoanPrivate => 250_000,
            FunctionKind::RegisterLoanPublic => 100_000,
            FunctionKind::RepayLoanPrivate => 150_000,
            FunctionKind::MarkRepaidPublic => 50_000,
            FunctionKind::LiquidateLoan => 100_000,
        }
    }

    /// Human label shown in transaction history
    pub fn label(&self) -> &'static str {
        match self {
            FunctionKind::CreateCreditTier => "Create Credit Tier",
            FunctionKind::CreateLoanPrivate => "Create Loan",
            FunctionKind::RegisterLoanPublic => "Register Loan",
            FunctionKind::RepayLoanPrivate => "Repay Loan",
            FunctionKind::MarkRepaidPublic => "Mark Repaid",
            FunctionKind::LiquidateLoan => "Liquidate",
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.function_name() == name)
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

/// User-facing flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowKind {
    OpenCreditProfile,
    OpenLoan,
    Repay,
    Liquidate,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::OpenCreditProfile => write!(f, "open credit profile"),
            FlowKind::OpenLoan => write!(f, "open loan"),
            FlowKind::Repay => write!(f, "repay"),
            FlowKind::Liquidate => write!(f, "liquidate"),
        }
    }
}

/// One transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    /// Literal passed through as-is
    Literal(String),

    /// Private record resolved through the selector at submission time
    Record(RecordPredicate),
}

impl StepInput {
    pub fn literal(value: impl Into<String>) -> Self {
        StepInput::Literal(value.into())
    }
}

/// One transaction in a flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStep {
    pub function: FunctionKind,
    pub inputs: Vec<StepInput>,

    /// Fee in microcredits; always the function's fixed fee
    pub fee: u64,

    /// Index of the step whose finalization must precede this one
    pub depends_on: Option<usize>,
}

impl TransactionStep {
    pub fn new(function: FunctionKind, inputs: Vec<StepInput>) -> Self {
        Self {
            function,
            inputs,
            fee: function.fee(),
            depends_on: None,
        }
    }

    pub fn after(mut self, step: usize) -> Self {
        self.depends_on = Some(step);
        self
    }
}

/// Ordered steps of one flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowPlan {
    pub kind: FlowKind,
    pub steps: Vec<TransactionStep>,
}

impl FlowPlan {
    /// Check that the plan is non-empty and every dependency points at an
    /// earlier step
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::ValidationFailed(format!("{} plan has no steps", self.kind)));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if let Some(dep) = step.depends_on {
                if dep >= i {
                    return Err(Error::ValidationFailed(format!(
                        "step {i} ({}) depends on step {dep}, which does not precede it",
                        step.function
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Terms of a new loan, as entered by the borrower
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanTerms {
    pub lender: String,
    pub principal: u64,
    pub collateral: u64,
    pub interest_bps: u16,
    pub duration_blocks: u32,
}

/// Smallest principal the program accepts
pub const MIN_PRINCIPAL: u64 = 100;

impl LoanTerms {
    /// Local checks mirroring the program's own constraints
    pub fn validate(&self) -> Result<()> {
        if !is_valid_address(&self.lender) {
            return Err(Error::ValidationFailed(format!(
                "lender {:?} is not a valid account address",
                self.lender
            )));
        }
        if self.principal < MIN_PRINCIPAL {
            return Err(Error::ValidationFailed(format!(
                "principal must be at least {MIN_PRINCIPAL}"
            )));
        }
        // collateral >= 150% of principal
        if (self.collateral as u128) * 2 < (self.principal as u128) * 3 {
            return Err(Error::ValidationFailed(format!(
                "collateral {} is below 150% of principal {}",
                self.collateral, self.principal
            )));
        }
        if self.interest_bps > 10_000 {
            return Err(Error::ValidationFailed("interest above 100%".to_string()));
        }
        if self.duration_blocks == 0 {
            return Err(Error::ValidationFailed("duration must be positive".to_string()));
        }
        Ok(())
    }
}

/// Random 96-bit field element used to make each credit record unique
pub fn random_field_nonce() -> String {
    let nonce = rand::random::<u128>() & ((1u128 << 96) - 1);
    format_literal(nonce, LiteralType::Field)
}

/// Single-step plan creating a credit tier record
pub fn plan_open_credit_profile(tier: CreditTier, nonce: String) -> FlowPlan {
    FlowPlan {
        kind: FlowKind::OpenCreditProfile,
        steps: vec![TransactionStep::new(
            FunctionKind::CreateCreditTier,
            vec![
                StepInput::literal(format_literal(tier.rank(), LiteralType::U8)),
                StepInput::literal(nonce),
            ],
        )],
    }
}

/// Two-step plan: private loan creation, then public registration.
///
/// Both steps carry the same loan id and start height.
pub fn plan_open_loan(
    loan_id: LoanId,
    start_height: u32,
    borrower: &str,
    terms: &LoanTerms,
) -> Result<FlowPlan> {
    terms.validate()?;
    if !is_valid_address(borrower) {
        return Err(Error::ValidationFailed(format!(
            "borrower {borrower:?} is not a valid account address"
        )));
    }

    let id = format_literal(loan_id, LiteralType::U32);
    let height = format_literal(start_height, LiteralType::U32);
    let duration = format_literal(terms.duration_blocks, LiteralType::U32);

    let create = TransactionStep::new(
        FunctionKind::CreateLoanPrivate,
        vec![
            StepInput::literal(id.clone()),
            StepInput::literal(height.clone()),
            StepInput::literal(terms.lender.clone()),
            StepInput::Record(RecordPredicate::credit_tier().owned_by(borrower)),
            StepInput::literal(format_literal(terms.principal, LiteralType::U64)),
            StepInput::literal(format_literal(terms.collateral, LiteralType::U64)),
            StepInput::literal(format_literal(terms.interest_bps, LiteralType::U16)),
            StepInput::literal(duration.clone()),
        ],
    );

    let register = TransactionStep::new(
        FunctionKind::RegisterLoanPublic,
        vec![
            StepInput::literal(id),
            StepInput::literal(borrower),
            StepInput::literal(height),
            StepInput::literal(duration),
        ],
    )
    .after(0);

    Ok(FlowPlan {
        kind: FlowKind::OpenLoan,
        steps: vec![create, register],
    })
}

/// Two-step plan: private repayment of the total due, then public settlement.
///
/// The open loan record is selected again when the repayment is submitted,
/// so a record spent in the meantime fails the step before broadcast.
pub fn plan_repay(loan: &LoanRecord) -> FlowPlan {
    let due = total_due(loan.principal, loan.interest_bps);

    FlowPlan {
        kind: FlowKind::Repay,
        steps: vec![
            TransactionStep::new(
                FunctionKind::RepayLoanPrivate,
                vec![
                    StepInput::Record(RecordPredicate::open_loan(loan.loan_id)),
                    StepInput::literal(format_literal(due, LiteralType::U64)),
                ],
            ),
            TransactionStep::new(
                FunctionKind::MarkRepaidPublic,
                vec![StepInput::literal(format_literal(loan.loan_id, LiteralType::U32))],
            )
            .after(0),
        ],
    }
}

/// Single-step plan liquidating a loan by its public id
pub fn plan_liquidate(loan_id: LoanId) -> FlowPlan {
    FlowPlan {
        kind: FlowKind::Liquidate,
        steps: vec![TransactionStep::new(
            FunctionKind::LiquidateLoan,
            vec![StepInput::literal(format_literal(loan_id, LiteralType::U32))],
        )],
    }
}
