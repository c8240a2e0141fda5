//! Public loan view and derived lending types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Loan identifier assigned by the program at registration
pub type LoanId = u32;

/// Lifecycle stage of a loan, derived against a ledger height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    /// Open and within its deadline
    Active,

    /// Open and past its deadline; anyone may liquidate it
    Liquidatable,

    /// Repaid or liquidated
    Settled,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::Active => write!(f, "Active"),
            LoanStatus::Liquidatable => write!(f, "Liquidatable"),
            LoanStatus::Settled => write!(f, "Settled"),
        }
    }
}

/// Public view of a loan, stitched together from the `loan_active`,
/// `loan_owner` and `loan_deadline` mappings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPublic {
    pub loan_id: LoanId,

    /// Borrower account
    pub owner: String,

    /// Height after which an active loan becomes liquidatable
    pub deadline: u64,

    /// True until repaid or liquidated
    pub active: bool,
}

impl LoanPublic {
    /// Derive the lifecycle stage at `height`.
    ///
    /// A loan whose deadline equals the current height is still `Active`.
    pub fn status(&self, height: u64) -> LoanStatus {
        if !self.active {
            LoanStatus::Settled
        } else if height > self.deadline {
            LoanStatus::Liquidatable
        } else {
            LoanStatus::Active
        }
    }

    pub fn is_liquidatable(&self, height: u64) -> bool {
        self.status(height) == LoanStatus::Liquidatable
    }
}

/// Credit tier rank held in a private credit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreditTier {
    /// Best rates, highest borrowing power
    A,
    B,
    /// Limited borrowing
    C,
}

impl CreditTier {
    pub fn rank(&self) -> u8 {
        match self {
            CreditTier::A => 0,
            CreditTier::B => 1,
            CreditTier::C => 2,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(CreditTier::A),
            1 => Some(CreditTier::B),
            2 => Some(CreditTier::C),
            _ => None,
        }
    }
}

impl fmt::Display for CreditTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditTier::A => write!(f, "Tier A"),
            CreditTier::B => write!(f, "Tier B"),
            CreditTier::C => write!(f, "Tier C"),
        }
    }
}

/// Total owed on a loan: principal plus interest, floored.
///
/// `total_due(1000, 500) == 1050`, `total_due(333, 33) == 334`.
pub fn total_due(principal: u64, interest_bps: u16) -> u64 {
    let interest = (principal as u128 * interest_bps as u128) / 10_000;
    principal.saturating_add(u64::try_from(interest).unwrap_or(u64::MAX))
}

/// Network-wide loan statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Loans registered according to the on-chain counter
    pub total_loans: u32,

    /// Loans whose public view was read completely
    pub loans_read: usize,

    pub active_loans: usize,
    pub liquidatable_loans: usize,
    pub settled_loans: usize,
}

impl NetworkStats {
    /// Tally statuses of `loans` at `height`
    pub fn from_loans(total_loans: u32, loans: &[LoanPublic], height: u64) -> Self {
        let mut stats = NetworkStats {
            total_loans,
            loans_read: loans.len(),
            ..Default::default()
        };

        for loan in loans {
            match loan.status(height) {
                LoanStatus::Active => stats.active_loans += 1,
                LoanStatus::Liquidatable => stats.liquidatable_loans += 1,
                LoanStatus::Settled => stats.settled_loans += 1,
            }
        }

        stats
    }
}
