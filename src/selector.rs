//! Private record selector
//!
//! Picks the record to feed into the next transaction step. Spent records
//! are filtered out before any predicate runs, so no predicate can select one.

use crate::literal::literals_equal;
use crate::records::{LoanRecordStatus, PrivateRecord, RecordKind};
use crate::types::{CreditTier, LoanId};
use tracing::debug;

/// What the caller is looking for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordQuery {
    /// Any unspent credit tier record, optionally of a given tier
    CreditTier { tier: Option<CreditTier> },

    /// The unspent, open loan record for `loan_id`
    OpenLoan { loan_id: LoanId },

    /// A record by wallet handle
    ById { id: String },
}

/// A query plus an optional owner constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPredicate {
    pub query: RecordQuery,

    /// When set, records whose owner is known must match it
    pub owner: Option<String>,
}

impl RecordPredicate {
    pub fn credit_tier() -> Self {
        Self {
            query: RecordQuery::CreditTier { tier: None },
            owner: None,
        }
    }

    pub fn open_loan(loan_id: LoanId) -> Self {
        Self {
            query: RecordQuery::OpenLoan { loan_id },
            owner: None,
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            query: RecordQuery::ById { id: id.into() },
            owner: None,
        }
    }

    /// Restrict to records owned by `owner`
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Whether an unspent record satisfies this predicate
    pub fn matches(&self, record: &PrivateRecord) -> bool {
        if let (Some(want), Some(have)) = (&self.owner, &record.owner) {
            if !literals_equal(want, have) {
                return false;
            }
        }

        match (&self.query, &record.kind) {
            (RecordQuery::CreditTier { tier }, RecordKind::CreditTier(r)) => {
                tier.map_or(true, |t| t == r.tier)
            }
            (RecordQuery::OpenLoan { loan_id }, RecordKind::Loan(r)) => {
                // loan_id was normalized from its tagged literal when decoded
                r.loan_id == *loan_id && r.status == LoanRecordStatus::Open
            }
            (RecordQuery::ById { id }, _) => &record.id == id,
            _ => false,
        }
    }

    /// Human-readable description for error messages
    pub fn describe(&self) -> String {
        match &self.query {
            RecordQuery::CreditTier { tier: Some(t) } => format!("unspent {t} credit record"),
            RecordQuery::CreditTier { tier: None } => "unspent credit tier record".to_string(),
            RecordQuery::OpenLoan { loan_id } => format!("open loan record for loan #{loan_id}"),
            RecordQuery::ById { id } => format!("unspent record {id}"),
        }
    }
}

/// Return the first unspent record satisfying `predicate`
pub fn select<'a>(
    records: &'a [PrivateRecord],
    predicate: &RecordPredicate,
) -> Option<&'a PrivateRecord> {
    select_by(records, |r| predicate.matches(r))
}

/// Return the first unspent record satisfying an arbitrary predicate
pub fn select_by<'a, F>(records: &'a [PrivateRecord], predicate: F) -> Option<&'a PrivateRecord>
where
    F: Fn(&PrivateRecord) -> bool,
{
    let found = records.iter().filter(|r| !r.spent).find(|r| predicate(r));
    match found {
        Some(r) => debug!("Selected record {}", r.id),
        None => debug!("No unspent record matched among {}", records.len()),
    }
    found
}

/// Every unspent record satisfying `predicate`
pub fn select_all<'a>(
    records: &'a [PrivateRecord],
    predicate: &RecordPredicate,
) -> Vec<&'a PrivateRecord> {
    records
        .iter()
        .filter(|r| !r.spent && predicate.matches(r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{CreditTierRecord, LoanRecord};
    use proptest::prelude::*;

    fn tier_record(id: &str, tier: CreditTier, spent: bool) -> PrivateRecord {
        PrivateRecord {
            id: id.to_string(),
            owner: Some("aleo1me".to_string()),
            spent,
            kind: RecordKind::CreditTier(CreditTierRecord { tier, nonce: None }),
        }
    }

    fn loan_record(
        id: &str,
        loan_id: LoanId,
        status: LoanRecordStatus,
        spent: bool,
    ) -> PrivateRecord {
        PrivateRecord {
            id: id.to_string(),
            owner: Some("aleo1me".to_string()),
            spent,
            kind: RecordKind::Loan(LoanRecord {
                loan_id,
                principal: 1000,
                interest_bps: 500,
                collateral: Some(1500),
                lender: None,
                tier: None,
                start_block: None,
                duration_blocks: None,
                repaid: None,
                status,
            }),
        }
    }

    #[test]
    fn test_spent_records_never_selected() {
        let records = vec![
            tier_record("t1", CreditTier::A, true),
            loan_record("l1", 3, LoanRecordStatus::Open, true),
        ];

        let predicates = [
            RecordPredicate::credit_tier(),
            RecordPredicate::open_loan(3),
            RecordPredicate::by_id("t1"),
            RecordPredicate::by_id("l1"),
        ];
        for predicate in &predicates {
            assert!(select(&records, predicate).is_none(), "{predicate:?}");
            assert!(select_all(&records, predicate).is_empty());
        }
        assert!(select_by(&records, |_| true).is_none());
    }

    #[test]
    fn test_selects_first_unspent_match() {
        let records = vec![
            tier_record("t1", CreditTier::A, true),
            loan_record("l1", 3, LoanRecordStatus::Open, false),
            tier_record("t2", CreditTier::B, false),
            tier_record("t3", CreditTier::C, false),
        ];

        assert_eq!(select(&records, &RecordPredicate::credit_tier()).unwrap().id, "t2");
        let tier_c = RecordPredicate {
            query: RecordQuery::CreditTier { tier: Some(CreditTier::C) },
            owner: None,
        };
        assert_eq!(select(&records, &tier_c).unwrap().id, "t3");
        assert_eq!(select_all(&records, &RecordPredicate::credit_tier()).len(), 2);
    }

    #[test]
    fn test_open_loan_matching() {
        let records = vec![
            loan_record("l1", 3, LoanRecordStatus::Repaid, false),
            loan_record("l2", 4, LoanRecordStatus::Open, false),
            loan_record("l3", 3, LoanRecordStatus::Open, false),
        ];

        assert_eq!(select(&records, &RecordPredicate::open_loan(3)).unwrap().id, "l3");
        assert!(select(&records, &RecordPredicate::open_loan(5)).is_none());
    }

    #[test]
    fn test_owner_constraint() {
        let records = vec![tier_record("t1", CreditTier::A, false)];
        let mine = RecordPredicate::credit_tier().owned_by("\"aleo1me\"");
        let theirs = RecordPredicate::credit_tier().owned_by("aleo1them");
        assert!(select(&records, &mine).is_some());
        assert!(select(&records, &theirs).is_none());
    }

    fn arb_owner() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("aleo1me".to_string())),
            Just(Some("aleo1me.private".to_string())),
            Just(Some("aleo1them".to_string())),
        ]
    }

    fn arb_tier() -> impl Strategy<Value = CreditTier> {
        prop_oneof![Just(CreditTier::A), Just(CreditTier::B), Just(CreditTier::C)]
    }

    fn arb_record() -> impl Strategy<Value = PrivateRecord> {
        let kind = prop_oneof![
            arb_tier().prop_map(|tier| {
                RecordKind::CreditTier(CreditTierRecord { tier, nonce: None })
            }),
            (1u32..5, 0u128..4).prop_map(|(loan_id, code)| {
                let status = LoanRecordStatus::from_code(code).unwrap();
                loan_record("", loan_id, status, false).kind
            }),
        ];
        ("[a-e]{1,2}", arb_owner(), any::<bool>(), kind).prop_map(|(id, owner, spent, kind)| {
            PrivateRecord {
                id,
                owner,
                spent,
                kind,
            }
        })
    }

    fn arb_predicate() -> impl Strategy<Value = RecordPredicate> {
        let query = prop_oneof![
            proptest::option::of(arb_tier()).prop_map(|tier| RecordQuery::CreditTier { tier }),
            (1u32..5).prop_map(|loan_id| RecordQuery::OpenLoan { loan_id }),
            "[a-e]{1,2}".prop_map(|id| RecordQuery::ById { id }),
        ];
        (query, arb_owner()).prop_map(|(query, owner)| RecordPredicate { query, owner })
    }

    proptest! {
        #[test]
        fn prop_selection_never_returns_spent(
            records in proptest::collection::vec(arb_record(), 0..16),
            predicate in arb_predicate(),
        ) {
            let expected = records.iter().find(|r| !r.spent && predicate.matches(r));
            let selected = select(&records, &predicate);
            prop_assert_eq!(selected, expected);
            if let Some(record) = selected {
                prop_assert!(!record.spent);
            }

            let all = select_all(&records, &predicate);
            prop_assert!(all.iter().all(|r| !r.spent && predicate.matches(r)));
            prop_assert_eq!(
                all.len(),
                records.iter().filter(|r| !r.spent && predicate.matches(r)).count()
            );

            prop_assert!(select_by(&records, |_| true).map_or(true, |r| !r.spent));
        }
    }
}
