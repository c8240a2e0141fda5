//! Private record decoding
//!
//! Wallets hand back records as loosely-shaped JSON. They are converted once,
//! at this boundary, into a tagged union over the two record kinds the
//! lending flows consume.

use crate::literal::{parse_address, parse_numeric, parse_u32, parse_u64, strip_literal};
use crate::types::{CreditTier, LoanId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Record as returned by the wallet's record listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    /// Opaque handle usable as a transaction input
    pub id: String,

    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default)]
    pub program_id: Option<String>,

    #[serde(default, alias = "recordName")]
    pub record_name: Option<String>,

    #[serde(default)]
    pub spent: bool,

    /// Plaintext fields, e.g. `{"loan_id": "3u32.private", ...}`
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Status of a private loan record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanRecordStatus {
    Open,
    Defaulted,
    Repaid,
    Liquidated,
}

impl LoanRecordStatus {
    pub fn from_code(code: u128) -> Option<Self> {
        match code {
            0 => Some(LoanRecordStatus::Open),
            1 => Some(LoanRecordStatus::Defaulted),
            2 => Some(LoanRecordStatus::Repaid),
            3 => Some(LoanRecordStatus::Liquidated),
            _ => None,
        }
    }
}

/// Credit tier record fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTierRecord {
    pub tier: CreditTier,
    pub nonce: Option<String>,
}

/// Private loan record fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan_id: LoanId,
    pub principal: u64,
    pub interest_bps: u16,
    pub collateral: Option<u64>,
    pub lender: Option<String>,
    pub tier: Option<CreditTier>,
    pub start_block: Option<u64>,
    pub duration_blocks: Option<u64>,
    pub repaid: Option<u64>,
    pub status: LoanRecordStatus,
}

/// Record payload, by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    CreditTier(CreditTierRecord),
    Loan(LoanRecord),
}

/// A decoded private record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateRecord {
    pub id: String,
    pub owner: Option<String>,
    pub spent: bool,
    pub kind: RecordKind,
}

impl PrivateRecord {
    pub fn as_credit_tier(&self) -> Option<&CreditTierRecord> {
        match &self.kind {
            RecordKind::CreditTier(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_loan(&self) -> Option<&LoanRecord> {
        match &self.kind {
            RecordKind::Loan(r) => Some(r),
            _ => None,
        }
    }
}

/// Look a field up at the top level of `data`, then under a nested `value`
/// object, which some wallets wrap plaintexts in.
fn field<'a>(data: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    data.get(name).or_else(|| {
        data.get("value")
            .and_then(Value::as_object)
            .and_then(|inner| inner.get(name))
    })
}

fn field_str(data: &Map<String, Value>, name: &str) -> Option<String> {
    match field(data, name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field_u64(data: &Map<String, Value>, name: &str) -> Option<u64> {
    field_str(data, name).and_then(|s| parse_u64(&s))
}

fn decode_loan(data: &Map<String, Value>) -> Option<LoanRecord> {
    let status = match field_str(data, "status") {
        None => LoanRecordStatus::Open,
        Some(s) => parse_numeric(&s).and_then(LoanRecordStatus::from_code)?,
    };

    Some(LoanRecord {
        loan_id: field_str(data, "loan_id").and_then(|s| parse_u32(&s))?,
        principal: field_u64(data, "principal")?,
        interest_bps: field_u64(data, "interest_bps").and_then(|v| u16::try_from(v).ok())?,
        collateral: field_u64(data, "collateral"),
        lender: field_str(data, "lender").and_then(|s| parse_address(&s)),
        tier: field_u64(data, "tier")
            .and_then(|v| u8::try_from(v).ok())
            .and_then(CreditTier::from_rank),
        start_block: field_u64(data, "start_block"),
        duration_blocks: field_u64(data, "duration_blocks"),
        repaid: field_u64(data, "repaid"),
        status,
    })
}

fn decode_credit_tier(data: &Map<String, Value>) -> Option<CreditTierRecord> {
    let tier = field_u64(data, "tier")
        .and_then(|v| u8::try_from(v).ok())
        .and_then(CreditTier::from_rank)?;
    Some(CreditTierRecord {
        tier,
        nonce: field_str(data, "nonce").map(|s| strip_literal(&s).to_string()),
    })
}

impl RawRecord {
    /// Convert into a typed record; `None` for shapes this crate does not consume
    pub fn decode(&self) -> Option<PrivateRecord> {
        let name = self.record_name.as_deref().map(str::to_ascii_lowercase);
        let kind = match name.as_deref() {
            Some("loan") => RecordKind::Loan(decode_loan(&self.data)?),
            Some("credittier") | Some("credit_tier") => {
                RecordKind::CreditTier(decode_credit_tier(&self.data)?)
            }
            Some(_) => return None,
            // unnamed records are classified by their fields
            None if field(&self.data, "loan_id").is_some() => {
                RecordKind::Loan(decode_loan(&self.data)?)
            }
            None => RecordKind::CreditTier(decode_credit_tier(&self.data)?),
        };

        Some(PrivateRecord {
            id: self.id.clone(),
            owner: self
                .owner
                .as_deref()
                .map(|o| strip_literal(o).to_string()),
            spent: self.spent,
            kind,
        })
    }
}

/// Decode every recognizable record, skipping the rest
pub fn decode_records(raw: &[RawRecord]) -> Vec<PrivateRecord> {
    raw.iter()
        .filter_map(|r| {
            let decoded = r.decode();
            if decoded.is_none() {
                debug!("Skipping unrecognized record {}", r.id);
            }
            decoded
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_credit_tier() {
        let record = raw(json!({
            "id": "rec1",
            "owner": "aleo1abc.private",
            "spent": false,
            "data": { "tier": "1u8.private", "nonce": "99field.private" }
        }))
        .decode()
        .unwrap();

        assert_eq!(record.owner.as_deref(), Some("aleo1abc"));
        let tier = record.as_credit_tier().unwrap();
        assert_eq!(tier.tier, CreditTier::B);
        assert_eq!(tier.nonce.as_deref(), Some("99field"));
    }

    #[test]
    fn test_decode_nested_value() {
        let record = raw(json!({
            "id": "rec2",
            "data": { "value": { "tier": "2u8" } }
        }))
        .decode()
        .unwrap();
        assert_eq!(record.as_credit_tier().unwrap().tier, CreditTier::C);
    }

    #[test]
    fn test_decode_loan() {
        let record = raw(json!({
            "id": "rec3",
            "recordName": "Loan",
            "spent": true,
            "data": {
                "loan_id": "3u32.private",
                "principal": "1000u64.private",
                "collateral": "1500u64.private",
                "interest_bps": "500u16.private",
                "status": "0u8.private"
            }
        }))
        .decode()
        .unwrap();

        assert!(record.spent);
        let loan = record.as_loan().unwrap();
        assert_eq!(loan.loan_id, 3);
        assert_eq!(loan.principal, 1000);
        assert_eq!(loan.collateral, Some(1500));
        assert_eq!(loan.interest_bps, 500);
        assert_eq!(loan.status, LoanRecordStatus::Open);
    }

    #[test]
    fn test_loan_missing_status_is_open() {
        let record = raw(json!({
            "id": "rec4",
            "data": { "loan_id": "4u32", "principal": "10u64", "interest_bps": "0u16" }
        }))
        .decode()
        .unwrap();
        assert_eq!(record.as_loan().unwrap().status, LoanRecordStatus::Open);
    }

    #[test]
    fn test_unrecognized_shapes_are_skipped() {
        let records = vec![
            raw(json!({ "id": "a", "data": { "amount": "5u64" } })),
            raw(json!({ "id": "b", "recordName": "credits", "data": { "microcredits": "5u64" } })),
            raw(json!({ "id": "c", "data": { "loan_id": "1u32" } })),
            raw(json!({ "id": "d", "data": { "tier": "7u8" } })),
            raw(json!({ "id": "e", "data": { "tier": "0u8" } })),
        ];
        let decoded = decode_records(&records);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, "e");
    }
}
