//! Storage representation of cases and payment events.
//!
//! Persistent backends never serialize domain values directly; they go through
//! these records so that the on-disk layout can evolve independently and so
//! corrupt rows are caught when mapped back.

use crate::domain::case::{Case, CaseId, CaseStatus, PaymentEvent};
use crate::domain::money::{Amount, Balance};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub debtor: String,
    pub original_amount: Decimal,
    pub balance: Decimal,
    pub status: CaseStatus,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub write_off_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payment_count: u64,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub case_id: String,
    pub seq: u64,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub paid_at: DateTime<Utc>,
    pub reference: Option<String>,
}

impl From<&Case> for CaseRecord {
    fn from(case: &Case) -> Self {
        Self {
            id: case.id.as_str().to_string(),
            debtor: case.debtor.clone(),
            original_amount: case.original_amount.value(),
            balance: case.balance.value(),
            status: case.status,
            currency: case.currency.clone(),
            due_date: case.due_date,
            write_off_reason: case.write_off_reason.clone(),
            created_at: case.created_at,
            updated_at: case.updated_at,
            payment_count: case.payment_count,
            version: case.version,
        }
    }
}

impl TryFrom<CaseRecord> for Case {
    type Error = LedgerError;

    fn try_from(record: CaseRecord) -> Result<Self> {
        let original_amount = Amount::new(record.original_amount)
            .map_err(|_| corrupt(&record.id, "non-positive original amount"))?;
        if record.balance < Decimal::ZERO || record.balance > record.original_amount {
            return Err(corrupt(&record.id, "balance outside [0, original amount]"));
        }
        Ok(Case {
            id: CaseId::new(record.id),
            debtor: record.debtor,
            original_amount,
            balance: Balance::new(record.balance),
            status: record.status,
            currency: record.currency,
            due_date: record.due_date,
            write_off_reason: record.write_off_reason,
            created_at: record.created_at,
            updated_at: record.updated_at,
            payment_count: record.payment_count,
            version: record.version,
        })
    }
}

impl From<&PaymentEvent> for PaymentRecord {
    fn from(event: &PaymentEvent) -> Self {
        Self {
            case_id: event.case_id.as_str().to_string(),
            seq: event.seq,
            amount: event.amount.value(),
            balance_after: event.balance_after.value(),
            paid_at: event.paid_at,
            reference: event.reference.clone(),
        }
    }
}

impl TryFrom<PaymentRecord> for PaymentEvent {
    type Error = LedgerError;

    fn try_from(record: PaymentRecord) -> Result<Self> {
        let amount = Amount::new(record.amount)
            .map_err(|_| corrupt(&record.case_id, "non-positive payment amount"))?;
        Ok(PaymentEvent {
            case_id: CaseId::new(record.case_id),
            seq: record.seq,
            amount,
            balance_after: Balance::new(record.balance_after),
            paid_at: record.paid_at,
            reference: record.reference,
        })
    }
}

fn corrupt(id: &str, what: &str) -> LedgerError {
    LedgerError::internal(format!("corrupt record for case {id}: {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::case::CaseTerms;
    use rust_decimal_macros::dec;

    #[test]
    fn test_case_record_mapping() {
        let case = Case::register("INV-9".into(), "ABC A.S.", dec!(150000), CaseTerms::default(), Utc::now())
            .unwrap();
        let record = CaseRecord::from(&case);
        assert_eq!(record.id, "INV-9");
        assert_eq!(record.balance, dec!(150000));

        let json = serde_json::to_vec(&record).unwrap();
        let back: CaseRecord = serde_json::from_slice(&json).unwrap();
        assert_eq!(Case::try_from(back).unwrap(), case);
    }

    #[test]
    fn test_corrupt_balance_rejected() {
        let case = Case::register("INV-9".into(), "A", dec!(10), CaseTerms::default(), Utc::now()).unwrap();
        let mut record = CaseRecord::from(&case);
        record.balance = dec!(11);
        assert!(matches!(Case::try_from(record), Err(LedgerError::Internal(_))));
    }
}
