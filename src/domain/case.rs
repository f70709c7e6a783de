use super::money::{Amount, Balance};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_CURRENCY: &str = "TRY";

/// Opaque identifier of a receivable, usually the invoice or file number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Open,
    InCollection,
    Paid,
    WrittenOff,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 4] = [
        CaseStatus::Open,
        CaseStatus::InCollection,
        CaseStatus::Paid,
        CaseStatus::WrittenOff,
    ];

    /// `Paid` and `WrittenOff` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, CaseStatus::Paid | CaseStatus::WrittenOff)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseStatus::Open => "OPEN",
            CaseStatus::InCollection => "IN_COLLECTION",
            CaseStatus::Paid => "PAID",
            CaseStatus::WrittenOff => "WRITTEN_OFF",
        };
        f.write_str(s)
    }
}

/// Optional commercial terms attached to a receivable at registration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseTerms {
    pub currency: Option<String>,
    pub due_date: Option<NaiveDate>,
}

/// One debtor's tracked receivable.
///
/// Values of this type are never mutated in place by callers: each transition
/// below returns the next value, which the store accepts only if `version`
/// still matches what it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub debtor: String,
    pub original_amount: Amount,
    /// Always within `0..=original_amount`.
    pub balance: Balance,
    pub status: CaseStatus,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub write_off_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of accepted payments; the next event gets `payment_count + 1`.
    pub payment_count: u64,
    /// Persisted version, 0 until first stored.
    pub version: u64,
}

/// Immutable record of one accepted payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub case_id: CaseId,
    /// Position in the case's accepted-write order, starting at 1.
    pub seq: u64,
    pub amount: Amount,
    pub balance_after: Balance,
    pub paid_at: DateTime<Utc>,
    pub reference: Option<String>,
}

impl Case {
    /// Registers a new receivable in `Open` with the full amount outstanding.
    pub fn register(
        id: CaseId,
        debtor: impl Into<String>,
        amount: Decimal,
        terms: CaseTerms,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let debtor = debtor.into().trim().to_string();
        if id.as_str().trim().is_empty() {
            return Err(LedgerError::Validation("case id must not be empty".into()));
        }
        if id.as_str().chars().any(char::is_control) {
            return Err(LedgerError::Validation(format!(
                "case id {:?} contains control characters",
                id.as_str()
            )));
        }
        if debtor.is_empty() {
            return Err(LedgerError::Validation("debtor must not be empty".into()));
        }
        let original_amount = Amount::new(amount)?;
        let currency = terms
            .currency
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        Ok(Self {
            id,
            debtor,
            original_amount,
            balance: original_amount.into(),
            status: CaseStatus::Open,
            currency,
            due_date: terms.due_date,
            write_off_reason: None,
            created_at: now,
            updated_at: now,
            payment_count: 0,
            version: 0,
        })
    }

    pub fn begin_collection(&self, now: DateTime<Utc>) -> Result<Self> {
        if self.status != CaseStatus::Open {
            return Err(self.invalid_transition("begin collection on"));
        }
        let mut next = self.clone();
        next.status = CaseStatus::InCollection;
        next.updated_at = now;
        Ok(next)
    }

    /// Applies a payment, returning the updated case and the event to append.
    ///
    /// Terminal status is checked before the amount so that a settled case
    /// always reports `InvalidTransition`.
    pub fn apply_payment(
        &self,
        amount: Decimal,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Self, PaymentEvent)> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition("apply payment to"));
        }
        let amount = Amount::new(amount)?;
        let paid = Balance::from(amount);
        if paid > self.balance {
            return Err(LedgerError::OverPayment {
                requested: amount.value(),
                balance: self.balance.value(),
            });
        }

        let mut next = self.clone();
        next.balance -= paid;
        next.payment_count += 1;
        next.updated_at = now;
        if next.balance.is_zero() {
            next.status = CaseStatus::Paid;
        }

        let event = PaymentEvent {
            case_id: self.id.clone(),
            seq: next.payment_count,
            amount,
            balance_after: next.balance,
            paid_at: now,
            reference,
        };
        Ok((next, event))
    }

    /// Closes the case with whatever balance remains.
    pub fn write_off(&self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<Self> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition("write off"));
        }
        let reason = reason.into().trim().to_string();
        if reason.is_empty() {
            return Err(LedgerError::Validation(
                "write-off reason must not be empty".into(),
            ));
        }
        let mut next = self.clone();
        next.status = CaseStatus::WrittenOff;
        next.write_off_reason = Some(reason);
        next.updated_at = now;
        Ok(next)
    }

    /// Amount recovered so far.
    pub fn collected(&self) -> Balance {
        Balance::from(self.original_amount) - self.balance
    }

    /// Days past the due date, or `None` if undated or not yet due.
    pub fn days_past_due(&self, today: NaiveDate) -> Option<i64> {
        let due = self.due_date?;
        let days = (today - due).num_days();
        (days > 0).then_some(days)
    }

    fn invalid_transition(&self, action: &'static str) -> LedgerError {
        LedgerError::InvalidTransition {
            case: self.id.clone(),
            status: self.status,
            action,
        }
    }
}
