use super::case::{Case, CaseId, CaseStatus, PaymentEvent};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Durable home of every case and payment event.
///
/// Writes are conditional: `put` succeeds only when the stored version equals
/// `expected_version` (0 meaning "absent"), and bumps it by one. Implementations
/// must make each write a single atomic step.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fails with `NotFound` when the case was never registered.
    async fn get(&self, id: &CaseId) -> Result<Case>;

    /// Returns the new stored version or `VersionConflict`.
    async fn put(&self, case: Case, expected_version: u64) -> Result<u64>;

    /// Appends an event; an existing `(case_id, seq)` is never overwritten.
    async fn append_payment(&self, event: PaymentEvent) -> Result<()>;

    /// `put` and `append_payment` as one atomic write.
    async fn put_with_payment(
        &self,
        case: Case,
        expected_version: u64,
        event: PaymentEvent,
    ) -> Result<u64>;

    /// Events of one case in accepted-write order.
    async fn payments(&self, id: &CaseId) -> Result<Vec<PaymentEvent>>;

    /// A consistent point-in-time view of all records.
    async fn snapshot(&self) -> Result<LedgerSnapshot>;

    async fn list(&self, filter: CaseFilter) -> Result<CaseList> {
        let snapshot = self.snapshot().await?;
        Ok(CaseList::new(snapshot.cases, filter))
    }
}

pub type SharedLedgerStore = Arc<dyn LedgerStore>;

#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub cases: Vec<Case>,
    pub payments: Vec<PaymentEvent>,
}

/// Selects cases by status and/or creation time in `[created_from, created_until)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseFilter {
    pub status: Option<CaseStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
}

impl CaseFilter {
    pub fn with_status(status: CaseStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, case: &Case) -> bool {
        self.status.is_none_or(|s| case.status == s)
            && self.created_from.is_none_or(|from| case.created_at >= from)
            && self.created_until.is_none_or(|until| case.created_at < until)
    }
}

/// Result of `list`: a snapshot of cases filtered lazily on each traversal.
///
/// Iterating twice yields the same sequence.
#[derive(Debug, Clone)]
pub struct CaseList {
    cases: Arc<[Case]>,
    filter: CaseFilter,
}

impl CaseList {
    pub fn new(cases: Vec<Case>, filter: CaseFilter) -> Self {
        Self {
            cases: cases.into(),
            filter,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Case> + '_ {
        self.cases.iter().filter(|c| self.filter.matches(c))
    }
}

impl<'a> IntoIterator for &'a CaseList {
    type Item = &'a Case;
    type IntoIter = Box<dyn Iterator<Item = &'a Case> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
