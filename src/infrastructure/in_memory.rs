use crate::domain::case::{Case, CaseId, PaymentEvent};
use crate::domain::ports::{LedgerSnapshot, LedgerStore};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Ledger {
    cases: BTreeMap<CaseId, Case>,
    payments: BTreeMap<CaseId, Vec<PaymentEvent>>,
}

impl Ledger {
    fn check_version(&self, case: &CaseId, expected: u64) -> Result<()> {
        let actual = self.cases.get(case).map_or(0, |c| c.version);
        if actual == expected {
            Ok(())
        } else {
            Err(LedgerError::VersionConflict {
                case: case.clone(),
                expected,
                actual,
            })
        }
    }

    fn check_append(&self, event: &PaymentEvent) -> Result<()> {
        let recorded = self.payments.get(&event.case_id).map_or(0, Vec::len) as u64;
        if event.seq != recorded + 1 {
            return Err(LedgerError::Validation(format!(
                "payment {} for case {} is out of sequence (next is {})",
                event.seq,
                event.case_id,
                recorded + 1
            )));
        }
        Ok(())
    }

    fn write_case(&mut self, mut case: Case, expected: u64) -> u64 {
        case.version = expected + 1;
        let version = case.version;
        tracing::debug!(case = %case.id, version, "case stored");
        self.cases.insert(case.id.clone(), case);
        version
    }
}

/// A thread-safe in-memory ledger.
///
/// Cases and payments live behind one `RwLock` so that a snapshot taken under
/// the read guard can never see a case without its matching payment.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    inner: Arc<RwLock<Ledger>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get(&self, id: &CaseId) -> Result<Case> {
        let ledger = self.inner.read().await;
        ledger
            .cases
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(id.clone()))
    }

    async fn put(&self, case: Case, expected_version: u64) -> Result<u64> {
        let mut ledger = self.inner.write().await;
        ledger.check_version(&case.id, expected_version)?;
        Ok(ledger.write_case(case, expected_version))
    }

    async fn append_payment(&self, event: PaymentEvent) -> Result<()> {
        let mut ledger = self.inner.write().await;
        ledger.check_append(&event)?;
        ledger
            .payments
            .entry(event.case_id.clone())
            .or_default()
            .push(event);
        Ok(())
    }

    async fn put_with_payment(
        &self,
        case: Case,
        expected_version: u64,
        event: PaymentEvent,
    ) -> Result<u64> {
        let mut ledger = self.inner.write().await;
        ledger.check_version(&case.id, expected_version)?;
        ledger.check_append(&event)?;
        ledger
            .payments
            .entry(event.case_id.clone())
            .or_default()
            .push(event);
        Ok(ledger.write_case(case, expected_version))
    }

    async fn payments(&self, id: &CaseId) -> Result<Vec<PaymentEvent>> {
        let ledger = self.inner.read().await;
        Ok(ledger.payments.get(id).cloned().unwrap_or_default())
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let ledger = self.inner.read().await;
        Ok(LedgerSnapshot {
            cases: ledger.cases.values().cloned().collect(),
            payments: ledger.payments.values().flatten().cloned().collect(),
        })
    }
}
