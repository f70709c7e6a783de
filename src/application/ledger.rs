use crate::config::LedgerConfig;
use crate::domain::case::{Case, CaseId, CaseTerms, PaymentEvent};
use crate::domain::ports::{CaseFilter, CaseList, SharedLedgerStore};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Source of "now" for case timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Outcome of an accepted (or previously accepted) payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub case: Case,
    pub event: PaymentEvent,
    /// True when the reference had already been applied and nothing changed.
    pub duplicate: bool,
}

/// Entry point for every state-changing operation on cases.
///
/// Each operation is one optimistic cycle: read the case and its version,
/// run the transition in memory, then write conditionally on that version.
/// A lost race surfaces as `VersionConflict`; retrying is the caller's call
/// (see [`retry_on_conflict`](super::retry::retry_on_conflict)).
///
/// Every store call is bounded by the configured timeout.
#[derive(Clone)]
pub struct CollectionsLedger {
    store: SharedLedgerStore,
    timeout: Duration,
    clock: Clock,
}

impl CollectionsLedger {
    pub fn new(store: SharedLedgerStore, config: &LedgerConfig) -> Self {
        Self {
            store,
            timeout: config.store_timeout,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    async fn call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| LedgerError::Timeout(self.timeout))?
    }

    pub async fn register(
        &self,
        id: CaseId,
        debtor: &str,
        amount: Decimal,
        terms: CaseTerms,
    ) -> Result<Case> {
        let mut case = Case::register(id, debtor, amount, terms, (self.clock)())?;
        case.version = self.call(self.store.put(case.clone(), 0)).await?;
        tracing::info!(case = %case.id, debtor = %case.debtor, amount = %case.original_amount, "case registered");
        Ok(case)
    }

    pub async fn begin_collection(&self, id: &CaseId) -> Result<Case> {
        let current = self.get(id).await?;
        let mut next = current.begin_collection((self.clock)())?;
        next.version = self.call(self.store.put(next.clone(), current.version)).await?;
        tracing::info!(case = %id, "collection started");
        Ok(next)
    }

    /// Applies a payment. A `reference` already recorded on this case makes
    /// the call a no-op that returns the original event, provided the amounts
    /// agree; a reused reference with another amount is a `Validation` error.
    pub async fn apply_payment(
        &self,
        id: &CaseId,
        amount: Decimal,
        reference: Option<String>,
    ) -> Result<PaymentReceipt> {
        let current = self.get(id).await?;

        if let Some(reference) = reference.as_deref() {
            let history = self.payments(id).await?;
            if let Some(event) = history
                .into_iter()
                .find(|e| e.reference.as_deref() == Some(reference))
            {
                if event.amount.value() != amount {
                    return Err(LedgerError::Validation(format!(
                        "reference {reference} on case {id} was already applied for {}, not {amount}",
                        event.amount
                    )));
                }
                tracing::info!(case = %id, reference, "payment already applied");
                return Ok(PaymentReceipt {
                    case: current,
                    event,
                    duplicate: true,
                });
            }
        }

        let (mut next, event) = current.apply_payment(amount, reference, (self.clock)())?;
        next.version = self
            .call(
                self.store
                    .put_with_payment(next.clone(), current.version, event.clone()),
            )
            .await?;
        tracing::info!(
            case = %id,
            amount = %event.amount,
            balance = %next.balance,
            status = %next.status,
            "payment applied"
        );
        Ok(PaymentReceipt {
            case: next,
            event,
            duplicate: false,
        })
    }

    pub async fn write_off(&self, id: &CaseId, reason: &str) -> Result<Case> {
        let current = self.get(id).await?;
        let mut next = current.write_off(reason, (self.clock)())?;
        next.version = self.call(self.store.put(next.clone(), current.version)).await?;
        tracing::info!(case = %id, residual = %next.balance, reason, "case written off");
        Ok(next)
    }

    pub async fn get(&self, id: &CaseId) -> Result<Case> {
        self.call(self.store.get(id)).await
    }

    pub async fn payments(&self, id: &CaseId) -> Result<Vec<PaymentEvent>> {
        self.call(self.store.payments(id)).await
    }

    pub async fn list(&self, filter: CaseFilter) -> Result<CaseList> {
        self.call(self.store.list(filter)).await
    }
}
