use crate::application::aggregation::{
    AggregationEngine, DashboardSummary, DebtorRanking, DebtorSummary, LatePayment, StatusTotals,
};
use crate::application::ledger::{CollectionsLedger, PaymentReceipt};
use crate::application::retry::{RetryPolicy, retry_on_conflict};
use crate::config::LedgerConfig;
use crate::domain::case::{Case, CaseId, CaseStatus, CaseTerms, PaymentEvent};
use crate::domain::ports::{CaseFilter, SharedLedgerStore};
use crate::error::{ErrorKind, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Inbound operations, one per core operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Register {
        case: CaseId,
        debtor: String,
        amount: Decimal,
        #[serde(default)]
        currency: Option<String>,
        #[serde(default)]
        due_date: Option<NaiveDate>,
    },
    BeginCollection {
        case: CaseId,
    },
    ApplyPayment {
        case: CaseId,
        amount: Decimal,
        #[serde(default)]
        reference: Option<String>,
    },
    WriteOff {
        case: CaseId,
        reason: String,
    },
    Get {
        case: CaseId,
    },
    Payments {
        case: CaseId,
    },
    List {
        #[serde(default)]
        status: Option<CaseStatus>,
        #[serde(default)]
        created_from: Option<DateTime<Utc>>,
        #[serde(default)]
        created_until: Option<DateTime<Utc>>,
    },
    TotalsByStatus,
    CollectedInPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Dashboard {
        today: NaiveDate,
    },
    DebtorSummary {
        debtor: String,
        today: NaiveDate,
    },
    TopDebtors {
        limit: usize,
        #[serde(default)]
        sort_by: DebtorRanking,
        today: NaiveDate,
    },
    LatePayments {
        debtor: String,
    },
}

impl Request {
    /// Requests re-run on a lost optimistic-concurrency race. A conflict on
    /// `Register` means the id is taken, which no retry can change.
    fn retries_on_conflict(&self) -> bool {
        matches!(
            self,
            Request::BeginCollection { .. }
                | Request::ApplyPayment { .. }
                | Request::WriteOff { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Case(Case),
    Payment(PaymentReceipt),
    Payments(Vec<PaymentEvent>),
    Cases(Vec<Case>),
    Totals(StatusTotals),
    Amount(Decimal),
    Dashboard(DashboardSummary),
    Debtor(DebtorSummary),
    Debtors(Vec<DebtorSummary>),
    LatePayments(Vec<LatePayment>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of one request, tagged `success` or `failure`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "body", rename_all = "snake_case")]
pub enum Response {
    Success(Reply),
    Failure(Failure),
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Response::Failure(f) => Some(f.kind),
            Response::Success(_) => None,
        }
    }
}

impl From<Result<Reply>> for Response {
    fn from(result: Result<Reply>) -> Self {
        match result {
            Ok(reply) => Response::Success(reply),
            Err(e) => Response::Failure(Failure {
                kind: e.kind(),
                message: e.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub message: &'static str,
}

/// Translates requests into ledger calls.
///
/// State-changing requests that lose an optimistic-concurrency race are
/// re-run from a fresh read, up to the configured retry budget; every other
/// failure is returned as-is.
#[derive(Clone)]
pub struct RequestHandler {
    ledger: CollectionsLedger,
    aggregation: AggregationEngine,
    retry: RetryPolicy,
}

impl RequestHandler {
    pub fn new(store: SharedLedgerStore, config: &LedgerConfig) -> Self {
        Self {
            ledger: CollectionsLedger::new(store.clone(), config),
            aggregation: AggregationEngine::new(store, config),
            retry: RetryPolicy {
                max_retries: config.max_retries,
            },
        }
    }

    pub fn ledger(&self) -> &CollectionsLedger {
        &self.ledger
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            message: "alacak360 ledger is running",
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let result = if request.retries_on_conflict() {
            retry_on_conflict(self.retry, || self.dispatch(&request)).await
        } else {
            self.dispatch(&request).await
        };
        if let Err(e) = &result {
            tracing::debug!(kind = ?e.kind(), error = %e, "request rejected");
        }
        result.into()
    }

    async fn dispatch(&self, request: &Request) -> Result<Reply> {
        match request {
            Request::Register {
                case,
                debtor,
                amount,
                currency,
                due_date,
            } => {
                let terms = CaseTerms {
                    currency: currency.clone(),
                    due_date: *due_date,
                };
                let case = self.ledger.register(case.clone(), debtor, *amount, terms).await?;
                Ok(Reply::Case(case))
            }
            Request::BeginCollection { case } => {
                Ok(Reply::Case(self.ledger.begin_collection(case).await?))
            }
            Request::ApplyPayment {
                case,
                amount,
                reference,
            } => {
                let receipt = self
                    .ledger
                    .apply_payment(case, *amount, reference.clone())
                    .await?;
                Ok(Reply::Payment(receipt))
            }
            Request::WriteOff { case, reason } => {
                Ok(Reply::Case(self.ledger.write_off(case, reason).await?))
            }
            Request::Get { case } => Ok(Reply::Case(self.ledger.get(case).await?)),
            Request::Payments { case } => {
                // distinguish "no payments yet" from "no such case"
                self.ledger.get(case).await?;
                Ok(Reply::Payments(self.ledger.payments(case).await?))
            }
            Request::List {
                status,
                created_from,
                created_until,
            } => {
                let filter = CaseFilter {
                    status: *status,
                    created_from: *created_from,
                    created_until: *created_until,
                };
                let list = self.ledger.list(filter).await?;
                Ok(Reply::Cases(list.iter().cloned().collect()))
            }
            Request::TotalsByStatus => Ok(Reply::Totals(self.aggregation.totals_by_status().await?)),
            Request::CollectedInPeriod { start, end } => Ok(Reply::Amount(
                self.aggregation.collected_in_period(*start, *end).await?,
            )),
            Request::Dashboard { today } => {
                Ok(Reply::Dashboard(self.aggregation.dashboard(*today).await?))
            }
            Request::DebtorSummary { debtor, today } => Ok(Reply::Debtor(
                self.aggregation.debtor_summary(debtor, *today).await?,
            )),
            Request::TopDebtors {
                limit,
                sort_by,
                today,
            } => Ok(Reply::Debtors(
                self.aggregation.top_debtors(*limit, *sort_by, *today).await?,
            )),
            Request::LatePayments { debtor } => {
                Ok(Reply::LatePayments(self.aggregation.late_payments(debtor).await?))
            }
        }
    }
}
