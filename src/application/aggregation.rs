//! Read-side computations over a consistent snapshot of the ledger.
//!
//! Nothing here is cached: every call takes a fresh snapshot from the store,
//! so a sum can never mix the before and after of one transition.
//!
//! Sums and products are checked. A total that leaves the `Decimal` range is
//! reported as a `Validation` error instead of aborting the caller.

use crate::config::LedgerConfig;
use crate::domain::case::{Case, CaseId, CaseStatus, PaymentEvent};
use crate::domain::ports::{LedgerSnapshot, SharedLedgerStore};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use clap::ValueEnum;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub type StatusTotals = BTreeMap<CaseStatus, Decimal>;

const DAYS_PER_YEAR: Decimal = dec!(365);
const OVER_90_DAYS: i64 = 90;
const LOSS_WINDOW_DAYS: u64 = 30;

/// Annual percentages used to price lateness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub cost_of_cash_annual: Decimal,
    pub late_fee_rate_annual: Decimal,
}

impl From<&LedgerConfig> for Rates {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            cost_of_cash_annual: config.cost_of_cash_annual,
            late_fee_rate_annual: config.late_fee_rate_annual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyBreakdown {
    pub currency: String,
    pub total_open: Decimal,
    pub overdue: Decimal,
    pub over90: Decimal,
}

/// Aging, lateness and risk figures for a group of cases.
///
/// Balances cover non-terminal cases only; lateness losses cover every
/// payment made on a case with a due date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgingMetrics {
    pub open_cases: usize,
    pub total_open: Decimal,
    pub overdue: Decimal,
    pub over90: Decimal,
    pub weighted_overdue_days: Decimal,
    pub late_fee_unpaid: Decimal,
    pub loss_30d: Decimal,
    pub total_late_loss: Decimal,
    pub risk_score: Decimal,
}

/// Ledger-wide aging and risk overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub as_of: NaiveDate,
    #[serde(flatten)]
    pub metrics: AgingMetrics,
    pub cost_of_cash_annual: Decimal,
    pub late_fee_rate_annual: Decimal,
    pub totals_by_status: StatusTotals,
    pub by_currency: Vec<CurrencyBreakdown>,
}

/// Aging and risk figures of one debtor's cases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebtorSummary {
    pub debtor: String,
    #[serde(flatten)]
    pub metrics: AgingMetrics,
}

/// Key used to rank debtors, largest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DebtorRanking {
    #[default]
    Risk,
    Overdue,
    Unpaid,
    Loss,
    Balance,
}

impl DebtorRanking {
    fn key(self, metrics: &AgingMetrics) -> Decimal {
        match self {
            DebtorRanking::Risk => metrics.risk_score,
            DebtorRanking::Overdue => metrics.overdue,
            DebtorRanking::Unpaid => Decimal::from(metrics.open_cases),
            DebtorRanking::Loss => metrics.total_late_loss,
            DebtorRanking::Balance => metrics.total_open,
        }
    }
}

/// One payment received after its case fell due.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatePayment {
    pub case: CaseId,
    pub seq: u64,
    pub paid_at: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub delay_days: i64,
    pub amount: Decimal,
    /// Delay days times amount.
    pub adat: Decimal,
    pub loss: Decimal,
}

fn overflow(what: &str) -> LedgerError {
    LedgerError::Validation(format!("{what} exceeds the representable decimal range"))
}

fn add(acc: &mut Decimal, value: Decimal, what: &str) -> Result<()> {
    *acc = acc.checked_add(value).ok_or_else(|| overflow(what))?;
    Ok(())
}

/// Saturates at `Decimal::MAX`; callers only pass non-negative values.
fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator.checked_div(denominator).unwrap_or(Decimal::MAX)
    }
}

/// Sum of outstanding balances per status; every status is present.
pub fn totals_by_status(snapshot: &LedgerSnapshot) -> Result<StatusTotals> {
    let mut totals: StatusTotals = CaseStatus::ALL.iter().map(|s| (*s, Decimal::ZERO)).collect();
    for case in &snapshot.cases {
        add(
            totals.entry(case.status).or_default(),
            case.balance.value(),
            "status total",
        )?;
    }
    Ok(totals)
}

/// Sum of payments with `start <= paid_at < end`.
pub fn collected_in_period(
    snapshot: &LedgerSnapshot,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Decimal> {
    let mut collected = Decimal::ZERO;
    for payment in snapshot
        .payments
        .iter()
        .filter(|p| p.paid_at >= start && p.paid_at < end)
    {
        add(&mut collected, payment.amount.value(), "collected total")?;
    }
    Ok(collected)
}

fn adat(amount: Decimal, delay_days: i64) -> Result<Decimal> {
    Decimal::from(delay_days)
        .checked_mul(amount)
        .ok_or_else(|| overflow("late payment weight"))
}

/// Cost of having received `amount` `delay_days` late, at `annual_rate` percent.
pub fn late_loss(amount: Decimal, delay_days: i64, annual_rate: Decimal) -> Result<Decimal> {
    if delay_days <= 0 || amount <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let weighted = adat(amount, delay_days)?
        .checked_mul(annual_rate)
        .ok_or_else(|| overflow("late payment loss"))?;
    Ok(weighted / dec!(100) / DAYS_PER_YEAR)
}

/// Four-component score in `[0, 100]`, rounded to two decimals.
///
/// Weights: overdue share 35%, 90+ share of overdue 30%, weighted overdue days
/// (120 days saturates) 20%, recent late-payment loss over open balance
/// (scaled by 1000) 15%.
pub fn risk_score(
    overdue_ratio: Decimal,
    over90_ratio: Decimal,
    weighted_days: Decimal,
    loss_ratio: Decimal,
) -> Decimal {
    let percent = |v: Decimal, scale: Decimal| {
        v.checked_mul(scale)
            .unwrap_or(Decimal::MAX)
            .clamp(Decimal::ZERO, dec!(100))
    };
    let score = dec!(0.35) * percent(overdue_ratio, dec!(100))
        + dec!(0.30) * percent(over90_ratio, dec!(100))
        + dec!(0.20) * percent(weighted_days / dec!(120), dec!(100))
        + dec!(0.15) * percent(loss_ratio, dec!(1000));
    score.round_dp(2)
}

/// Aging of `cases`, with losses taken from those of `payments` that belong
/// to a dated case in `cases`.
fn aging(
    cases: &[&Case],
    payments: &[&PaymentEvent],
    today: NaiveDate,
    rates: Rates,
) -> Result<(AgingMetrics, Vec<CurrencyBreakdown>)> {
    let mut metrics = AgingMetrics::default();
    let mut overdue_day_weight = Decimal::ZERO;
    let mut late_fee_unpaid = Decimal::ZERO;
    let mut by_currency: BTreeMap<&str, CurrencyBreakdown> = BTreeMap::new();

    for case in cases.iter().filter(|c| !c.status.is_terminal()) {
        let balance = case.balance.value();
        let bucket = by_currency
            .entry(case.currency.as_str())
            .or_insert_with(|| CurrencyBreakdown {
                currency: case.currency.clone(),
                total_open: Decimal::ZERO,
                overdue: Decimal::ZERO,
                over90: Decimal::ZERO,
            });
        metrics.open_cases += 1;
        add(&mut metrics.total_open, balance, "open balance")?;
        add(&mut bucket.total_open, balance, "open balance")?;

        if let Some(days) = case.days_past_due(today) {
            add(&mut metrics.overdue, balance, "overdue balance")?;
            add(&mut bucket.overdue, balance, "overdue balance")?;
            add(&mut overdue_day_weight, adat(balance, days)?, "overdue weight")?;
            add(
                &mut late_fee_unpaid,
                late_loss(balance, days, rates.late_fee_rate_annual)?,
                "late fee",
            )?;
            if days > OVER_90_DAYS {
                add(&mut metrics.over90, balance, "90+ balance")?;
                add(&mut bucket.over90, balance, "90+ balance")?;
            }
        }
    }

    let due_dates: HashMap<&CaseId, NaiveDate> = cases
        .iter()
        .filter_map(|c| c.due_date.map(|d| (&c.id, d)))
        .collect();
    let window_start = today
        .checked_sub_days(Days::new(LOSS_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MIN);

    let mut loss_30d = Decimal::ZERO;
    let mut total_late_loss = Decimal::ZERO;
    for payment in payments {
        let Some(due) = due_dates.get(&payment.case_id) else {
            continue;
        };
        let paid_on = payment.paid_at.date_naive();
        let loss = late_loss(
            payment.amount.value(),
            (paid_on - *due).num_days(),
            rates.cost_of_cash_annual,
        )?;
        add(&mut total_late_loss, loss, "late payment loss")?;
        if paid_on >= window_start {
            add(&mut loss_30d, loss, "late payment loss")?;
        }
    }

    let weighted_overdue_days = ratio(overdue_day_weight, metrics.overdue);
    metrics.risk_score = risk_score(
        ratio(metrics.overdue, metrics.total_open),
        ratio(metrics.over90, metrics.overdue),
        weighted_overdue_days,
        ratio(loss_30d, metrics.total_open),
    );
    metrics.weighted_overdue_days = weighted_overdue_days.round_dp(2);
    metrics.late_fee_unpaid = late_fee_unpaid.round_dp(2);
    metrics.loss_30d = loss_30d.round_dp(2);
    metrics.total_late_loss = total_late_loss.round_dp(2);

    Ok((metrics, by_currency.into_values().collect()))
}

pub fn dashboard(snapshot: &LedgerSnapshot, today: NaiveDate, rates: Rates) -> Result<DashboardSummary> {
    let cases: Vec<&Case> = snapshot.cases.iter().collect();
    let payments: Vec<&PaymentEvent> = snapshot.payments.iter().collect();
    let (metrics, by_currency) = aging(&cases, &payments, today, rates)?;

    Ok(DashboardSummary {
        as_of: today,
        metrics,
        cost_of_cash_annual: rates.cost_of_cash_annual,
        late_fee_rate_annual: rates.late_fee_rate_annual,
        totals_by_status: totals_by_status(snapshot)?,
        by_currency,
    })
}

#[derive(Default)]
struct DebtorBook<'a> {
    cases: Vec<&'a Case>,
    payments: Vec<&'a PaymentEvent>,
}

fn books_by_debtor(snapshot: &LedgerSnapshot) -> BTreeMap<&str, DebtorBook<'_>> {
    let mut books: BTreeMap<&str, DebtorBook<'_>> = BTreeMap::new();
    let mut owners: HashMap<&CaseId, &str> = HashMap::new();
    for case in &snapshot.cases {
        owners.insert(&case.id, case.debtor.as_str());
        books.entry(case.debtor.as_str()).or_default().cases.push(case);
    }
    for payment in &snapshot.payments {
        if let Some(book) = owners
            .get(&payment.case_id)
            .and_then(|debtor| books.get_mut(debtor))
        {
            book.payments.push(payment);
        }
    }
    books
}

fn debtor_book<'a>(snapshot: &'a LedgerSnapshot, debtor: &str) -> Result<DebtorBook<'a>> {
    let cases: Vec<&Case> = snapshot.cases.iter().filter(|c| c.debtor == debtor).collect();
    if cases.is_empty() {
        return Err(LedgerError::DebtorNotFound(debtor.to_string()));
    }
    let payments = snapshot
        .payments
        .iter()
        .filter(|p| cases.iter().any(|c| c.id == p.case_id))
        .collect();
    Ok(DebtorBook { cases, payments })
}

/// Aging of every case registered against `debtor`.
pub fn debtor_summary(
    snapshot: &LedgerSnapshot,
    debtor: &str,
    today: NaiveDate,
    rates: Rates,
) -> Result<DebtorSummary> {
    let book = debtor_book(snapshot, debtor)?;
    let (metrics, _) = aging(&book.cases, &book.payments, today, rates)?;
    Ok(DebtorSummary {
        debtor: debtor.to_string(),
        metrics,
    })
}

/// Debtors ranked by `ranking`, largest first, ties broken by name.
pub fn top_debtors(
    snapshot: &LedgerSnapshot,
    limit: usize,
    ranking: DebtorRanking,
    today: NaiveDate,
    rates: Rates,
) -> Result<Vec<DebtorSummary>> {
    let mut ranked = books_by_debtor(snapshot)
        .into_iter()
        .map(|(debtor, book)| -> Result<DebtorSummary> {
            let (metrics, _) = aging(&book.cases, &book.payments, today, rates)?;
            Ok(DebtorSummary {
                debtor: debtor.to_string(),
                metrics,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    ranked.sort_by(|a, b| {
        ranking
            .key(&b.metrics)
            .cmp(&ranking.key(&a.metrics))
            .then_with(|| a.debtor.cmp(&b.debtor))
    });
    ranked.truncate(limit);
    Ok(ranked)
}

/// Payments of `debtor` made after their case's due date, oldest first.
pub fn late_payments(
    snapshot: &LedgerSnapshot,
    debtor: &str,
    cost_of_cash_annual: Decimal,
) -> Result<Vec<LatePayment>> {
    let book = debtor_book(snapshot, debtor)?;
    let due_dates: HashMap<&CaseId, NaiveDate> = book
        .cases
        .iter()
        .filter_map(|c| c.due_date.map(|d| (&c.id, d)))
        .collect();

    let mut late = Vec::new();
    for payment in book.payments {
        let Some(due_date) = due_dates.get(&payment.case_id).copied() else {
            continue;
        };
        let delay_days = (payment.paid_at.date_naive() - due_date).num_days();
        if delay_days <= 0 {
            continue;
        }
        let amount = payment.amount.value();
        late.push(LatePayment {
            case: payment.case_id.clone(),
            seq: payment.seq,
            paid_at: payment.paid_at,
            due_date,
            delay_days,
            amount,
            adat: adat(amount, delay_days)?,
            loss: late_loss(amount, delay_days, cost_of_cash_annual)?.round_dp(2),
        });
    }
    late.sort_by(|a, b| {
        a.paid_at
            .cmp(&b.paid_at)
            .then_with(|| a.case.cmp(&b.case))
            .then_with(|| a.seq.cmp(&b.seq))
    });
    Ok(late)
}

/// Store-backed front for the functions above.
#[derive(Clone)]
pub struct AggregationEngine {
    store: SharedLedgerStore,
    timeout: Duration,
    rates: Rates,
}

impl AggregationEngine {
    pub fn new(store: SharedLedgerStore, config: &LedgerConfig) -> Self {
        Self {
            store,
            timeout: config.store_timeout,
            rates: Rates::from(config),
        }
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot> {
        tokio::time::timeout(self.timeout, self.store.snapshot())
            .await
            .map_err(|_| LedgerError::Timeout(self.timeout))?
    }

    pub async fn totals_by_status(&self) -> Result<StatusTotals> {
        totals_by_status(&self.snapshot().await?)
    }

    pub async fn collected_in_period(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Decimal> {
        if end < start {
            return Err(LedgerError::Validation(
                "period end precedes its start".into(),
            ));
        }
        collected_in_period(&self.snapshot().await?, start, end)
    }

    pub async fn dashboard(&self, today: NaiveDate) -> Result<DashboardSummary> {
        dashboard(&self.snapshot().await?, today, self.rates)
    }

    pub async fn debtor_summary(&self, debtor: &str, today: NaiveDate) -> Result<DebtorSummary> {
        debtor_summary(&self.snapshot().await?, debtor, today, self.rates)
    }

    pub async fn top_debtors(
        &self,
        limit: usize,
        ranking: DebtorRanking,
        today: NaiveDate,
    ) -> Result<Vec<DebtorSummary>> {
        top_debtors(&self.snapshot().await?, limit, ranking, today, self.rates)
    }

    pub async fn late_payments(&self, debtor: &str) -> Result<Vec<LatePayment>> {
        late_payments(
            &self.snapshot().await?,
            debtor,
            self.rates.cost_of_cash_annual,
        )
    }
}
