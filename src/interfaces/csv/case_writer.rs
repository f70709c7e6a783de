use crate::domain::case::{Case, CaseStatus};
use crate::error::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct CaseRow<'a> {
    case: &'a str,
    debtor: &'a str,
    currency: &'a str,
    original_amount: Decimal,
    balance: Decimal,
    collected: Decimal,
    status: CaseStatus,
    due_date: Option<NaiveDate>,
    payments: u64,
    version: u64,
}

impl<'a> From<&'a Case> for CaseRow<'a> {
    fn from(case: &'a Case) -> Self {
        Self {
            case: case.id.as_str(),
            debtor: &case.debtor,
            currency: &case.currency,
            original_amount: case.original_amount.value().normalize(),
            balance: case.balance.value().normalize(),
            collected: case.collected().value().normalize(),
            status: case.status,
            due_date: case.due_date,
            payments: case.payment_count,
            version: case.version,
        }
    }
}

/// Writes the final state of cases as CSV, one row per case.
pub struct CaseWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CaseWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_cases<'a>(&mut self, cases: impl IntoIterator<Item = &'a Case>) -> Result<()> {
        for case in cases {
            self.writer.serialize(CaseRow::from(case))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
