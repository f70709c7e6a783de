use crate::domain::case::CaseId;
use crate::error::{LedgerError, Result};
use crate::interfaces::handler::Request;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum RequestOp {
    Register,
    BeginCollection,
    ApplyPayment,
    WriteOff,
}

/// One CSV row. Columns not used by an operation are left empty.
#[derive(Debug, Deserialize)]
struct RequestRow {
    op: RequestOp,
    case: String,
    debtor: Option<String>,
    /// Kept as text so amounts never pass through floating point.
    amount: Option<String>,
    currency: Option<String>,
    due_date: Option<NaiveDate>,
    reason: Option<String>,
    reference: Option<String>,
}

impl TryFrom<RequestRow> for Request {
    type Error = LedgerError;

    fn try_from(row: RequestRow) -> Result<Self> {
        let case = CaseId::new(row.case);
        let missing = |field: &str| {
            LedgerError::Validation(format!("{:?} on case {case} is missing '{field}'", row.op))
        };
        let amount = row
            .amount
            .as_deref()
            .map(|raw| {
                raw.parse::<Decimal>().map_err(|e| {
                    LedgerError::Validation(format!("invalid amount '{raw}' on case {case}: {e}"))
                })
            })
            .transpose()?;
        let request = match row.op {
            RequestOp::Register => Request::Register {
                debtor: row.debtor.clone().ok_or_else(|| missing("debtor"))?,
                amount: amount.ok_or_else(|| missing("amount"))?,
                currency: row.currency,
                due_date: row.due_date,
                case,
            },
            RequestOp::BeginCollection => Request::BeginCollection { case },
            RequestOp::ApplyPayment => Request::ApplyPayment {
                amount: amount.ok_or_else(|| missing("amount"))?,
                reference: row.reference,
                case,
            },
            RequestOp::WriteOff => Request::WriteOff {
                reason: row.reason.clone().ok_or_else(|| missing("reason"))?,
                case,
            },
        };
        Ok(request)
    }
}

/// Reads state-changing requests from a CSV source with the header
/// `op, case, debtor, amount, currency, due_date, reason, reference`.
///
/// Whitespace around fields is trimmed and short rows are accepted, so a
/// `begin_collection` line may stop after the case column.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields one request per row; a bad row does not stop the stream.
    pub fn requests(self) -> impl Iterator<Item = Result<Request>> {
        self.reader.into_deserialize().map(|result| {
            let row: RequestRow = result?;
            Request::try_from(row)
        })
    }
}
