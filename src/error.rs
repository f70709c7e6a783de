use crate::domain::case::{CaseId, CaseStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Cannot {action} case {case} in status {status}")]
    InvalidTransition {
        case: CaseId,
        status: CaseStatus,
        action: &'static str,
    },
    #[error("Payment of {requested} exceeds outstanding balance {balance}")]
    OverPayment { requested: Decimal, balance: Decimal },
    #[error("Version conflict on case {case}: expected {expected}, found {actual}")]
    VersionConflict {
        case: CaseId,
        expected: u64,
        actual: u64,
    },
    #[error("Case not found: {0}")]
    NotFound(CaseId),
    #[error("Debtor not found: {0}")]
    DebtorNotFound(String),
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Serializable failure tag surfaced at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidAmount,
    InvalidTransition,
    OverPayment,
    VersionConflict,
    NotFound,
    Timeout,
    Validation,
    Internal,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            LedgerError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            LedgerError::OverPayment { .. } => ErrorKind::OverPayment,
            LedgerError::VersionConflict { .. } => ErrorKind::VersionConflict,
            LedgerError::NotFound(_) | LedgerError::DebtorNotFound(_) => ErrorKind::NotFound,
            LedgerError::Timeout(_) => ErrorKind::Timeout,
            LedgerError::Validation(_) | LedgerError::Csv(_) => ErrorKind::Validation,
            LedgerError::Io(_) | LedgerError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        LedgerError::Internal(Box::new(std::io::Error::other(message.into())))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(e: rocksdb::Error) -> Self {
        LedgerError::Internal(Box::new(e))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Internal(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
