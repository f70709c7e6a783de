//! Receivables ledger: debtor cases, their collection lifecycle, payment
//! events and dashboard aggregates.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod logging;
