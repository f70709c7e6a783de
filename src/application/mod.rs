//! Application layer: the optimistic write cycle, conflict retries and the
//! read-side aggregation.
//!
//! [`ledger::CollectionsLedger`] drives the case state machine against a
//! `LedgerStore`; [`aggregation::AggregationEngine`] answers dashboard queries
//! from store snapshots.

pub mod aggregation;
pub mod ledger;
pub mod retry;
