//! Boundary between the outside world and the ledger: the transport-free
//! request handler and the CSV batch formats used by the binary.

pub mod csv;
pub mod handler;
