//! Domain layer: receivable cases, their state machine and the storage port.

pub mod case;
pub mod money;
pub mod ports;
