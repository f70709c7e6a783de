use crate::error::{LedgerError, Result};
use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Process-wide settings, built once at start-up and passed down explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Location of the persistent store. `None` selects the in-memory store.
    pub db_path: Option<PathBuf>,
    /// Upper bound for any single store call.
    pub store_timeout: Duration,
    /// Extra attempts granted to a request that hit a version conflict.
    pub max_retries: u32,
    /// Annual cost of cash in percent, used to price late payments.
    pub cost_of_cash_annual: Decimal,
    /// Annual late fee rate in percent, accrued on unpaid overdue balances.
    pub late_fee_rate_annual: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            store_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            cost_of_cash_annual: dec!(45),
            late_fee_rate_annual: dec!(36),
        }
    }
}

/// Command-line and environment surface of [`LedgerConfig`].
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "ALACAK360_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Timeout for each store call, in milliseconds.
    #[arg(long, global = true, env = "ALACAK360_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Retries granted to a request that lost an optimistic-concurrency race.
    #[arg(long, global = true, env = "ALACAK360_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Annual cost of cash (%).
    #[arg(long, global = true, env = "ALACAK360_COST_OF_CASH")]
    pub cost_of_cash: Option<Decimal>,

    /// Annual late fee rate (%).
    #[arg(long, global = true, env = "ALACAK360_LATE_FEE_RATE")]
    pub late_fee_rate: Option<Decimal>,
}

impl LedgerConfig {
    pub fn from_args(args: LedgerArgs) -> Result<Self> {
        let defaults = Self::default();
        if args.timeout_ms == 0 {
            return Err(LedgerError::Validation("timeout must be positive".into()));
        }
        let cost_of_cash_annual = args.cost_of_cash.unwrap_or(defaults.cost_of_cash_annual);
        let late_fee_rate_annual = args.late_fee_rate.unwrap_or(defaults.late_fee_rate_annual);
        if cost_of_cash_annual < Decimal::ZERO || late_fee_rate_annual < Decimal::ZERO {
            return Err(LedgerError::Validation("rates must not be negative".into()));
        }

        Ok(Self {
            db_path: args.db_path,
            store_timeout: Duration::from_millis(args.timeout_ms),
            max_retries: args.max_retries,
            cost_of_cash_annual,
            late_fee_rate_annual,
        })
    }
}
