use alacak360::config::LedgerConfig;
use alacak360::domain::ports::SharedLedgerStore;
use alacak360::infrastructure::in_memory::InMemoryLedgerStore;
use alacak360::interfaces::handler::RequestHandler;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub const HEADER: [&str; 8] = [
    "op", "case", "debtor", "amount", "currency", "due_date", "reason", "reference",
];

#[allow(dead_code)]
pub fn in_memory_handler(config: &LedgerConfig) -> (SharedLedgerStore, RequestHandler) {
    let store: SharedLedgerStore = Arc::new(InMemoryLedgerStore::new());
    let handler = RequestHandler::new(store.clone(), config);
    (store, handler)
}

/// Registers `cases` receivables of 100 each and pays each one off in
/// `payments_per_case` equal instalments.
#[allow(dead_code)]
pub fn generate_requests_csv(path: &Path, cases: usize, payments_per_case: u32) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(HEADER)?;

    let instalment = (rust_decimal::Decimal::from(100) / rust_decimal::Decimal::from(payments_per_case))
        .to_string();
    for i in 1..=cases {
        let case = format!("INV-{i}");
        let debtor = format!("Debtor {}", i % 7);
        wtr.write_record(["register", &case, &debtor, "100", "TRY", "", "", ""])?;
        for p in 1..=payments_per_case {
            let reference = format!("{case}/{p}");
            wtr.write_record(["apply_payment", &case, "", &instalment, "", "", "", &reference])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
