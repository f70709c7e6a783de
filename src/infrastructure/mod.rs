pub mod in_memory;
pub mod records;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

use crate::config::LedgerConfig;
use crate::domain::ports::SharedLedgerStore;
use crate::error::Result;
use in_memory::InMemoryLedgerStore;
use std::sync::Arc;

/// Builds the store selected by `config`.
///
/// Without the `storage-rocksdb` feature a requested database path is ignored
/// with a warning and the in-memory store is used instead.
pub fn open_store(config: &LedgerConfig) -> Result<SharedLedgerStore> {
    match &config.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            tracing::info!(path = %path.display(), "opening RocksDB ledger");
            Ok(Arc::new(self::rocksdb::RocksDBStore::open(path)?))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => {
            tracing::warn!(
                path = %path.display(),
                "persistent storage requested but the 'storage-rocksdb' feature is not enabled; falling back to in-memory storage"
            );
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
        None => Ok(Arc::new(InMemoryLedgerStore::new())),
    }
}
