use super::records::{CaseRecord, PaymentRecord};
use crate::domain::case::{Case, CaseId, PaymentEvent};
use crate::domain::ports::{LedgerSnapshot, LedgerStore};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Column Family for case records, keyed by case id.
pub const CF_CASES: &str = "cases";
/// Column Family for payment events, keyed by case id, a NUL separator and the
/// big-endian sequence number, so one case's events are contiguous and ordered.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent ledger backed by RocksDB.
///
/// All calls run on tokio's blocking pool so that a caller-side timeout can
/// abandon them. Conditional writes are serialized by `commit_lock`: the
/// version check and the `WriteBatch` covering case and payment happen under it.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating the
    /// `cases` and `payments` column families if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_cases = ColumnFamilyDescriptor::new(CF_CASES, Options::default());
        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_cases, cf_payments])?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&RocksDBStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| LedgerError::Internal(Box::new(e)))?
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::internal(format!("{name} column family not found")))
    }

    fn read_case(&self, id: &CaseId) -> Result<Option<Case>> {
        let cf = self.cf(CF_CASES)?;
        match self.db.get_cf(cf, id.as_str().as_bytes())? {
            Some(bytes) => {
                let record: CaseRecord = serde_json::from_slice(&bytes)?;
                Ok(Some(Case::try_from(record)?))
            }
            None => Ok(None),
        }
    }

    fn payment_exists(&self, id: &CaseId, seq: u64) -> Result<bool> {
        let cf = self.cf(CF_PAYMENTS)?;
        Ok(self.db.get_pinned_cf(cf, payment_key(id, seq))?.is_some())
    }

    fn check_append(&self, event: &PaymentEvent) -> Result<()> {
        let taken = self.payment_exists(&event.case_id, event.seq)?;
        let gap = event.seq > 1 && !self.payment_exists(&event.case_id, event.seq - 1)?;
        if event.seq == 0 || taken || gap {
            return Err(LedgerError::Validation(format!(
                "payment {} for case {} is out of sequence",
                event.seq, event.case_id
            )));
        }
        Ok(())
    }

    fn commit(&self, case: Option<(Case, u64)>, event: Option<PaymentEvent>) -> Result<u64> {
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| LedgerError::internal("commit lock poisoned"))?;

        for id in case.iter().map(|(c, _)| &c.id).chain(event.iter().map(|e| &e.case_id)) {
            check_key(id)?;
        }

        let mut batch = WriteBatch::default();
        let mut version = 0;

        if let Some((mut case, expected)) = case {
            let actual = self.read_case(&case.id)?.map_or(0, |c| c.version);
            if actual != expected {
                return Err(LedgerError::VersionConflict {
                    case: case.id,
                    expected,
                    actual,
                });
            }
            case.version = expected + 1;
            version = case.version;
            let value = serde_json::to_vec(&CaseRecord::from(&case))?;
            batch.put_cf(self.cf(CF_CASES)?, case.id.as_str().as_bytes(), value);
        }

        if let Some(event) = event {
            self.check_append(&event)?;
            let value = serde_json::to_vec(&PaymentRecord::from(&event))?;
            batch.put_cf(
                self.cf(CF_PAYMENTS)?,
                payment_key(&event.case_id, event.seq),
                value,
            );
        }

        self.db.write(batch)?;
        tracing::debug!(version, "rocksdb batch committed");
        Ok(version)
    }

    fn read_payments(&self, id: &CaseId) -> Result<Vec<PaymentEvent>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let prefix = payment_prefix(id);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward));

        let mut events = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let record: PaymentRecord = serde_json::from_slice(&value)?;
            events.push(PaymentEvent::try_from(record)?);
        }
        Ok(events)
    }

    fn read_snapshot(&self) -> Result<LedgerSnapshot> {
        let snapshot = self.db.snapshot();

        let mut cases = Vec::new();
        for item in snapshot.iterator_cf(self.cf(CF_CASES)?, IteratorMode::Start) {
            let (_key, value) = item?;
            let record: CaseRecord = serde_json::from_slice(&value)?;
            cases.push(Case::try_from(record)?);
        }

        let mut payments = Vec::new();
        for item in snapshot.iterator_cf(self.cf(CF_PAYMENTS)?, IteratorMode::Start) {
            let (_key, value) = item?;
            let record: PaymentRecord = serde_json::from_slice(&value)?;
            payments.push(PaymentEvent::try_from(record)?);
        }

        Ok(LedgerSnapshot { cases, payments })
    }
}

/// Payment keys use NUL as the id terminator, so ids must not contain it.
fn check_key(id: &CaseId) -> Result<()> {
    if id.as_str().contains('\0') {
        return Err(LedgerError::Validation(format!(
            "case id {:?} cannot be stored",
            id.as_str()
        )));
    }
    Ok(())
}

fn payment_prefix(id: &CaseId) -> Vec<u8> {
    let mut key = id.as_str().as_bytes().to_vec();
    key.push(0);
    key
}

fn payment_key(id: &CaseId, seq: u64) -> Vec<u8> {
    let mut key = payment_prefix(id);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn get(&self, id: &CaseId) -> Result<Case> {
        let id = id.clone();
        self.blocking(move |store| store.read_case(&id)?.ok_or(LedgerError::NotFound(id)))
            .await
    }

    async fn put(&self, case: Case, expected_version: u64) -> Result<u64> {
        self.blocking(move |store| store.commit(Some((case, expected_version)), None))
            .await
    }

    async fn append_payment(&self, event: PaymentEvent) -> Result<()> {
        self.blocking(move |store| store.commit(None, Some(event)).map(|_| ()))
            .await
    }

    async fn put_with_payment(
        &self,
        case: Case,
        expected_version: u64,
        event: PaymentEvent,
    ) -> Result<u64> {
        self.blocking(move |store| store.commit(Some((case, expected_version)), Some(event)))
            .await
    }

    async fn payments(&self, id: &CaseId) -> Result<Vec<PaymentEvent>> {
        let id = id.clone();
        self.blocking(move |store| store.read_payments(&id)).await
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.blocking(|store| store.read_snapshot()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::case::CaseTerms;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn new_case(id: &str) -> Case {
        Case::register(id.into(), "A", dec!(100), CaseTerms::default(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_CASES).is_some());
        assert!(store.db.cf_handle(CF_PAYMENTS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_conditional_put() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        assert_eq!(store.put(new_case("1"), 0).await.unwrap(), 1);
        assert!(matches!(
            store.put(new_case("1"), 0).await,
            Err(LedgerError::VersionConflict { actual: 1, .. })
        ));

        let stored = store.get(&"1".into()).await.unwrap();
        assert_eq!(stored.debtor, "A");
        assert!(matches!(
            store.get(&"2".into()).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rocksdb_payments_are_ordered_per_case() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        store.put(new_case("1"), 0).await.unwrap();
        store.put(new_case("10"), 0).await.unwrap();

        let mut case = store.get(&"1".into()).await.unwrap();
        for _ in 0..3 {
            let (next, event) = case.apply_payment(dec!(10), None, Utc::now()).unwrap();
            store.put_with_payment(next, case.version, event).await.unwrap();
            case = store.get(&"1".into()).await.unwrap();
        }
        let other = store.get(&"10".into()).await.unwrap();
        let (next, event) = other.apply_payment(dec!(5), None, Utc::now()).unwrap();
        store.put_with_payment(next, 1, event).await.unwrap();

        let events = store.payments(&"1".into()).await.unwrap();
        let seqs: Vec<_> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(case.balance.value(), dec!(70));

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.cases.len(), 2);
        assert_eq!(snapshot.payments.len(), 4);
    }

    #[tokio::test]
    async fn test_rocksdb_rejects_nul_in_case_id() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        store.put(new_case("a"), 0).await.unwrap();

        let mut shadow = new_case("a");
        shadow.id = CaseId::new("a\0b");
        assert!(matches!(
            store.put(shadow, 0).await,
            Err(LedgerError::Validation(_))
        ));
        assert!(store.payments(&"a".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rocksdb_reopen_keeps_state() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.put(new_case("1"), 0).await.unwrap();
        }
        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&"1".into()).await.unwrap().version, 1);
    }
}
