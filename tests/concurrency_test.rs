use alacak360::application::ledger::CollectionsLedger;
use alacak360::config::LedgerConfig;
use alacak360::domain::case::{Case, CaseId, CaseStatus, CaseTerms};
use alacak360::domain::money::Balance;
use alacak360::domain::ports::{LedgerStore, SharedLedgerStore};
use alacak360::error::{ErrorKind, LedgerError};
use alacak360::infrastructure::in_memory::InMemoryLedgerStore;
use alacak360::interfaces::handler::Request;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

mod common;

#[tokio::test]
async fn test_racing_writers_on_same_version() {
    let store: SharedLedgerStore = Arc::new(InMemoryLedgerStore::new());
    let id = CaseId::new("R-1");
    let case = Case::register(id.clone(), "Race", dec!(1000), CaseTerms::default(), Utc::now()).unwrap();
    store.put(case, 0).await.unwrap();

    let read = store.get(&id).await.unwrap();
    let (a, event_a) = read.apply_payment(dec!(300), None, Utc::now()).unwrap();
    let (b, event_b) = read.apply_payment(dec!(200), None, Utc::now()).unwrap();

    let (first, second) = tokio::join!(
        store.put_with_payment(a, read.version, event_a),
        store.put_with_payment(b, read.version, event_b),
    );

    let outcomes = [&first, &second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        loser,
        LedgerError::VersionConflict { expected: 1, actual: 2, .. }
    ));

    // the loser re-reads and succeeds
    let lost_amount = if first.is_err() { dec!(300) } else { dec!(200) };
    let ledger = CollectionsLedger::new(store.clone(), &LedgerConfig::default());
    ledger.apply_payment(&id, lost_amount, None).await.unwrap();

    let stored = store.get(&id).await.unwrap();
    assert_eq!(stored.balance, Balance::new(dec!(500)));
    assert_eq!(stored.version, 3);
    let seqs: Vec<u64> = store.payments(&id).await.unwrap().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payments_with_retries() {
    let config = LedgerConfig {
        max_retries: 32,
        ..LedgerConfig::default()
    };
    let (store, handler) = common::in_memory_handler(&config);
    handler
        .handle(Request::Register {
            case: "P".into(),
            debtor: "Parallel".into(),
            amount: dec!(1000),
            currency: None,
            due_date: None,
        })
        .await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let handler = handler.clone();
        handles.push(tokio::spawn(async move {
            handler
                .handle(Request::ApplyPayment {
                    case: "P".into(),
                    amount: dec!(10),
                    reference: Some(format!("T-{i}")),
                })
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    let case = store.get(&CaseId::new("P")).await.unwrap();
    assert_eq!(case.balance, Balance::new(dec!(800)));
    assert_eq!(case.version, 21);

    let events = store.payments(&case.id).await.unwrap();
    assert_eq!(events.len(), 20);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64 + 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_balance_matches_history_under_contention() {
    let (store, handler) = common::in_memory_handler(&LedgerConfig::default());
    handler
        .handle(Request::Register {
            case: "Q".into(),
            debtor: "Contended".into(),
            amount: dec!(100),
            currency: None,
            due_date: None,
        })
        .await;

    let mut handles = Vec::new();
    for _ in 0..30 {
        let handler = handler.clone();
        handles.push(tokio::spawn(async move {
            handler
                .handle(Request::ApplyPayment {
                    case: "Q".into(),
                    amount: dec!(7),
                    reference: None,
                })
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        let response = handle.await.unwrap();
        match response.failure_kind() {
            None => accepted += 1,
            // budget exhausted, or the balance ran out
            Some(kind) => assert!(matches!(
                kind,
                ErrorKind::VersionConflict | ErrorKind::OverPayment
            )),
        }
    }

    let case = store.get(&CaseId::new("Q")).await.unwrap();
    let events = store.payments(&case.id).await.unwrap();
    let paid: Decimal = events.iter().map(|e| e.amount.value()).sum();
    assert_eq!(events.len(), accepted);
    assert_eq!(case.balance.value(), dec!(100) - paid);
    assert!(case.balance.value() >= Decimal::ZERO);
    assert_ne!(case.status, CaseStatus::Paid);
}
