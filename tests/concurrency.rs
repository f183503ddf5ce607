//! Independent workers (separate connections) racing on the same member.


use std::sync::{Arc, Barrier};
use std::thread;

use harness::{seed_line, Harness};
use referral_ledger::{Buckets, EarningsType, ErrorKind, LedgerResult};

fn race<T, F>(h: &Harness, workers: usize, op: F) -> Vec<LedgerResult<T>>
where
    T: Send + 'static,
    F: Fn(&mut referral_ledger::LedgerEngine) -> LedgerResult<T> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let mut engine = h.engine();
            let op = Arc::clone(&op);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                op(&mut engine)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().expect("worker panicked"))
        .collect()
}

#[test]
fn concurrent_withdrawals_only_one_wins() {
    let h = Harness::new();
    let member = {
        let mut engine = h.engine();
        seed_line(&mut engine, "c", 1)[0]
    };
    h.seed_balance(member, Buckets::new(0.0, 500.0, 0.0));

    let results = race(&h, 2, move |engine| {
        engine.request_withdrawal(member, EarningsType::Package, 100.0, "bank")
    });

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    let err = results.into_iter().find_map(|r| r.err()).unwrap();
    assert_eq!(err.kind(), ErrorKind::DuplicateRequest);

    let engine = h.engine();
    assert_eq!(engine.balances(member).unwrap().primary_earnings, 400.0);
}

#[test]
fn concurrent_purchases_never_overspend() {
    let h = Harness::new();
    let (member, package) = {
        let mut engine = h.engine();
        let member = seed_line(&mut engine, "p", 2)[1];
        let package = engine.upsert_package(None, "Gold", 10.0, 30, true).unwrap();
        (member, package.id)
    };
    h.seed_balance(member, Buckets::new(100.0, 0.0, 0.0));

    let results = race(&h, 4, move |engine| engine.purchase(member, package, 40.0));

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 2);
    for err in results.into_iter().filter_map(|r| r.err()) {
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }

    let engine = h.engine();
    assert_eq!(engine.balances(member).unwrap().combined_balance, 20.0);
    assert_eq!(engine.connections(member).unwrap().len(), 2);
    assert!(engine.reconcile_all().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn service_tasks_serialize_on_the_database() {
    let h = Harness::new();
    let member = {
        let mut engine = h.engine();
        seed_line(&mut engine, "s", 1)[0]
    };
    h.seed_balance(member, Buckets::new(0.0, 0.0, 300.0));
    let service = h.service();

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .request_withdrawal(member, EarningsType::Referral, 50.0, "wallet".to_string())
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    let mut duplicate = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(_) => ok += 1,
            Err(e) if e.kind() == ErrorKind::DuplicateRequest => duplicate += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((ok, duplicate), (1, 2));

    let balances = service.balances(member).await.unwrap();
    assert_eq!(balances.referral_bounty, 250.0);
    assert!(service.reconcile(member).await.unwrap().consistent);
}
