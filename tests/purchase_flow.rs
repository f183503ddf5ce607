//! Purchase orchestration against a file-backed ledger.


use harness::{seed_line, Harness};
use referral_ledger::purchase::PurchaseReceipt;
use referral_ledger::store::ledger::TxLogFilter;
use referral_ledger::{Buckets, ErrorKind, LedgerError};

#[test]
fn purchase_scenario_debits_buyer_and_pays_two_levels() {
    let h = Harness::new();
    let mut engine = h.engine();
    let line = seed_line(&mut engine, "m", 3);
    let (level2, level1, buyer) = (line[0], line[1], line[2]);
    let package = engine.upsert_package(None, "Gold", 10.0, 30, true).unwrap();
    h.seed_balance(buyer, Buckets::new(200.0, 500.0, 300.0));

    let receipt: PurchaseReceipt = engine.purchase(buyer, package.id, 300.0).unwrap();

    let after = engine.balances(buyer).unwrap();
    assert_eq!(after.combined_balance, 700.0);
    assert_eq!(after.primary_wallet, 0.0);
    assert_eq!(after.primary_earnings, 400.0);
    assert_eq!(after.referral_bounty, 300.0);
    assert!(receipt.is_reinvestment);
    assert_eq!(receipt.package_earnings, 30.0);

    assert_eq!(engine.balances(level1).unwrap().referral_bounty, 30.0);
    assert_eq!(engine.balances(level2).unwrap().referral_bounty, 4.5);

    let logged = engine.commissions(receipt.connection_id).unwrap();
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[0].referrer_id, level1);
    assert_eq!(logged[0].level, 1);

    let connections = engine.connections(buyer).unwrap();
    assert_eq!(connections.len(), 1);
    assert!(connections[0].is_reinvestment);
    assert_eq!(connections[0].earnings, 30.0);

    assert_eq!(engine.referrer(buyer).unwrap(), Some(level1));
    assert_eq!(engine.referrer(level2).unwrap(), None);

    // referrers were notified, buyer too
    assert_eq!(engine.notifications(level1, true).unwrap().len(), 1);
    assert_eq!(engine.notifications(buyer, true).unwrap().len(), 1);
    assert_eq!(engine.mark_notifications_read(level1).unwrap(), 1);
    assert!(engine.notifications(level1, true).unwrap().is_empty());
    assert_eq!(engine.notifications(level1, false).unwrap().len(), 1);
}

#[test]
fn deep_line_pays_exactly_ten_levels() {
    let h = Harness::new();
    let mut engine = h.engine();
    let line = seed_line(&mut engine, "d", 16);
    let buyer = *line.last().unwrap();
    let package = engine.upsert_package(None, "Gold", 5.0, 10, true).unwrap();
    h.seed_balance(buyer, Buckets::new(1000.0, 0.0, 0.0));

    let receipt = engine.purchase(buyer, package.id, 1000.0).unwrap();

    let levels: Vec<usize> = receipt.commissions.iter().map(|c| c.level).collect();
    assert_eq!(levels, (1..=10).collect::<Vec<_>>());
    let amounts: Vec<f64> = receipt.commissions.iter().map(|c| c.amount).collect();
    assert_eq!(
        amounts,
        vec![100.0, 15.0, 15.0, 15.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0]
    );
    // nearest ancestor first
    assert_eq!(receipt.commissions[0].referrer_id, line[14]);
    assert_eq!(receipt.commissions[9].referrer_id, line[5]);
    for beyond in &line[..5] {
        assert_eq!(engine.balances(*beyond).unwrap(), Buckets::default());
    }

    let funds = engine.company_funds().unwrap();
    assert_eq!(funds.reserve, -50.0);
    assert_eq!(funds.total_commissions, 205.0);
    assert!(engine.reconcile_all().unwrap().is_empty());
}

#[test]
fn corrupted_hierarchy_rolls_back_everything() {
    let h = Harness::new();
    let mut engine = h.engine();
    let line = seed_line(&mut engine, "c", 3);
    let buyer = line[2];
    let package = engine.upsert_package(None, "Gold", 10.0, 30, true).unwrap();
    h.seed_balance(buyer, Buckets::new(100.0, 0.0, 0.0));

    h.db()
        .conn()
        .execute(
            "UPDATE referrals SET hierarchy = ?1 WHERE member_id = ?2",
            rusqlite::params![format!("{}.{}", line[0], line[1]), buyer],
        )
        .unwrap();

    let err = engine.purchase(buyer, package.id, 50.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    assert!(matches!(err, LedgerError::MemberNotInHierarchy { .. }));

    assert_eq!(engine.balances(buyer).unwrap().combined_balance, 100.0);
    assert!(engine.connections(buyer).unwrap().is_empty());
    assert_eq!(engine.balances(line[1]).unwrap(), Buckets::default());
    let log = engine.transactions(&TxLogFilter::for_member(buyer)).unwrap();
    assert_eq!(log.len(), 1);
}

#[test]
fn first_package_activates_member_once() {
    let h = Harness::new();
    let mut engine = h.engine();
    let buyer = seed_line(&mut engine, "a", 1)[0];
    let package = engine.upsert_package(None, "Gold", 10.0, 30, true).unwrap();
    h.seed_balance(buyer, Buckets::new(100.0, 0.0, 0.0));

    assert!(!engine.member(buyer).unwrap().is_active_member);
    assert!(engine.purchase(buyer, package.id, 40.0).unwrap().activated_member);
    assert!(!engine.purchase(buyer, package.id, 40.0).unwrap().activated_member);
    assert!(engine.member(buyer).unwrap().is_active_member);
}

#[test]
fn wallet_only_purchase_is_not_reinvestment() {
    let h = Harness::new();
    let mut engine = h.engine();
    let buyer = seed_line(&mut engine, "w", 1)[0];
    let package = engine.upsert_package(None, "Gold", 10.0, 30, true).unwrap();
    h.seed_balance(buyer, Buckets::new(5.0, 10.0, 20.0));

    let receipt = engine.purchase(buyer, package.id, 5.0).unwrap();
    assert!(receipt.is_from_wallet);
    assert!(!receipt.is_reinvestment);

    let receipt = engine.purchase(buyer, package.id, 12.0).unwrap();
    assert_eq!(receipt.balances, Buckets::new(0.0, 0.0, 18.0));
    assert!(receipt.is_reinvestment);
}

fn rewrite_hierarchy(h: &Harness, member_id: i64, hierarchy: &str) {
    h.db()
        .conn()
        .execute(
            "UPDATE referrals SET hierarchy = ?1 WHERE member_id = ?2",
            rusqlite::params![hierarchy, member_id],
        )
        .unwrap();
}

#[test]
fn unknown_upline_undoes_commissions_already_credited() {
    let h = Harness::new();
    let mut engine = h.engine();
    let line = seed_line(&mut engine, "u", 2);
    let (level1, buyer) = (line[0], line[1]);
    let package = engine.upsert_package(None, "Gold", 10.0, 30, true).unwrap();
    h.seed_balance(buyer, Buckets::new(100.0, 0.0, 0.0));
    let funds_before = engine.company_funds().unwrap();

    // level 1 is credited before the loop reaches the missing level-2 member
    rewrite_hierarchy(&h, buyer, &format!("999.{level1}.{buyer}"));

    let err = engine.purchase(buyer, package.id, 100.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    assert!(matches!(
        err,
        LedgerError::UnknownReferrer { referrer_id: 999, .. }
    ));

    assert_eq!(engine.balances(level1).unwrap(), Buckets::default());
    assert!(engine.notifications(level1, false).unwrap().is_empty());
    assert_eq!(engine.balances(buyer).unwrap(), Buckets::new(100.0, 0.0, 0.0));
    assert!(engine.connections(buyer).unwrap().is_empty());
    assert_eq!(engine.transactions(&TxLogFilter::for_member(buyer)).unwrap().len(), 1);
    let funds = engine.company_funds().unwrap();
    assert_eq!(funds.total_sales, funds_before.total_sales);
    assert_eq!(funds.total_commissions, funds_before.total_commissions);
}

#[test]
fn cyclic_hierarchy_fails_purchase_without_side_effects() {
    let h = Harness::new();
    let mut engine = h.engine();
    let line = seed_line(&mut engine, "y", 3);
    let buyer = line[2];
    let package = engine.upsert_package(None, "Gold", 10.0, 30, true).unwrap();
    h.seed_balance(buyer, Buckets::new(0.0, 80.0, 0.0));

    rewrite_hierarchy(&h, buyer, &format!("{}.{buyer}.{}.{buyer}", line[0], line[1]));

    let err = engine.purchase(buyer, package.id, 80.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    assert!(matches!(err, LedgerError::CyclicHierarchy { .. }));

    assert_eq!(engine.balances(buyer).unwrap().primary_earnings, 80.0);
    assert!(engine.connections(buyer).unwrap().is_empty());
    for upline in &line[..2] {
        assert_eq!(engine.balances(*upline).unwrap(), Buckets::default());
    }
    assert!(engine.reconcile(buyer).unwrap().consistent);
}
