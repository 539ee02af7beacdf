use super::*;
use std::time::Duration;

use shared::domain::Tier;

use crate::{catalog::VoucherCatalog, config::SeedData};

fn ledger_with_balance(points: u64) -> (Arc<LedgerStore>, VoucherCatalog) {
    let seed = SeedData::default();
    let mut user = seed.user.clone();
    user.green_points = points;
    let (events, _) = broadcast::channel(64);
    let ledger = LedgerStore::new(
        LedgerSettings::default(),
        TierSchedule::default(),
        user,
        seed.transactions.clone(),
        events,
    );
    (ledger, VoucherCatalog::new(seed.vouchers))
}

fn voucher(catalog: &VoucherCatalog, id: &str) -> Voucher {
    catalog.get(&VoucherId::new(id)).cloned().expect("voucher")
}

#[tokio::test(start_paused = true)]
async fn redeem_deducts_after_latency() {
    let (ledger, catalog) = ledger_with_balance(420);
    let food = voucher(&catalog, "V50");

    let pending = ledger.redeem(&food).await.expect("redeem accepted");
    assert!(ledger.is_pending().await);
    assert_eq!(ledger.balance().await, 420);

    let tx = pending.wait().await.expect("committed");
    assert_eq!(tx.kind, TransactionKind::Redeem);
    assert_eq!(tx.amount, -300);
    assert_eq!(tx.description, "Redeemed ₹50 Off Food Order");

    assert!(!ledger.is_pending().await);
    assert_eq!(ledger.balance().await, 120);
    let history = ledger.transactions().await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[0], tx);
}

#[tokio::test(start_paused = true)]
async fn redeem_commit_waits_full_latency() {
    let (ledger, catalog) = ledger_with_balance(420);
    let food = voucher(&catalog, "V50");

    let _pending = ledger.redeem(&food).await.expect("redeem accepted");
    tokio::time::sleep(Duration::from_millis(799)).await;
    assert_eq!(ledger.balance().await, 420);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(ledger.balance().await, 120);
}

#[tokio::test(start_paused = true)]
async fn insufficient_balance_leaves_ledger_untouched() {
    let (ledger, catalog) = ledger_with_balance(100);
    let before = ledger.transactions().await;

    let err = ledger
        .redeem(&voucher(&catalog, "V50"))
        .await
        .expect_err("should be rejected");
    assert_eq!(
        err,
        LedgerError::InsufficientBalance {
            required: 300,
            available: 100
        }
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!ledger.is_pending().await);
    assert_eq!(ledger.balance().await, 100);
    assert_eq!(ledger.transactions().await, before);
}

#[tokio::test(start_paused = true)]
async fn second_redeem_is_rejected_while_first_in_flight() {
    let (ledger, catalog) = ledger_with_balance(420);
    let food = voucher(&catalog, "V50");

    let (first, second) = futures::join!(ledger.redeem(&food), ledger.redeem(&food));
    let first = first.expect("first accepted");
    assert!(matches!(
        second,
        Err(LedgerError::RedemptionInFlight { ref voucher_id }) if voucher_id == "V50"
    ));

    first.wait().await.expect("committed");
    assert_eq!(ledger.balance().await, 120);

    let redeems = ledger
        .transactions()
        .await
        .into_iter()
        .filter(|tx| tx.kind == TransactionKind::Redeem)
        .count();
    assert_eq!(redeems, 2);
}

#[tokio::test(start_paused = true)]
async fn redeem_allowed_again_after_commit() {
    let (ledger, catalog) = ledger_with_balance(700);
    let food = voucher(&catalog, "V50");

    ledger
        .redeem(&food)
        .await
        .expect("first")
        .wait()
        .await
        .expect("first commit");
    ledger
        .redeem(&food)
        .await
        .expect("second")
        .wait()
        .await
        .expect("second commit");

    assert_eq!(ledger.balance().await, 100);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_redemption() {
    let (ledger, catalog) = ledger_with_balance(420);
    let mut events = ledger.subscribe();

    let pending = ledger
        .redeem(&voucher(&catalog, "V50"))
        .await
        .expect("accepted");
    ledger.shutdown().await;

    assert_eq!(pending.wait().await, Err(LedgerError::Cancelled));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(ledger.balance().await, 420);
    assert!(!ledger.is_pending().await);

    assert!(matches!(
        events.recv().await.expect("started"),
        SessionEvent::RedemptionStarted { .. }
    ));
    assert!(matches!(
        events.recv().await.expect("cancelled"),
        SessionEvent::RedemptionCancelled { .. }
    ));
}

#[tokio::test]
async fn earn_updates_balance_and_derived_totals() {
    let (ledger, _) = ledger_with_balance(420);
    let before = ledger.user().await;

    let tx = ledger.earn(50).await.expect("earn");
    assert_eq!(tx.kind, TransactionKind::Earn);
    assert_eq!(tx.amount, 50);
    assert_eq!(tx.description, MANUAL_CREDIT_DESCRIPTION);

    let after = ledger.user().await;
    assert_eq!(after.green_points, before.green_points + 50);
    assert!((after.boxes_saved - (before.boxes_saved + 5.0)).abs() < 1e-9);
    assert!((after.total_recycled_kg - (before.total_recycled_kg + 1.5)).abs() < 1e-9);
    assert_eq!(ledger.transactions().await[0], tx);
}

#[tokio::test]
async fn earn_rejects_zero() {
    let (ledger, _) = ledger_with_balance(420);
    assert_eq!(ledger.earn(0).await, Err(LedgerError::InvalidAmount(0)));
    assert_eq!(ledger.transactions().await.len(), 3);
}

#[tokio::test]
async fn tier_follows_balance_on_every_read() {
    let (ledger, _) = ledger_with_balance(190);
    assert_eq!(ledger.user().await.tier, Tier::Seed);

    ledger.earn(10).await.expect("earn");
    assert_eq!(ledger.user().await.tier, Tier::Sprout);

    ledger.earn(300).await.expect("earn");
    assert_eq!(ledger.user().await.tier, Tier::Bloom);
    assert_eq!(ledger.tier_progress().await.goal_points, 1000);
}

#[tokio::test]
async fn reads_are_stable_without_mutation() {
    let (ledger, _) = ledger_with_balance(420);
    assert_eq!(ledger.user().await, ledger.user().await);
    assert_eq!(ledger.transactions().await, ledger.transactions().await);
}

#[tokio::test]
async fn earn_counts_partial_boxes() {
    let (ledger, _) = ledger_with_balance(420);
    let before = ledger.user().await;

    ledger.earn(15).await.expect("earn 15");
    let mid = ledger.user().await;
    assert!((mid.boxes_saved - (before.boxes_saved + 1.5)).abs() < 1e-9);
    assert!((mid.total_recycled_kg - (before.total_recycled_kg + 0.45)).abs() < 1e-9);

    ledger.earn(5).await.expect("earn 5");
    let after = ledger.user().await;
    assert_eq!(after.green_points, 440);
    assert!((after.boxes_saved - (before.boxes_saved + 2.0)).abs() < 1e-9);
    assert!((after.total_recycled_kg - (before.total_recycled_kg + 0.6)).abs() < 1e-9);
}

#[tokio::test]
async fn oversized_cost_is_rejected_before_pending() {
    let (ledger, catalog) = ledger_with_balance(u64::MAX);
    let mut huge = voucher(&catalog, "V50");
    huge.points_cost = u64::MAX;

    let err = ledger.redeem(&huge).await.expect_err("cost does not fit");
    assert_eq!(err, LedgerError::InvalidAmount(u64::MAX));
    assert!(!ledger.is_pending().await);
    assert_eq!(ledger.balance().await, u64::MAX);
}

#[tokio::test(start_paused = true)]
async fn commit_rechecks_balance() {
    let (ledger, catalog) = ledger_with_balance(420);
    let pending = ledger
        .redeem(&voucher(&catalog, "V50"))
        .await
        .expect("accepted");

    ledger.inner.lock().await.user.green_points = 100;

    assert_eq!(
        pending.wait().await,
        Err(LedgerError::InsufficientBalance {
            required: 300,
            available: 100
        })
    );
    assert!(!ledger.is_pending().await);
    assert_eq!(ledger.balance().await, 100);
    assert_eq!(ledger.transactions().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn closed_ledger_rejects_mutations() {
    let (ledger, catalog) = ledger_with_balance(420);
    ledger.shutdown().await;

    assert_eq!(ledger.earn(10).await, Err(LedgerError::Closed));
    assert!(matches!(
        ledger.redeem(&voucher(&catalog, "V50")).await,
        Err(LedgerError::Closed)
    ));
    assert_eq!(ledger.balance().await, 420);
}

#[test]
fn points_for_boxes_follows_ledger_rate() {
    let (ledger, _) = ledger_with_balance(0);
    assert_eq!(ledger.points_for_boxes(5), 50);
}
