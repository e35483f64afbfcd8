mod common;

use common::*;
use marketpay::domain::error::PaymentError;
use marketpay::domain::payment::{RequestType, StatusUpdate, TransitionOutcome};
use marketpay::domain::status::{CanonicalStatus, ProviderKind};
use marketpay::domain::store::PaymentStore;
use marketpay::infra::memory::InMemoryPaymentStore;
use rust_decimal_macros::dec;
use std::sync::Arc;

const REF: &str = "PAY_1700000000000_store0001";

fn update(status: CanonicalStatus, tx_id: Option<&str>) -> StatusUpdate {
    StatusUpdate {
        status,
        raw_status: status.as_str().to_string(),
        provider_transaction_id: tx_id.map(str::to_string),
        paid_at: None,
        channel: None,
        failure_reason: None,
    }
}

async fn seeded() -> InMemoryPaymentStore {
    let store = InMemoryPaymentStore::new();
    store
        .insert(&new_payment(REF, ProviderKind::CardBank, dec!(10), "NGN", None))
        .await
        .unwrap();
    store
}

// ── 1. insert_starts_pending ───────────────────────────────────────────────

#[tokio::test]
async fn insert_starts_pending() {
    let store = seeded().await;
    let stored = store.find_by_reference(&reference(REF)).await.unwrap().unwrap();
    assert_eq!(stored.status, CanonicalStatus::Pending);
    assert_eq!(stored.provider_transaction_id, None);
}

// ── 2. duplicate_reference_is_rejected ─────────────────────────────────────

#[tokio::test]
async fn duplicate_reference_is_rejected() {
    let store = seeded().await;
    let err = store
        .insert(&new_payment(REF, ProviderKind::Crypto, dec!(1), "usd", None))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Validation(_)));
}

// ── 3. transitions_follow_state_machine ────────────────────────────────────

#[tokio::test]
async fn transitions_follow_state_machine() {
    let store = seeded().await;
    let r = reference(REF);

    let out = store.record_verification(&r, &update(CanonicalStatus::Completed, Some("tx1")), "test").await.unwrap();
    assert_eq!(out, TransitionOutcome::Updated { from: CanonicalStatus::Pending, to: CanonicalStatus::Completed });

    let out = store.record_verification(&r, &update(CanonicalStatus::Completed, None), "test").await.unwrap();
    assert_eq!(out, TransitionOutcome::Unchanged(CanonicalStatus::Completed));

    let out = store.record_verification(&r, &update(CanonicalStatus::Failed, None), "test").await.unwrap();
    assert!(matches!(out, TransitionOutcome::Anomaly { .. }));

    let out = store.record_verification(&r, &update(CanonicalStatus::Refunded, None), "test").await.unwrap();
    assert!(matches!(out, TransitionOutcome::Updated { to: CanonicalStatus::Refunded, .. }));

    let history = store.history(&r).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].from_status, CanonicalStatus::Completed);
    assert_eq!(history[1].to_status, CanonicalStatus::Refunded);
}

// ── 4. provider_transaction_id_is_write_once ───────────────────────────────

#[tokio::test]
async fn provider_transaction_id_is_write_once() {
    let store = seeded().await;
    let r = reference(REF);

    store.record_verification(&r, &update(CanonicalStatus::Waiting, Some("first")), "test").await.unwrap();
    store.record_verification(&r, &update(CanonicalStatus::Confirming, Some("second")), "test").await.unwrap();

    let stored = store.find_by_reference(&r).await.unwrap().unwrap();
    assert_eq!(stored.provider_transaction_id.as_deref(), Some("first"));
    assert_eq!(stored.status, CanonicalStatus::Confirming);
}

// ── 5. unknown_reference_is_not_found ──────────────────────────────────────

#[tokio::test]
async fn unknown_reference_is_not_found() {
    let store = InMemoryPaymentStore::new();
    let err = store
        .record_verification(&reference(REF), &update(CanonicalStatus::Completed, None), "test")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
}

// ── 6. find_for_request_is_newest_first ────────────────────────────────────

#[tokio::test]
async fn find_for_request_is_newest_first() {
    let store = InMemoryPaymentStore::new();
    for r in ["EVT_1700000000000_first0001", "EVT_1700000000001_second001"] {
        store
            .insert(&new_payment(r, ProviderKind::CardBank, dec!(5), "NGN", Some(("req-1", RequestType::Event))))
            .await
            .unwrap();
    }
    let found = store.find_for_request("req-1", RequestType::Event).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].reference.as_str(), "EVT_1700000000001_second001");
}

// ── 7. concurrent_verifications_apply_once ─────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_verifications_apply_once() {
    let store = Arc::new(seeded().await);
    let r = reference(REF);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        let r = r.clone();
        handles.push(tokio::spawn(async move {
            store
                .record_verification(&r, &update(CanonicalStatus::Completed, Some("tx")), "test")
                .await
                .unwrap()
        }));
    }

    let mut updated = 0;
    for h in handles {
        if matches!(h.await.unwrap(), TransitionOutcome::Updated { .. }) {
            updated += 1;
        }
    }
    assert_eq!(updated, 1);
    assert_eq!(store.history(&r).await.len(), 1);
}
