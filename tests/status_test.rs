use marketpay::domain::error::PaymentError;
use marketpay::domain::status::{
    CanonicalStatus, CardBankStatus, CryptoStatus, ProviderKind, StatusCategory, normalize,
};

// ── 1. success_statuses_normalize_to_completed ─────────────────────────────

#[test]
fn success_statuses_normalize_to_completed() {
    assert_eq!(normalize("success", ProviderKind::CardBank).unwrap(), CanonicalStatus::Completed);
    assert_eq!(normalize("finished", ProviderKind::Crypto).unwrap(), CanonicalStatus::Completed);
}

// ── 2. card_bank_mapping ───────────────────────────────────────────────────

#[test]
fn card_bank_mapping() {
    use CanonicalStatus::*;
    let cases = [
        ("failed", Failed),
        ("abandoned", Failed),
        ("reversed", Reversed),
        ("ongoing", Pending),
        ("pending", Pending),
        ("queued", Pending),
    ];
    for (raw, expected) in cases {
        assert_eq!(normalize(raw, ProviderKind::CardBank).unwrap(), expected, "{raw}");
    }
}

// ── 3. crypto_mapping_is_identity_except_finished ──────────────────────────

#[test]
fn crypto_mapping_is_identity_except_finished() {
    for status in CryptoStatus::ALL {
        let canonical = status.canonical();
        if status == CryptoStatus::Finished {
            assert_eq!(canonical, CanonicalStatus::Completed);
        } else {
            assert_eq!(canonical.as_str(), status.as_str());
        }
    }
}

// ── 4. normalize_is_case_and_whitespace_insensitive ────────────────────────

#[test]
fn normalize_is_case_and_whitespace_insensitive() {
    assert_eq!(normalize("  SUCCESS ", ProviderKind::CardBank).unwrap(), CanonicalStatus::Completed);
    assert_eq!(normalize("Partially_Paid", ProviderKind::Crypto).unwrap(), CanonicalStatus::PartiallyPaid);
}

// ── 5. unknown_status_is_an_error ──────────────────────────────────────────

#[test]
fn unknown_status_is_an_error() {
    let err = normalize("finished", ProviderKind::CardBank).unwrap_err();
    assert!(matches!(err, PaymentError::UnknownStatus { status, .. } if status == "finished"));
    assert!(normalize("success", ProviderKind::Crypto).is_err());
    assert!(normalize("", ProviderKind::Crypto).is_err());
}

// ── 6. category_tables ─────────────────────────────────────────────────────

#[test]
fn category_tables() {
    use CanonicalStatus::*;
    assert!(Completed.is_in(StatusCategory::Success));
    assert!(PartiallyPaid.is_in(StatusCategory::InProgress));
    assert!(!PartiallyPaid.is_in(StatusCategory::PendingBlockchain));
    for s in [Waiting, Confirming, Confirmed, Sending] {
        assert!(s.is_in(StatusCategory::PendingBlockchain), "{s}");
        assert!(s.is_in_progress(), "{s}");
    }
    for s in [Failed, Expired, Refunded, Reversed] {
        assert!(s.is_in(StatusCategory::Failed), "{s}");
        assert!(s.is_final(), "{s}");
    }
    assert!(Completed.is_final());
    assert!(!Pending.is_final());
}

// ── 7. final_statuses_are_sticky ───────────────────────────────────────────

#[test]
fn final_statuses_are_sticky() {
    use CanonicalStatus::*;
    assert!(Completed.can_transition_to(&Refunded));
    assert!(Completed.can_transition_to(&Reversed));
    assert!(!Completed.can_transition_to(&Failed));
    assert!(!Completed.can_transition_to(&Pending));
    assert!(!Failed.can_transition_to(&Completed));
    assert!(!Expired.can_transition_to(&Waiting));
    assert!(Pending.can_transition_to(&Completed));
    assert!(Waiting.can_transition_to(&Confirming));
    assert!(Confirming.can_transition_to(&Waiting));
}

// ── 8. provider_selector_parses ────────────────────────────────────────────

#[test]
fn provider_selector_parses() {
    assert_eq!("card_bank".parse::<ProviderKind>().unwrap(), ProviderKind::CardBank);
    assert_eq!("crypto".parse::<ProviderKind>().unwrap(), ProviderKind::Crypto);
    let err = "paypal".parse::<ProviderKind>().unwrap_err();
    assert!(matches!(err, PaymentError::UnsupportedProvider(p) if p == "paypal"));
}

// ── 9. every_card_bank_status_has_a_mapping ────────────────────────────────

#[test]
fn every_card_bank_status_has_a_mapping() {
    for status in CardBankStatus::ALL {
        let parsed: CardBankStatus = status.as_str().parse().unwrap();
        assert_eq!(parsed, status);
        assert_eq!(normalize(status.as_str(), ProviderKind::CardBank).unwrap(), status.canonical());
    }
}
