mod common;

use common::*;
use marketpay::adapters::nowpayments::{NowPaymentsAdapter, NowPaymentsConfig};
use marketpay::adapters::paystack::{PaystackAdapter, PaystackConfig};
use marketpay::domain::error::PaymentError;
use marketpay::domain::money::CurrencyCode;
use marketpay::domain::provider::{CardBankApi, CryptoApi, InitRequest, InvoiceRequest};
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REF: &str = "PAY_1700000000000_adapter01";

fn init_request(amount: rust_decimal::Decimal, currency: &str) -> InitRequest {
    InitRequest {
        amount,
        currency: CurrencyCode::new(currency).unwrap(),
        reference: reference(REF),
        customer_email: "buyer@example.com".to_string(),
        callback_url: format!("{PUBLIC_BASE_URL}/payments/{REF}/return"),
        metadata: json!({"description": "Courier booking"}),
    }
}

async fn paystack(server: &MockServer) -> PaystackAdapter {
    PaystackAdapter::new(PaystackConfig::new("sk_test_secret").with_base_url(server.uri())).unwrap()
}

async fn nowpayments(server: &MockServer) -> NowPaymentsAdapter {
    NowPaymentsAdapter::new(NowPaymentsConfig::new("np_key", true).with_base_url(server.uri())).unwrap()
}

// ── 1. paystack_initialize_sends_minor_units ───────────────────────────────

#[tokio::test]
async fn paystack_initialize_sends_minor_units() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .and(header("authorization", "Bearer sk_test_secret"))
        .and(body_partial_json(json!({
            "amount": 1001,
            "currency": "NGN",
            "reference": REF,
            "email": "buyer@example.com",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/0peioxfhpn",
                "access_code": "0peioxfhpn",
                "reference": REF,
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = paystack(&server).await;
    let init = adapter
        .initialize_transaction(&init_request(dec!(10.005), "ngn"))
        .await
        .unwrap();

    assert_eq!(init.external_id, "0peioxfhpn");
    assert_eq!(init.redirect_url.as_deref(), Some("https://checkout.paystack.com/0peioxfhpn"));
}

// ── 2. paystack_verify_decodes_transaction ─────────────────────────────────

#[tokio::test]
async fn paystack_verify_decodes_transaction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/transaction/verify/{REF}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "id": 4099260516u64,
                "status": "success",
                "reference": REF,
                "amount": 100050,
                "currency": "NGN",
                "paid_at": "2024-08-22T09:15:02.000Z",
                "channel": "card",
                "gateway_response": "Approved",
            }
        })))
        .mount(&server)
        .await;

    let tx = paystack(&server).await.transaction_status(REF).await.unwrap();
    assert_eq!(tx.id.as_deref(), Some("4099260516"));
    assert_eq!(tx.raw_status, "success");
    assert_eq!(tx.amount_minor, 100_050);
    assert_eq!(tx.currency, "NGN");
    assert!(tx.paid_at.is_some());
    assert_eq!(tx.raw["data"]["gateway_response"], "Approved");
}

// ── 3. paystack_error_status_carries_message ───────────────────────────────

#[tokio::test]
async fn paystack_error_status_carries_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/transaction/verify/{REF}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": false,
            "message": "Transaction reference not found",
        })))
        .mount(&server)
        .await;

    let err = paystack(&server).await.transaction_status(REF).await.unwrap_err();
    match &err {
        PaymentError::ProviderRequest { status, message, .. } => {
            assert_eq!(*status, Some(404));
            assert!(message.contains("Transaction reference not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_transient());
}

// ── 4. paystack_false_envelope_is_an_error ─────────────────────────────────

#[tokio::test]
async fn paystack_false_envelope_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": false,
            "message": "Invalid Amount Sent",
        })))
        .mount(&server)
        .await;

    let err = paystack(&server)
        .await
        .initialize_transaction(&init_request(dec!(5), "NGN"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ProviderRequest { status: Some(200), .. }));
    assert!(err.to_string().contains("Invalid Amount Sent"));
}

// ── 5. paystack_server_error_is_transient ──────────────────────────────────

#[tokio::test]
async fn paystack_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = paystack(&server).await.transaction_status(REF).await.unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("bad gateway"));
}

// ── 6. missing_credentials_fail_at_construction ────────────────────────────

#[test]
fn missing_credentials_fail_at_construction() {
    assert!(matches!(
        PaystackAdapter::new(PaystackConfig::new("  ")),
        Err(PaymentError::Configuration(_))
    ));
    assert!(matches!(
        NowPaymentsAdapter::new(NowPaymentsConfig::new("", false)),
        Err(PaymentError::Configuration(_))
    ));
}

// ── 7. nowpayments_invoice_uses_api_key ────────────────────────────────────

#[tokio::test]
async fn nowpayments_invoice_uses_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoice"))
        .and(header("x-api-key", "np_key"))
        .and(body_partial_json(json!({
            "price_amount": 50.0,
            "price_currency": "usd",
            "pay_currency": "btc",
            "order_id": REF,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "4522625843",
            "order_id": REF,
            "invoice_url": "https://nowpayments.io/payment/?iid=4522625843",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let invoice = nowpayments(&server)
        .await
        .create_hosted_invoice(&InvoiceRequest {
            price_amount: dec!(50),
            price_currency: CurrencyCode::new("USD").unwrap(),
            pay_currency: Some("BTC".to_string()),
            order_id: reference(REF),
            order_description: "Courier booking".to_string(),
            ipn_callback_url: format!("{PUBLIC_BASE_URL}/webhooks/crypto"),
            success_url: format!("{PUBLIC_BASE_URL}/payments/{REF}/return"),
            cancel_url: format!("{PUBLIC_BASE_URL}/payments/{REF}/return"),
            is_fixed_rate: true,
            is_fee_paid_by_user: false,
        })
        .await
        .unwrap();

    assert_eq!(invoice.id, "4522625843");
    assert_eq!(invoice.invoice_url, "https://nowpayments.io/payment/?iid=4522625843");
}

// ── 8. nowpayments_status_accepts_numeric_ids ──────────────────────────────

#[tokio::test]
async fn nowpayments_status_accepts_numeric_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payment/5077125051"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payment_id": 5077125051u64,
            "payment_status": "finished",
            "order_id": REF,
            "price_amount": 50,
            "price_currency": "usd",
            "pay_amount": 0.0012,
            "actually_paid": 0.0012,
            "pay_currency": "btc",
            "updated_at": "2024-08-22T09:15:02.120Z",
        })))
        .mount(&server)
        .await;

    let payment = nowpayments(&server).await.payment_status("5077125051").await.unwrap();
    assert_eq!(payment.payment_id, "5077125051");
    assert_eq!(payment.order_id.as_deref(), Some(REF));
    assert_eq!(payment.raw_status, "finished");
    assert_eq!(payment.price_amount, dec!(50));
    assert_eq!(payment.actually_paid, Some(dec!(0.0012)));
    assert!(payment.updated_at.is_some());
}

// ── 9. nowpayments_outage_is_transient ─────────────────────────────────────

#[tokio::test]
async fn nowpayments_outage_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "Internal error"})))
        .mount(&server)
        .await;

    let err = nowpayments(&server).await.payment_status("1").await.unwrap_err();
    assert!(err.is_transient());
    assert!(err.is_inconclusive());
}

// ── 10. nowpayments_direct_payment_returns_id ──────────────────────────────

#[tokio::test]
async fn nowpayments_direct_payment_returns_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment"))
        .and(body_partial_json(json!({
            "pay_currency": "btc",
            "price_currency": "usd",
            "order_id": REF,
            "order_description": "Courier booking",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "payment_id": "5077125051",
            "payment_status": "waiting",
            "pay_address": "3EZ2uTdVDAMFXTfc6uLDDKR6o8qKBZXVkj",
        })))
        .mount(&server)
        .await;

    let init = nowpayments(&server)
        .await
        .initialize_transaction(&init_request(dec!(50), "USD"), "BTC")
        .await
        .unwrap();
    assert_eq!(init.external_id, "5077125051");
    assert_eq!(init.raw_status.as_deref(), Some("waiting"));
    assert_eq!(init.redirect_url, None);
}
