mod common;

use chrono::Utc;
use common::{pending_pix, sign, spawn_app, spawn_app_with, test_config};
use pix_settlement::domain::{PaymentRail, TransactionStatus};
use pix_settlement::pix::{crc16_hex, decode};
use pix_settlement::ports::TransactionStore;
use reqwest::StatusCode;
use serde_json::{json, Value};

fn webhook_body(id: &str, amount: &str) -> String {
    json!({
        "pixTransactionId": id,
        "amount": amount,
        "bankTransactionId": "E18236120202406101200s0000000001",
        "bankName": "Banco Teste",
        "senderAccount": "0001-12345",
        "orderId": "order-42",
    })
    .to_string()
}

#[tokio::test]
async fn create_confirm_and_replay_settles_once() {
    let app = spawn_app().await;
    app.bookings.insert_booking("order-42").await;

    let res = app
        .client
        .post(app.url("/pix/payments"))
        .json(&json!({ "amount": "150.00", "bookingId": "order-42" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let id = created["pixTransactionId"].as_str().unwrap().to_string();
    let br_code = created["brCode"].as_str().unwrap();

    let (body, checksum) = br_code.split_at(br_code.len() - 4);
    assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(crc16_hex(body), checksum);
    let decoded = decode(br_code).unwrap();
    assert_eq!(decoded.order_reference.as_deref(), Some("order-42"));
    assert_eq!(created["amount"], "150.00");

    let res = app.send_pix_webhook(&webhook_body(&id, "150.00")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: Value = res.json().await.unwrap();
    assert_eq!(ack["success"], true);
    assert_eq!(ack["pixTransactionId"], id.as_str());
    assert_eq!(ack["bookingId"], "order-42");

    let tx_id = id.parse().unwrap();
    let first = app.store.get_by_id(tx_id).await.unwrap();
    assert_eq!(first.status, TransactionStatus::Paid);
    assert!(first.confirmed_at.is_some());
    assert_eq!(first.confirmed_by.as_deref(), Some("bank-webhook"));
    let booking = app.bookings.get("order-42").await.unwrap();
    assert!(booking.paid);
    assert_eq!(booking.status, "confirmed");

    let res = app.send_pix_webhook(&webhook_body(&id, "150.00")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: Value = res.json().await.unwrap();
    assert_eq!(ack["success"], true);

    let second = app.store.get_by_id(tx_id).await.unwrap();
    assert_eq!(second.confirmed_at, first.confirmed_at);
    assert_eq!(second.external_confirmation_id, first.external_confirmation_id);
}

#[tokio::test]
async fn amount_mismatch_leaves_transaction_pending() {
    let app = spawn_app().await;
    let tx = pending_pix("150.00", Some("order-42"), 30);
    app.store.put(tx.clone()).await;

    let res = app.send_pix_webhook(&webhook_body(&tx.id.to_string(), "15.00")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "AMOUNT_MISMATCH");

    let stored = app.store.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert!(stored.confirmed_at.is_none());

    // A corrected retry still succeeds.
    let res = app.send_pix_webhook(&webhook_body(&tx.id.to_string(), "150")).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn purged_transaction_is_not_found_for_webhook() {
    let app = spawn_app().await;
    let tx = pending_pix("150.00", Some("order-42"), -1);
    app.store.put(tx.clone()).await;

    let res = app
        .admin(app.client.post(app.url("/admin/pix/cleanup")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let purge: Value = res.json().await.unwrap();
    assert_eq!(purge["expired"], 1);

    let res = app.send_pix_webhook(&webhook_body(&tx.id.to_string(), "150.00")).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "PIX_NOT_FOUND");
}

#[tokio::test]
async fn unknown_transaction_is_not_found() {
    let app = spawn_app().await;

    let res = app
        .send_pix_webhook(&webhook_body(&uuid::Uuid::new_v4().to_string(), "1.00"))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "PIX_NOT_FOUND");

    let res = app.send_pix_webhook(&webhook_body("not-a-uuid", "1.00")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_signature_is_rejected_before_any_change() {
    let app = spawn_app().await;
    let tx = pending_pix("150.00", None, 30);
    app.store.put(tx.clone()).await;
    let body = webhook_body(&tx.id.to_string(), "150.00");

    let res = app
        .client
        .post(app.url("/webhooks/pix"))
        .header("x-bank-signature", sign("{\"tampered\":true}"))
        .header("x-bank-timestamp", Utc::now().timestamp().to_string())
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "INVALID_SIGNATURE");
    assert_eq!(
        app.store.get_by_id(tx.id).await.unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn missing_headers_are_a_structured_400() {
    let app = spawn_app().await;

    let res = app
        .client
        .post(app.url("/webhooks/pix"))
        .body(webhook_body(&uuid::Uuid::new_v4().to_string(), "1.00"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
    assert!(json["code"].is_string());
}

#[tokio::test]
async fn unprefixed_header_names_are_accepted() {
    let app = spawn_app().await;
    let tx = pending_pix("20.00", None, 30);
    app.store.put(tx.clone()).await;
    let body = webhook_body(&tx.id.to_string(), "20.00");

    let res = app
        .client
        .post(app.url("/webhooks/pix"))
        .header("signature", sign(&body))
        .header("timestamp", Utc::now().to_rfc3339())
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn stale_timestamp_is_rejected() {
    let app = spawn_app().await;
    let tx = pending_pix("20.00", None, 30);
    app.store.put(tx.clone()).await;
    let body = webhook_body(&tx.id.to_string(), "20.00");

    let res = app
        .client
        .post(app.url("/webhooks/pix"))
        .header("x-bank-signature", sign(&body))
        .header("x-bank-timestamp", (Utc::now().timestamp() - 3600).to_string())
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn unconfigured_secret_rejects_every_webhook() {
    let mut config = test_config();
    config.webhook.secret = None;
    let app = spawn_app_with(config).await;
    let tx = pending_pix("20.00", None, 30);
    app.store.put(tx.clone()).await;

    let res = app.send_pix_webhook(&webhook_body(&tx.id.to_string(), "20.00")).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["code"], "INVALID_SIGNATURE");
    assert_eq!(
        app.store.get_by_id(tx.id).await.unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn create_payment_rejects_bad_amounts() {
    let app = spawn_app().await;

    for amount in ["0", "-5", "10.001"] {
        let res = app
            .client
            .post(app.url("/pix/payments"))
            .json(&json!({ "amount": amount }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "amount {}", amount);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn create_payment_without_pix_key_is_a_configuration_error() {
    let mut config = test_config();
    config.pix.pix_key = None;
    let app = spawn_app_with(config).await;

    let res = app
        .client
        .post(app.url("/pix/payments"))
        .json(&json!({ "amount": 10 }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "CONFIGURATION_ERROR");
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn bank_webhook_cannot_settle_card_session() {
    let app = spawn_app().await;
    let mut tx = pending_pix("49.90", Some("order-55"), 30);
    tx.rail = PaymentRail::Card;
    app.store.put(tx.clone()).await;

    let res = app
        .send_pix_webhook(&webhook_body(&tx.id.to_string(), "49.90"))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "PIX_NOT_FOUND");

    let stored = app.store.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert!(stored.confirmed_at.is_none());
}
