mod common;

use common::{pending_pix, spawn_app, spawn_app_with, test_config};
use pix_settlement::domain::{PaymentRail, ReconciliationTrigger, TransactionStatus};
use pix_settlement::ports::TransactionStore;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn app_with_bank(server: &mockito::ServerGuard) -> common::TestApp {
    let mut config = test_config();
    config.bank_api.base_url = Some(server.url());
    config.bank_api.api_key = Some("bank-key".to_string());
    spawn_app_with(config).await
}

#[tokio::test]
async fn bank_paid_settles_pending_transaction() {
    let mut server = mockito::Server::new_async().await;
    let app = app_with_bank(&server).await;
    app.bookings.insert_booking("order-7").await;
    let tx = pending_pix("80.00", Some("order-7"), 30);
    app.store.put(tx.clone()).await;

    let mock = server
        .mock("GET", format!("/pix/transactions/{}", tx.id).as_str())
        .match_header("authorization", "Bearer bank-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "status": "CONCLUIDA", "endToEndId": "E999", "amount": "80.00" }).to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let res = app
        .client
        .get(app.url(&format!("/pix/payments/{}", tx.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "paid");
    assert_eq!(body["verification"], "bank");
    assert_eq!(body["externalConfirmationId"], "E999");
    assert!(body["expiresAt"].is_null());
    mock.assert_async().await;

    let stored = app.store.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.confirmed_by.as_deref(), Some("bank-poll"));
    assert!(app.bookings.get("order-7").await.unwrap().paid);
}

#[tokio::test]
async fn settled_transaction_is_answered_locally() {
    let mut server = mockito::Server::new_async().await;
    let app = app_with_bank(&server).await;
    let mut tx = pending_pix("10.00", None, 30);
    tx.status = TransactionStatus::Paid;
    app.store.put(tx.clone()).await;

    let mock = server
        .mock("GET", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let res = app
        .client
        .get(app.url(&format!("/pix/payments/{}", tx.id)))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "paid");
    assert_eq!(body["verification"], "local");
    mock.assert_async().await;
}

#[tokio::test]
async fn bank_error_is_reported_and_row_untouched() {
    let mut server = mockito::Server::new_async().await;
    let app = app_with_bank(&server).await;
    let tx = pending_pix("10.00", None, 30);
    app.store.put(tx.clone()).await;

    let _mock = server
        .mock("GET", format!("/pix/transactions/{}", tx.id).as_str())
        .with_status(503)
        .create_async()
        .await;

    let res = app
        .client
        .get(app.url(&format!("/pix/payments/{}", tx.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "BANK_API_ERROR");

    assert_eq!(
        app.store.get_by_id(tx.id).await.unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn bank_rejection_marks_transaction_failed() {
    let mut server = mockito::Server::new_async().await;
    let app = app_with_bank(&server).await;
    let tx = pending_pix("10.00", None, 30);
    app.store.put(tx.clone()).await;

    let _mock = server
        .mock("GET", format!("/pix/transactions/{}", tx.id).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "status": "rejected" }).to_string())
        .create_async()
        .await;

    let res = app
        .client
        .get(app.url(&format!("/pix/payments/{}", tx.id)))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "failed");

    let stored = app.store.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.failure_reason.as_deref(), Some("bank reported rejected"));
}

#[tokio::test]
async fn unmapped_provider_status_fails_loudly() {
    let mut server = mockito::Server::new_async().await;
    let app = app_with_bank(&server).await;
    let tx = pending_pix("10.00", None, 30);
    app.store.put(tx.clone()).await;

    let _mock = server
        .mock("GET", format!("/pix/transactions/{}", tx.id).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "status": "SOMETHING_NEW" }).to_string())
        .create_async()
        .await;

    let res = app
        .client
        .get(app.url(&format!("/pix/payments/{}", tx.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        app.store.get_by_id(tx.id).await.unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn without_bank_the_check_is_skipped() {
    let app = spawn_app().await;
    let tx = pending_pix("10.00", None, 30);
    app.store.put(tx.clone()).await;

    let res = app
        .client
        .get(app.url(&format!("/pix/payments/{}", tx.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amount"], "10.00");
    assert_eq!(body["externalCheckSkipped"], true);
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn unknown_id_is_404() {
    let app = spawn_app().await;

    let res = app
        .client
        .get(app.url(&format!("/pix/payments/{}", uuid::Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "PIX_NOT_FOUND");
}

#[tokio::test]
async fn card_session_is_not_polled_against_bank() {
    let mut server = mockito::Server::new_async().await;
    let app = app_with_bank(&server).await;
    let mut tx = pending_pix("49.90", None, 30);
    tx.rail = PaymentRail::Card;
    app.store.put(tx.clone()).await;

    let mock = server
        .mock("GET", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let res = app
        .client
        .get(app.url(&format!("/pix/payments/{}", tx.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["verification"], "skipped");
    assert_eq!(body["externalCheckSkipped"], true);
    mock.assert_async().await;
}

#[tokio::test]
async fn bank_checks_are_logged_for_reconciliation() {
    let mut server = mockito::Server::new_async().await;
    let app = app_with_bank(&server).await;
    let waiting = pending_pix("20.00", Some("order-3"), 30);
    let broken = pending_pix("20.00", None, 30);
    app.store.put(waiting.clone()).await;
    app.store.put(broken.clone()).await;

    let _waiting = server
        .mock("GET", format!("/pix/transactions/{}", waiting.id).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "status": "ATIVA" }).to_string())
        .create_async()
        .await;
    let _broken = server
        .mock("GET", format!("/pix/transactions/{}", broken.id).as_str())
        .with_status(503)
        .create_async()
        .await;

    for id in [waiting.id, broken.id] {
        app.client
            .get(app.url(&format!("/pix/payments/{}", id)))
            .send()
            .await
            .unwrap();
    }

    let history = app.store.reconciliation_history(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|a| a.trigger == ReconciliationTrigger::Poll));

    let waiting_attempt = history.iter().find(|a| a.transaction_id == waiting.id).unwrap();
    assert_eq!(waiting_attempt.bank_status.as_deref(), Some("ATIVA"));
    assert_eq!(waiting_attempt.booking_reference.as_deref(), Some("order-3"));
    assert!(!waiting_attempt.reconciled);
    assert!(waiting_attempt.error.is_none());

    let broken_attempt = history.iter().find(|a| a.transaction_id == broken.id).unwrap();
    assert!(broken_attempt.bank_status.is_none());
    assert!(broken_attempt.error.is_some());
}
