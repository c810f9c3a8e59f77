mod common;

use common::{booking_body, payment_body, TestApp, OTHER_USER_ID, TEST_USER_ID};
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn order_payment_returns_provider_url_and_records_reference() {
    let app = TestApp::spawn().await;
    app.mock_payment_created("pay-100").await;
    let order_id = app.seed_order(TEST_USER_ID).await;

    let response = app
        .request(Method::POST, "/payment/create", TEST_USER_ID)
        .json(&payment_body(&order_id, 10.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["paymentUrl"], "https://pay.test/pay-100");
    assert_eq!(body["data"]["providerPaymentId"], "pay-100");
    assert_eq!(body["data"]["target"], "order");

    let order = app.get_order(TEST_USER_ID, &order_id).await;
    assert_eq!(order["paymentDetails"]["externalPaymentId"], "pay-100");
    assert_eq!(order["paymentDetails"]["transactionId"], order_id.as_str());
    assert_eq!(order["paymentStatus"], "pending");
}

#[tokio::test]
async fn booking_payment_records_reference_on_the_booking() {
    let app = TestApp::spawn().await;
    app.mock_payment_created("pay-200").await;

    let created: Value = app
        .create_booking(TEST_USER_ID, &booking_body("10:00", "11:00"))
        .await
        .json()
        .await
        .unwrap();
    let booking_id = created["data"]["_id"].as_str().unwrap().to_string();

    let response = app
        .request(Method::POST, "/payment/create", TEST_USER_ID)
        .json(&payment_body(&booking_id, 30.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["target"], "booking");

    let response = app
        .request(Method::GET, &format!("/room-bookings/{}", booking_id), TEST_USER_ID)
        .send()
        .await
        .unwrap();
    let booking: Value = response.json().await.unwrap();
    assert_eq!(booking["data"]["paymentDetails"]["externalPaymentId"], "pay-200");
}

#[tokio::test]
async fn unknown_order_is_not_found_and_provider_is_not_called() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/payments"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.gateway)
        .await;

    let response = app
        .request(Method::POST, "/payment/create", TEST_USER_ID)
        .json(&payment_body("ORD-0-MISSING", 10.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn paying_for_someone_elses_order_is_forbidden() {
    let app = TestApp::spawn().await;
    app.mock_payment_created("pay-300").await;
    let order_id = app.seed_order(TEST_USER_ID).await;

    let response = app
        .request(Method::POST, "/payment/create", OTHER_USER_ID)
        .json(&payment_body(&order_id, 10.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn invalid_payment_body_is_rejected() {
    let app = TestApp::spawn().await;
    let order_id = app.seed_order(TEST_USER_ID).await;

    let mut body = payment_body(&order_id, 10.0);
    body["email"] = json!("not-an-email");
    let response = app
        .request(Method::POST, "/payment/create", TEST_USER_ID)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .request(Method::POST, "/payment/create", TEST_USER_ID)
        .json(&payment_body(&order_id, 0.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn provider_rejection_is_bad_gateway() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultObj": null,
            "hasValidationError": true,
            "errorMessage": "Invalid phone"
        })))
        .mount(&app.gateway)
        .await;
    let order_id = app.seed_order(TEST_USER_ID).await;

    let response = app
        .request(Method::POST, "/payment/create", TEST_USER_ID)
        .json(&payment_body(&order_id, 10.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 502);

    let order = app.get_order(TEST_USER_ID, &order_id).await;
    assert!(order["paymentDetails"]["externalPaymentId"].is_null());
}

#[tokio::test]
async fn verify_passes_the_provider_view_through() {
    let app = TestApp::spawn().await;
    app.mock_payment_lookup("pay-400", 2).await;

    let response = app
        .request(Method::GET, "/payment/verify/pay-400", TEST_USER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["id"], "pay-400");
    assert_eq!(body["data"]["statusId"], 2);
}

fn failed_webhook(transaction_id: &str) -> Value {
    json!({
        "PaymentId": "pay-failed",
        "StatusId": 3,
        "TransactionId": transaction_id
    })
}

#[tokio::test]
async fn retrying_a_failed_booking_after_the_slot_was_rebooked_is_rejected() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/payments"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.gateway)
        .await;

    let created: Value = app
        .create_booking(TEST_USER_ID, &booking_body("10:00", "11:00"))
        .await
        .json()
        .await
        .unwrap();
    let booking_id = created["data"]["_id"].as_str().unwrap().to_string();
    app.send_webhook(&failed_webhook(&booking_id)).await;

    let response = app
        .create_booking(OTHER_USER_ID, &booking_body("10:00", "11:00"))
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let response = app
        .request(Method::POST, "/payment/create", TEST_USER_ID)
        .json(&payment_body(&booking_id, 30.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .request(Method::GET, &format!("/room-bookings/{}", booking_id), TEST_USER_ID)
        .send()
        .await
        .unwrap();
    let booking: Value = response.json().await.unwrap();
    assert_eq!(booking["data"]["paymentStatus"], "failed");
}

#[tokio::test]
async fn retrying_a_failed_booking_on_a_free_slot_reopens_it() {
    let app = TestApp::spawn().await;
    app.mock_payment_created("pay-500").await;

    let created: Value = app
        .create_booking(TEST_USER_ID, &booking_body("10:00", "11:00"))
        .await
        .json()
        .await
        .unwrap();
    let booking_id = created["data"]["_id"].as_str().unwrap().to_string();
    app.send_webhook(&failed_webhook(&booking_id)).await;

    let response = app
        .request(Method::POST, "/payment/create", TEST_USER_ID)
        .json(&payment_body(&booking_id, 30.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .create_booking(OTHER_USER_ID, &booking_body("10:00", "11:00"))
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn retrying_a_failed_order_payment_resets_it_to_pending() {
    let app = TestApp::spawn().await;
    app.mock_payment_created("pay-600").await;
    let order_id = app.seed_order(TEST_USER_ID).await;
    app.send_webhook(&failed_webhook(&order_id)).await;
    assert_eq!(app.get_order(TEST_USER_ID, &order_id).await["paymentStatus"], "failed");

    let response = app
        .request(Method::POST, "/payment/create", TEST_USER_ID)
        .json(&payment_body(&order_id, 10.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let order = app.get_order(TEST_USER_ID, &order_id).await;
    assert_eq!(order["paymentStatus"], "pending");
    assert_eq!(order["paymentDetails"]["status"], "pending");
    assert_eq!(order["paymentDetails"]["payUrl"], "https://pay.test/pay-600");
}
