mod common;

use common::{booking_body, TestApp, OTHER_USER_ID, TEST_USER_ID};
use reqwest::Method;
use serde_json::{json, Value};

#[tokio::test]
async fn booking_a_free_slot_returns_201() {
    let app = TestApp::spawn().await;

    let response = app
        .create_booking(TEST_USER_ID, &booking_body("10:00", "11:00"))
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.unwrap();
    let booking = &body["data"];
    assert_eq!(booking["user"], TEST_USER_ID);
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["paymentStatus"], "pending");
    // Amount falls back to the room price.
    assert_eq!(booking["amount"].as_f64(), Some(30.0));
}

#[tokio::test]
async fn repeating_your_own_pending_request_returns_the_same_booking() {
    let app = TestApp::spawn().await;

    let first: Value = app
        .create_booking(TEST_USER_ID, &booking_body("10:00", "11:00"))
        .await
        .json()
        .await
        .unwrap();

    let mut again = booking_body("10:00", "11:00");
    again["customerPhone"] = json!("5550199");
    let response = app.create_booking(TEST_USER_ID, &again).await;
    assert_eq!(response.status().as_u16(), 200);

    let second: Value = response.json().await.unwrap();
    assert_eq!(second["data"]["_id"], first["data"]["_id"]);
    assert_eq!(second["data"]["customerPhone"], "5550199");
}

#[tokio::test]
async fn overlapping_slot_for_another_user_is_a_conflict() {
    let app = TestApp::spawn().await;

    let response = app
        .create_booking(TEST_USER_ID, &booking_body("10:00", "11:00"))
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let response = app
        .create_booking(OTHER_USER_ID, &booking_body("10:30", "11:30"))
        .await;
    assert_eq!(response.status().as_u16(), 400);

    // Touching windows do not overlap.
    let response = app
        .create_booking(OTHER_USER_ID, &booking_body("11:00", "12:00"))
        .await;
    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn concurrent_requests_for_one_slot_admit_exactly_one() {
    let app = TestApp::spawn().await;

    let requests = (0..8).map(|i| {
        let user = format!("user-{}", i);
        let body = booking_body("14:00", "15:00");
        let request = app.request(Method::POST, "/room-bookings", &user).json(&body);
        async move { request.send().await.unwrap().status().as_u16() }
    });
    let statuses = futures::future::join_all(requests).await;

    assert_eq!(statuses.iter().filter(|s| **s == 201).count(), 1);
    assert!(statuses.iter().all(|s| *s == 201 || *s == 400));
}

#[tokio::test]
async fn unknown_room_is_not_found() {
    let app = TestApp::spawn().await;

    let mut body = booking_body("10:00", "11:00");
    body["room"] = json!("room-404");
    let response = app.create_booking(TEST_USER_ID, &body).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn inverted_window_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .create_booking(TEST_USER_ID, &booking_body("12:00", "11:00"))
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn only_admins_change_booking_status() {
    let app = TestApp::spawn().await;
    let created: Value = app
        .create_booking(TEST_USER_ID, &booking_body("09:00", "10:00"))
        .await
        .json()
        .await
        .unwrap();
    let id = created["data"]["_id"].as_str().unwrap().to_string();
    let status_path = format!("/room-bookings/{}/status", id);

    let response = app
        .request(Method::PUT, &status_path, TEST_USER_ID)
        .json(&json!({ "status": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .admin_request(Method::PUT, &status_path)
        .json(&json!({ "status": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "approved");
}

#[tokio::test]
async fn owners_delete_their_bookings_and_free_the_slot() {
    let app = TestApp::spawn().await;
    let created: Value = app
        .create_booking(TEST_USER_ID, &booking_body("16:00", "17:00"))
        .await
        .json()
        .await
        .unwrap();
    let id = created["data"]["_id"].as_str().unwrap().to_string();
    let booking_path = format!("/room-bookings/{}", id);

    let response = app
        .request(Method::DELETE, &booking_path, OTHER_USER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .request(Method::DELETE, &booking_path, TEST_USER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .request(Method::GET, &booking_path, TEST_USER_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .create_booking(OTHER_USER_ID, &booking_body("16:00", "17:00"))
        .await;
    assert_eq!(response.status().as_u16(), 201);
}
