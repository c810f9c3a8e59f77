#![allow(dead_code)]

use order_service::config::{GatewayConfig, MongoConfig, OrderServiceConfig, RoomCacheConfig};
use order_service::models::{Room, WebhookPayload};
use order_service::services::memory::{
    InMemoryBookingStore, InMemoryOrderStore, InMemoryRoomDirectory, InMemoryWebhookLog,
};
use order_service::{Application, Stores};
use reqwest::{Client, Method, RequestBuilder, Response};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use service_core::utils::signature::{canonical_field_string, sign_base64};
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ROOM_ID: &str = "room-1";
pub const TEST_USER_ID: &str = "user-1";
pub const OTHER_USER_ID: &str = "user-2";
pub const ADMIN_USER_ID: &str = "admin-1";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: Client,
    pub gateway: MockServer,
    pub orders: Arc<InMemoryOrderStore>,
    pub bookings: Arc<InMemoryBookingStore>,
    pub rooms: Arc<InMemoryRoomDirectory>,
    pub webhook_log: Arc<InMemoryWebhookLog>,
    pub webhook_key: Option<String>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(None).await
    }

    /// Spawn with webhook signature checks turned on.
    pub async fn spawn_with_webhook_key(key: &str) -> Self {
        Self::spawn_with(Some(key.to_string())).await
    }

    async fn spawn_with(webhook_key: Option<String>) -> Self {
        let gateway = MockServer::start().await;

        let config = OrderServiceConfig {
            common: CoreConfig {
                port: 0, // Random port
                log_level: "debug".to_string(),
            },
            service_name: "order-service-test".to_string(),
            mongodb: MongoConfig {
                uri: Secret::new("mongodb://localhost:27017".to_string()),
                database: "order_test".to_string(),
            },
            gateway: GatewayConfig {
                base_url: gateway.uri(),
                key_id: "test-key-id".to_string(),
                client_id: "test-client".to_string(),
                secret_key: Secret::new("test-secret".to_string()),
                webhook_key: webhook_key.clone().map(Secret::new),
                timeout_secs: 5,
            },
            room_cache: RoomCacheConfig {
                ttl_secs: 60,
                capacity: 100,
            },
            otlp_endpoint: None,
        };

        let orders = Arc::new(InMemoryOrderStore::new());
        let bookings = Arc::new(InMemoryBookingStore::new());
        let rooms = Arc::new(InMemoryRoomDirectory::new());
        let webhook_log = Arc::new(InMemoryWebhookLog::new());

        rooms
            .upsert(Room {
                id: ROOM_ID.to_string(),
                name: "Boardroom".to_string(),
                capacity: 8,
                price: Decimal::new(3000, 2),
                is_available: true,
            })
            .await;

        let stores = Stores {
            orders: orders.clone(),
            bookings: bookings.clone(),
            rooms: rooms.clone(),
            webhook_log: webhook_log.clone(),
        };

        let app = Application::build_with_stores(config, stores, None)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
            gateway,
            orders,
            bookings,
            rooms,
            webhook_log,
            webhook_key,
        }
    }

    pub fn request(&self, method: Method, path: &str, user_id: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.address, path))
            .header("X-User-ID", user_id)
            .header("X-User-Name", "Ada Lovelace")
            .header("X-User-Email", "ada@example.com")
            .header("X-User-Phone", "5550100")
    }

    pub fn admin_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path, ADMIN_USER_ID)
            .header("X-User-Role", "admin")
    }

    pub async fn create_order(&self, user_id: &str, body: &Value) -> Response {
        self.request(Method::POST, "/orders", user_id)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Create a takeaway order for `user_id` and return its `orderId`.
    pub async fn seed_order(&self, user_id: &str) -> String {
        let response = self.create_order(user_id, &order_body(None)).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["data"]["orderId"]
            .as_str()
            .expect("orderId missing")
            .to_string()
    }

    pub async fn get_order(&self, user_id: &str, order_id: &str) -> Value {
        let response = self
            .request(Method::GET, &format!("/orders/{}", order_id), user_id)
            .send()
            .await
            .expect("Failed to execute request");
        assert!(response.status().is_success());
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["data"].clone()
    }

    pub async fn create_booking(&self, user_id: &str, body: &Value) -> Response {
        self.request(Method::POST, "/room-bookings", user_id)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Deliver a webhook, signed when the app checks signatures.
    pub async fn send_webhook(&self, body: &Value) -> Response {
        let mut request = self
            .client
            .post(format!("{}/payment/webhook", self.address))
            .json(body);
        if let Some(key) = &self.webhook_key {
            request = request.header("Authorization", sign_webhook(key, body));
        }
        request.send().await.expect("Failed to execute request")
    }

    /// Provider accepts payment creation and answers with `provider_id`.
    pub async fn mock_payment_created(&self, provider_id: &str) {
        Mock::given(method("POST"))
            .and(path("/api/v1/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultObj": {
                    "id": provider_id,
                    "payUrl": format!("https://pay.test/{}", provider_id),
                    "statusId": 1
                },
                "hasValidationError": false
            })))
            .mount(&self.gateway)
            .await;
    }

    pub async fn mock_payment_lookup(&self, provider_id: &str, status_id: i64) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/v1/payments/.+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultObj": { "id": provider_id, "statusId": status_id }
            })))
            .mount(&self.gateway)
            .await;
    }
}

pub fn order_body(order_id: Option<&str>) -> Value {
    let mut body = json!({
        "orderType": "Takeaway",
        "items": [{
            "menuItem": "menu-1",
            "foodName": "Tomato Soup",
            "quantity": 2,
            "foodPrice": 5.0,
            "totalPrice": 10.0
        }],
        "orderTotal": 10.0,
        "paymentMethod": "online"
    });
    if let Some(id) = order_id {
        body["orderId"] = json!(id);
    }
    body
}

pub fn booking_body(start: &str, end: &str) -> Value {
    json!({
        "room": ROOM_ID,
        "bookingDate": "2030-01-15",
        "startTime": start,
        "endTime": end,
        "purpose": "Team planning",
        "customerName": "Ada Lovelace",
        "customerPhone": "5550100",
        "customerEmail": "ada@example.com"
    })
}

pub fn payment_body(order_id: &str, amount: f64) -> Value {
    json!({
        "amount": amount,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "phone": "5550100",
        "email": "ada@example.com",
        "orderId": order_id
    })
}

pub fn sign_webhook(key: &str, body: &Value) -> String {
    let payload: WebhookPayload =
        serde_json::from_value(body.clone()).expect("Invalid webhook body");
    let fields = payload.signed_fields();
    let borrowed: Vec<(&str, Option<&str>)> =
        fields.iter().map(|(k, v)| (*k, v.as_deref())).collect();
    sign_base64(key, &canonical_field_string(&borrowed)).expect("Failed to sign webhook")
}
