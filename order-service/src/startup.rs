//! Application wiring and server lifecycle.

use axum::{
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use mongodb::{options::ClientOptions, Client, Database};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{request_id, request_id_middleware},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::OrderServiceConfig;
use crate::handlers;
use crate::models::CapabilityTable;
use crate::services::mongo::{
    MongoBookingStore, MongoOrderStore, MongoRoomDirectory, MongoWebhookLog,
};
use crate::services::{
    BookingService, BookingStore, BroadcastNotifier, CachedRoomDirectory, CheckoutService,
    Notifier, OrderService, OrderStore, PaymentGateway, PaymentGatewayClient,
    ReconciliationEngine, RoomDirectory, StoreError, TtlCache, WebhookLogStore,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub bookings: BookingService,
    pub checkout: CheckoutService,
    pub reconciliation: ReconciliationEngine,
    pub live: BroadcastNotifier,
    pub capabilities: Arc<CapabilityTable>,
    /// `None` when running on in-memory stores.
    pub db: Option<Database>,
}

/// Storage backends the services run on.
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub rooms: Arc<dyn RoomDirectory>,
    pub webhook_log: Arc<dyn WebhookLogStore>,
}

impl Stores {
    /// MongoDB-backed stores with their indexes in place.
    pub async fn mongo(db: &Database) -> Result<Self, AppError> {
        let orders = MongoOrderStore::new(db);
        let bookings = MongoBookingStore::new(db);
        let webhook_log = MongoWebhookLog::new(db);

        orders.init_indexes().await.map_err(index_error)?;
        bookings.init_indexes().await.map_err(index_error)?;
        webhook_log.init_indexes().await.map_err(index_error)?;

        Ok(Self {
            orders: Arc::new(orders),
            bookings: Arc::new(bookings),
            rooms: Arc::new(MongoRoomDirectory::new(db)),
            webhook_log: Arc::new(webhook_log),
        })
    }
}

fn index_error(e: StoreError) -> AppError {
    tracing::error!("Failed to initialize database indexes: {}", e);
    AppError::DatabaseError(e.into())
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Connect to MongoDB and build the application on it.
    pub async fn build(config: OrderServiceConfig) -> Result<Self, AppError> {
        let mut client_options = ClientOptions::parse(config.mongodb.uri.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                AppError::DatabaseError(e.into())
            })?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(e.into())
        })?;
        let db = client.database(&config.mongodb.database);

        let stores = Stores::mongo(&db).await?;
        Self::build_with_stores(config, stores, Some(db)).await
    }

    /// Build the application on the given stores. Port 0 binds a random port.
    pub async fn build_with_stores(
        config: OrderServiceConfig,
        stores: Stores,
        db: Option<Database>,
    ) -> Result<Self, AppError> {
        let capabilities = Arc::new(CapabilityTable::standard());
        let live = BroadcastNotifier::default();
        let notifier: Arc<dyn Notifier> = Arc::new(live.clone());

        let rooms: Arc<dyn RoomDirectory> = Arc::new(CachedRoomDirectory::new(
            stores.rooms,
            TtlCache::new(
                Duration::from_secs(config.room_cache.ttl_secs),
                config.room_cache.capacity,
            ),
        ));

        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            PaymentGatewayClient::new(config.gateway.clone()).map_err(AppError::ConfigError)?,
        );
        if config.gateway.webhook_key.is_none() {
            tracing::warn!("PAYMENT_GATEWAY_WEBHOOK_KEY not set - webhook signatures are not verified");
        }

        let orders = OrderService::new(stores.orders.clone(), notifier.clone(), capabilities.clone());
        let bookings = BookingService::new(stores.bookings.clone(), rooms, capabilities.clone());
        let checkout = CheckoutService::new(
            orders.clone(),
            bookings.clone(),
            gateway.clone(),
            capabilities.clone(),
            config.gateway.timeout(),
        );
        let reconciliation = ReconciliationEngine::new(
            stores.orders,
            stores.bookings,
            stores.webhook_log,
            gateway,
            notifier,
        );

        let state = AppState {
            orders,
            bookings,
            checkout,
            reconciliation,
            live,
            capabilities,
            db,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, service = %config.service_name, "Order service listening");

        Ok(Self {
            port,
            listener,
            router: router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/orders/:order_id", get(handlers::orders::get_order))
        .route(
            "/orders/:order_id/status",
            put(handlers::orders::update_order_status),
        )
        .route(
            "/room-bookings",
            get(handlers::bookings::list_bookings).post(handlers::bookings::create_room_booking),
        )
        .route(
            "/room-bookings/:id",
            get(handlers::bookings::get_booking).delete(handlers::bookings::delete_booking),
        )
        .route(
            "/room-bookings/:id/status",
            put(handlers::bookings::update_booking_status),
        )
        .route("/payment/create", post(handlers::payments::create_payment))
        .route(
            "/payment/verify/:payment_id",
            get(handlers::payments::verify_payment),
        )
        .route("/payment/webhook", post(handlers::payments::webhook))
        .route(
            "/payment/reconciliation/unmatched",
            get(handlers::payments::list_unmatched),
        )
        .route(
            "/payment/reconciliation/replay",
            post(handlers::payments::replay_unmatched),
        )
        .route("/live/:channel", get(handlers::live::stream))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request_id(request.headers()).unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
