//! Integration tests for the API.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tower::ServiceExt;

use ticket_checkout::api::{RateLimitConfig, create_router, create_router_with_rate_limit};
use ticket_checkout::app::{AppService, AppState, MonitorConfig, ServiceConfig};
use ticket_checkout::domain::{
    BookingResponse, CreatePaymentRequest, Currency, ErrorResponse, HealthResponse, HealthStatus,
    Match, MatchDetails, OrderStatus, OrderWithPayment, PaymentCheckResult, PaymentStatus,
    PaymentSummary, RateLimitResponse, ReserveSeatsRequest, SeatListing, WalletDirectory,
};
use ticket_checkout::test_utils::{
    MockChainObserver, MockDatabaseClient, MockPriceFeed, SeededCatalog,
};

struct TestApp {
    state: Arc<AppState>,
    db: Arc<MockDatabaseClient>,
    observer: Arc<MockChainObserver>,
    catalog: SeededCatalog,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(MockDatabaseClient::new());
        let catalog = db.seed_demo_catalog();
        let observer = Arc::new(MockChainObserver::new());
        let feed = Arc::new(MockPriceFeed::new().with_price(Currency::Btc, Decimal::from(60_000)));
        let config = ServiceConfig {
            monitor: MonitorConfig {
                interval: Duration::from_secs(3600),
                max_backoff_multiplier: 8,
            },
            ..ServiceConfig::default()
        };
        let service = Arc::new(AppService::new(
            Arc::clone(&db) as _,
            feed,
            Arc::clone(&observer) as _,
            WalletDirectory::testnet_defaults(),
            config,
        ));
        let state = Arc::new(AppState::new(service, Arc::clone(&db) as _));
        Self {
            state,
            db,
            observer,
            catalog,
        }
    }

    fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }
}

fn post_json<T: serde::Serialize>(uri: &str, payload: &T) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(payload).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body_bytes).unwrap()
}

async fn book(app: &TestApp, seats: Vec<String>) -> BookingResponse {
    let response = app
        .router()
        .oneshot(post_json("/bookings", &ReserveSeatsRequest::new("buyer-1", seats)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

#[tokio::test]
async fn test_reserve_seats_success() {
    let app = TestApp::new();
    let seats = app.catalog.vip_seats[..2].to_vec();

    let booking = book(&app, seats.clone()).await;
    assert_eq!(booking.seats_booked, 2);
    assert_eq!(booking.total_amount, Decimal::from(400));

    for seat in &seats {
        assert!(app.db.seat(seat).unwrap().booked);
    }
}

#[tokio::test]
async fn test_reserve_seats_validation_error() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(post_json("/bookings", &ReserveSeatsRequest::new("", vec![app.catalog.vip_seats[0].clone()])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.error.r#type, "validation_error");
}

#[tokio::test]
async fn test_reserve_too_many_seats_rejected() {
    let app = TestApp::new();
    let seats = app.catalog.regular_seats[..11].to_vec();

    let response = app
        .router()
        .oneshot(post_json("/bookings", &ReserveSeatsRequest::new("buyer-1", seats)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reserve_booked_seat_conflict_names_seat() {
    let app = TestApp::new();
    let taken = app.catalog.vip_seats[0].clone();
    book(&app, vec![taken.clone()]).await;

    let response = app
        .router()
        .oneshot(post_json(
            "/bookings",
            &ReserveSeatsRequest::new("buyer-2", vec![app.catalog.vip_seats[1].clone(), taken.clone()]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.error.r#type, "seat_unavailable");
    assert_eq!(error.error.seat_id.as_deref(), Some(taken.as_str()));
    assert!(!app.db.seat(&app.catalog.vip_seats[1]).unwrap().booked);
}

#[tokio::test]
async fn test_reserve_unknown_seat_not_found() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(post_json(
            "/bookings",
            &ReserveSeatsRequest::new("buyer-1", vec!["no-such-seat".to_string()]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_payment_and_status() {
    let app = TestApp::new();
    let booking = book(&app, app.catalog.vip_seats[..1].to_vec()).await;

    let response = app
        .router()
        .oneshot(post_json(
            "/payment/create",
            &CreatePaymentRequest {
                order_id: booking.order_id.clone(),
                currency: Currency::Btc,
            },
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let summary: PaymentSummary = read_json(response).await;
    assert_eq!(summary.payment.crypto_amount.to_string(), "0.00333333");
    assert_eq!(summary.payment.status, PaymentStatus::Pending);
    assert!(summary.payment.reference.starts_with(&format!("ORDER-{}-", booking.order_id)));
    assert!(summary.payment_uri.starts_with("bitcoin:"));
    assert!(summary.time_remaining_ms > 0);

    let response = app
        .router()
        .oneshot(get(&format!("/payment/status/{}", booking.order_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status: PaymentSummary = read_json(response).await;
    assert_eq!(status.payment.id, summary.payment.id);

    app.state.service.monitors().shutdown().await;
}

#[tokio::test]
async fn test_create_payment_twice_is_conflict() {
    let app = TestApp::new();
    let booking = book(&app, app.catalog.regular_seats[..1].to_vec()).await;
    let request = CreatePaymentRequest {
        order_id: booking.order_id.clone(),
        currency: Currency::Usdt,
    };

    let first = app.router().oneshot(post_json("/payment/create", &request)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.router().oneshot(post_json("/payment/create", &request)).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let error: ErrorResponse = read_json(second).await;
    assert_eq!(error.error.r#type, "duplicate");

    app.state.service.monitors().shutdown().await;
}

#[tokio::test]
async fn test_create_payment_unknown_order() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(post_json(
            "/payment/create",
            &CreatePaymentRequest {
                order_id: "missing".to_string(),
                currency: Currency::Eth,
            },
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_payment_status_is_gone_for_new_payment() {
    let app = TestApp::new();
    let booking = book(&app, app.catalog.vip_seats[..1].to_vec()).await;
    let request = CreatePaymentRequest {
        order_id: booking.order_id.clone(),
        currency: Currency::Btc,
    };
    let summary: PaymentSummary =
        read_json(app.router().oneshot(post_json("/payment/create", &request)).await.unwrap()).await;
    app.state.service.monitors().shutdown().await;

    app.db
        .set_payment_expiry(&summary.payment.id, chrono::Utc::now() - chrono::Duration::seconds(1));

    let response = app
        .router()
        .oneshot(get(&format!("/payment/status/{}", booking.order_id)))
        .await
        .unwrap();
    let status: PaymentSummary = read_json(response).await;
    assert_eq!(status.payment.status, PaymentStatus::Expired);
    assert_eq!(status.time_remaining_ms, 0);
    assert_eq!(status.message, "Payment window expired");
    assert!(!app.db.seat(&app.catalog.vip_seats[0]).unwrap().booked);

    let retry = app.router().oneshot(post_json("/payment/create", &request)).await.unwrap();
    assert_eq!(retry.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_check_payment_confirms_order() {
    let app = TestApp::new();
    let booking = book(&app, app.catalog.vip_seats[..1].to_vec()).await;
    let summary: PaymentSummary = read_json(
        app.router()
            .oneshot(post_json(
                "/payment/create",
                &CreatePaymentRequest {
                    order_id: booking.order_id.clone(),
                    currency: Currency::Btc,
                },
            ))
            .await
            .unwrap(),
    )
    .await;
    app.state.service.monitors().shutdown().await;

    app.observer
        .set_transaction(Currency::Btc, summary.payment.crypto_amount, 1, "tx-confirmed");

    let response = app
        .router()
        .oneshot(get(&format!("/payment/check/{}", booking.order_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result: PaymentCheckResult = read_json(response).await;
    assert_eq!(result.status, PaymentStatus::Completed);
    assert_eq!(result.tx_hash.as_deref(), Some("tx-confirmed"));
    assert_eq!(result.message, "Payment confirmed!");

    let response = app
        .router()
        .oneshot(get(&format!("/orders/{}", booking.order_id)))
        .await
        .unwrap();
    let order: OrderWithPayment = read_json(response).await;
    assert_eq!(order.order.status, OrderStatus::Confirmed);
    assert!(app.db.seat(&app.catalog.vip_seats[0]).unwrap().booking_final);
}

#[tokio::test]
async fn test_catalog_endpoints() {
    let app = TestApp::new();

    let response = app.router().oneshot(get("/matches")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let matches: Vec<Match> = read_json(response).await;
    assert_eq!(matches.len(), 1);

    let response = app
        .router()
        .oneshot(get(&format!("/matches/{}", app.catalog.match_id)))
        .await
        .unwrap();
    let details: MatchDetails = read_json(response).await;
    assert_eq!(details.ticket_classes.len(), 2);

    book(&app, app.catalog.vip_seats[..3].to_vec()).await;
    let response = app
        .router()
        .oneshot(get(&format!("/matches/{}/seats?ticket_class=VIP", app.catalog.match_id)))
        .await
        .unwrap();
    let seats: Vec<SeatListing> = read_json(response).await;
    assert_eq!(seats.len(), 27);
    assert!(seats.iter().all(|s| s.ticket_class == "VIP" && !s.seat.booked));

    let response = app.router().oneshot(get("/matches/unknown/seats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_buyer_orders_most_recent_first() {
    let app = TestApp::new();
    let first = book(&app, app.catalog.vip_seats[..1].to_vec()).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = book(&app, app.catalog.vip_seats[1..2].to_vec()).await;

    let response = app.router().oneshot(get("/orders/buyer/buyer-1")).await.unwrap();
    let orders: Vec<OrderWithPayment> = read_json(response).await;
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].order.id, second.order_id);
    assert_eq!(orders[1].order.id, first.order_id);
    assert!(orders.iter().all(|o| o.payment.is_none()));
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let response = app.router().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthResponse = read_json(response).await;
    assert_eq!(health.status, HealthStatus::Healthy);

    let response = app.router().oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    app.db.set_healthy(false);
    let response = app.router().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let app = TestApp::new();
    let config = RateLimitConfig {
        requests_per_second: std::num::NonZeroU32::MIN,
        burst_size: std::num::NonZeroU32::MIN,
    };
    let router = create_router_with_rate_limit(Arc::clone(&app.state), config);

    let first = router.clone().oneshot(get("/matches")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router.clone().oneshot(get("/matches")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: RateLimitResponse = read_json(second).await;
    assert!(body.retry_after >= 1);

    // Probes are not limited
    let health = router.oneshot(get("/health/live")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}
