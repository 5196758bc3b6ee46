//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use utoipa::OpenApi;

use crate::app::AppState;
use crate::domain::{
    AppError, BookingResponse, CreatePaymentRequest, DatabaseError, ErrorDetail, ErrorResponse,
    ExternalServiceError, HealthResponse, HealthStatus, Match, MatchDetails, OrderWithPayment,
    PaymentCheckResult, PaymentSummary, RateLimitResponse, ReserveSeatsRequest, SeatListing,
    SeatQuery,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ticket Checkout API",
        version = "0.1.0",
        description = "Seat reservation and crypto payment confirmation",
        license(
            name = "MIT"
        )
    ),
    paths(
        reserve_seats_handler,
        create_payment_handler,
        payment_status_handler,
        check_payment_handler,
        list_matches_handler,
        get_match_handler,
        list_seats_handler,
        get_order_handler,
        list_buyer_orders_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
    ),
    components(
        schemas(
            ReserveSeatsRequest,
            BookingResponse,
            CreatePaymentRequest,
            PaymentSummary,
            PaymentCheckResult,
            crate::domain::Payment,
            crate::domain::PaymentStatus,
            crate::domain::Currency,
            crate::domain::Network,
            Match,
            MatchDetails,
            crate::domain::TicketClass,
            crate::domain::Seat,
            SeatListing,
            crate::domain::Order,
            crate::domain::OrderItem,
            crate::domain::OrderStatus,
            OrderWithPayment,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            ErrorDetail,
            RateLimitResponse,
        )
    ),
    tags(
        (name = "bookings", description = "Seat reservation"),
        (name = "payments", description = "Crypto payment lifecycle"),
        (name = "catalog", description = "Matches and seats"),
        (name = "orders", description = "Order lookup"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Reserve seats
///
/// Books every requested seat for the buyer or none of them. The order starts
/// PENDING and holds its seats until a payment for it completes or expires.
#[utoipa::path(
    post,
    path = "/bookings",
    tag = "bookings",
    request_body = ReserveSeatsRequest,
    responses(
        (status = 200, description = "Seats reserved", body = BookingResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown seat", body = ErrorResponse),
        (status = 409, description = "A seat is already booked", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitResponse),
        (status = 503, description = "Store contention, retry later", body = ErrorResponse)
    )
)]
pub async fn reserve_seats_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReserveSeatsRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let order = state.service.reserve_seats(&payload).await?;
    Ok(Json(BookingResponse::from(&order)))
}

/// Create a crypto payment for a PENDING order
///
/// Converts the order total at the current rate, assigns a collection address
/// and reference, and starts watching the ledger for it.
#[utoipa::path(
    post,
    path = "/payment/create",
    tag = "payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Payment created", body = PaymentSummary),
        (status = 400, description = "Order is not awaiting payment", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Payment already created", body = ErrorResponse),
        (status = 410, description = "Payment window expired", body = ErrorResponse),
        (status = 501, description = "Currency not configured", body = ErrorResponse)
    )
)]
pub async fn create_payment_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<Json<PaymentSummary>, AppError> {
    let summary = state.service.create_payment(&payload).await?;
    Ok(Json(summary))
}

/// Persisted payment state with time remaining
#[utoipa::path(
    get,
    path = "/payment/status/{order_id}",
    tag = "payments",
    params(
        ("order_id" = String, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Payment status", body = PaymentSummary),
        (status = 404, description = "No payment for this order", body = ErrorResponse)
    )
)]
pub async fn payment_status_handler(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<PaymentSummary>, AppError> {
    let summary = state.service.payment_status(&order_id).await?;
    Ok(Json(summary))
}

/// Check the ledger now and apply any resulting transition
#[utoipa::path(
    get,
    path = "/payment/check/{order_id}",
    tag = "payments",
    params(
        ("order_id" = String, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Check result", body = PaymentCheckResult),
        (status = 404, description = "No payment for this order", body = ErrorResponse),
        (status = 502, description = "Ledger explorer failed", body = ErrorResponse),
        (status = 504, description = "Ledger explorer timed out", body = ErrorResponse)
    )
)]
pub async fn check_payment_handler(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<PaymentCheckResult>, AppError> {
    let result = state.service.check_payment(&order_id).await?;
    Ok(Json(result))
}

/// List matches
#[utoipa::path(
    get,
    path = "/matches",
    tag = "catalog",
    responses(
        (status = 200, description = "All matches", body = Vec<Match>)
    )
)]
pub async fn list_matches_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Match>>, AppError> {
    Ok(Json(state.service.list_matches().await?))
}

/// Get a match with its ticket classes
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "catalog",
    params(
        ("id" = String, Path, description = "Match ID")
    ),
    responses(
        (status = 200, description = "Match found", body = MatchDetails),
        (status = 404, description = "Match not found", body = ErrorResponse)
    )
)]
pub async fn get_match_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MatchDetails>, AppError> {
    Ok(Json(state.service.get_match(&id).await?))
}

/// Unbooked seats for a match
///
/// Display only. A seat listed here may be booked by the time it is reserved.
#[utoipa::path(
    get,
    path = "/matches/{id}/seats",
    tag = "catalog",
    params(
        ("id" = String, Path, description = "Match ID"),
        ("ticket_class" = Option<String>, Query, description = "Ticket class name filter")
    ),
    responses(
        (status = 200, description = "Available seats", body = Vec<SeatListing>),
        (status = 404, description = "Match not found", body = ErrorResponse)
    )
)]
pub async fn list_seats_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SeatQuery>,
) -> Result<Json<Vec<SeatListing>>, AppError> {
    let seats = state
        .service
        .list_available_seats(&id, query.ticket_class.as_deref())
        .await?;
    Ok(Json(seats))
}

/// Get an order with its items and payment
#[utoipa::path(
    get,
    path = "/orders/{id}",
    tag = "orders",
    params(
        ("id" = String, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order found", body = OrderWithPayment),
        (status = 404, description = "Order not found", body = ErrorResponse)
    )
)]
pub async fn get_order_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderWithPayment>, AppError> {
    Ok(Json(state.service.get_order(&id).await?))
}

/// Orders placed by a buyer, most recent first
#[utoipa::path(
    get,
    path = "/orders/buyer/{buyer_id}",
    tag = "orders",
    params(
        ("buyer_id" = String, Path, description = "Buyer ID")
    ),
    responses(
        (status = 200, description = "Buyer orders", body = Vec<OrderWithPayment>)
    )
)]
pub async fn list_buyer_orders_handler(
    State(state): State<Arc<AppState>>,
    Path(buyer_id): Path<String>,
) -> Result<Json<Vec<OrderWithPayment>>, AppError> {
    Ok(Json(state.service.list_orders_for_buyer(&buyer_id).await?))
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "Application is not ready")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type) = match &self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) => (StatusCode::SERVICE_UNAVAILABLE, "database_error"),
                DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DatabaseError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate"),
                DatabaseError::SerializationConflict(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "serialization_conflict")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            AppError::ExternalService(ext_err) => match ext_err {
                ExternalServiceError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                ExternalServiceError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
                _ => (StatusCode::BAD_GATEWAY, "external_service_error"),
            },
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::SeatUnavailable { .. } => (StatusCode::CONFLICT, "seat_unavailable"),
            AppError::PaymentExpired(_) => (StatusCode::GONE, "payment_expired"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::NotSupported(_) => (StatusCode::NOT_IMPLEMENTED, "not_supported"),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        };

        let message = self.to_string();
        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let seat_id = match self {
            AppError::SeatUnavailable { seat_id, .. } => Some(seat_id),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
                seat_id,
            },
        });

        (status, body).into_response()
    }
}
