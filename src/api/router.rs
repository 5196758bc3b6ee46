//! Router assembly and middleware.

use std::env;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use governor::{
    DefaultDirectRateLimiter, Quota, RateLimiter,
    clock::{Clock, DefaultClock},
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    ApiDoc, check_payment_handler, create_payment_handler, get_match_handler, get_order_handler,
    health_check_handler, list_buyer_orders_handler, list_matches_handler, list_seats_handler,
    liveness_handler, payment_status_handler, readiness_handler, reserve_seats_handler,
};
use crate::app::AppState;
use crate::domain::{ErrorDetail, RateLimitResponse};

/// Upper bound on one HTTP request, including a synchronous ledger check
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Global token bucket settings
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_second: NonZeroU32,
    pub burst_size: NonZeroU32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: NonZeroU32::MIN.saturating_add(9),
            burst_size: NonZeroU32::MIN.saturating_add(19),
        }
    }
}

impl RateLimitConfig {
    /// Read `RATE_LIMIT_RPS` and `RATE_LIMIT_BURST`, keeping defaults for
    /// missing or zero values
    pub fn from_env() -> Self {
        let read = |key: &str| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .and_then(NonZeroU32::new)
        };
        let defaults = Self::default();
        Self {
            requests_per_second: read("RATE_LIMIT_RPS").unwrap_or(defaults.requests_per_second),
            burst_size: read("RATE_LIMIT_BURST").unwrap_or(defaults.burst_size),
        }
    }

    fn limiter(&self) -> DefaultDirectRateLimiter {
        RateLimiter::direct(Quota::per_second(self.requests_per_second).allow_burst(self.burst_size))
    }
}

async fn rate_limit_middleware(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(()) => next.run(request).await,
        Err(not_until) => {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait.as_secs().max(1);
            warn!(retry_after, "Rate limit exceeded");

            let body = Json(RateLimitResponse {
                error: ErrorDetail {
                    r#type: "rate_limited".to_string(),
                    message: "Rate limit exceeded".to_string(),
                    seat_id: None,
                },
                retry_after,
            });
            let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}

fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/bookings", post(reserve_seats_handler))
        .route("/payment/create", post(create_payment_handler))
        .route("/payment/status/{order_id}", get(payment_status_handler))
        .route("/payment/check/{order_id}", get(check_payment_handler))
        .route("/matches", get(list_matches_handler))
        .route("/matches/{id}", get(get_match_handler))
        .route("/matches/{id}/seats", get(list_seats_handler))
        .route("/orders/{id}", get(get_order_handler))
        .route("/orders/buyer/{buyer_id}", get(list_buyer_orders_handler))
        .with_state(state)
}

fn health_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}

fn with_common_layers(router: Router) -> Router {
    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create the router without rate limiting
pub fn create_router(state: Arc<AppState>) -> Router {
    with_common_layers(api_routes(Arc::clone(&state)).merge(health_routes(state)))
}

/// Create the router with a global rate limit on the API routes.
/// Health probes are never limited.
pub fn create_router_with_rate_limit(state: Arc<AppState>, config: RateLimitConfig) -> Router {
    let limiter = Arc::new(config.limiter());
    let api = api_routes(Arc::clone(&state))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    with_common_layers(api.merge(health_routes(state)))
}
