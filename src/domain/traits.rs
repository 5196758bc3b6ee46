//! Domain traits defining contracts for the store and external systems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::error::AppError;
use super::types::{
    ChainObservation, Currency, Match, MatchDetails, NewPayment, Order, Payment, SeatListing,
};

/// Transactional store for the catalog, orders and payments.
///
/// `reserve_seats`, `complete_payment` and `expire_payment` must each be a
/// single atomic unit of work. Status-changing methods return `false` when the
/// guarded transition did not apply because another caller got there first.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Check database connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// List all matches, soonest first
    async fn list_matches(&self) -> Result<Vec<Match>, AppError>;

    /// Get a match with its ticket classes
    async fn get_match(&self, match_id: &str) -> Result<Option<MatchDetails>, AppError>;

    /// Unbooked seats for a match, optionally filtered by ticket class name.
    /// Display only.
    async fn list_available_seats(
        &self,
        match_id: &str,
        ticket_class: Option<&str>,
    ) -> Result<Vec<SeatListing>, AppError>;

    /// Book every seat in `seat_ids` for `buyer_id` or none of them.
    ///
    /// Fails with `SeatUnavailable` naming the first booked seat (in request
    /// order), `NotFound` for unknown seats, and `SerializationConflict` when
    /// the store aborts the transaction.
    async fn reserve_seats(&self, buyer_id: &str, seat_ids: &[String]) -> Result<Order, AppError>;

    /// Get an order with its items
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, AppError>;

    /// Orders placed by a buyer, most recent first
    async fn list_orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>, AppError>;

    /// Persist a payment and move its order from PENDING to PENDING_PAYMENT
    async fn create_payment(&self, payment: &NewPayment) -> Result<Payment, AppError>;

    /// Get the payment attached to an order
    async fn get_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>, AppError>;

    /// Store a running confirmation count on a non-terminal payment and move
    /// it to CONFIRMING. The stored count never decreases.
    async fn record_confirmations(
        &self,
        payment_id: &str,
        confirmations: i32,
        tx_hash: Option<&str>,
    ) -> Result<bool, AppError>;

    /// Complete a non-terminal payment, confirm its order and finalize its seats
    async fn complete_payment(
        &self,
        payment_id: &str,
        tx_hash: Option<&str>,
        confirmations: i32,
        confirmed_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Expire a non-terminal payment, cancel its order, release its seats and
    /// restore ticket class availability
    async fn expire_payment(&self, payment_id: &str) -> Result<bool, AppError>;

    /// Payments still PENDING or CONFIRMING
    async fn list_in_flight_payments(&self) -> Result<Vec<Payment>, AppError>;
}

/// External USD price source
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current USD price of one unit of `currency`
    async fn fetch_usd_price(&self, currency: Currency) -> Result<Decimal, AppError>;
}

/// Ledger lookup for a payment matching an expected amount
#[async_trait]
pub trait ChainObserver: Send + Sync {
    /// Look for a transaction to the currency's collection address received
    /// at or after `since` whose amount is within tolerance of `expected`.
    ///
    /// "Not found yet" is `Ok` with `found == false`; transport and API
    /// failures are `Err`.
    async fn check(
        &self,
        currency: Currency,
        expected: Decimal,
        since: DateTime<Utc>,
    ) -> Result<ChainObservation, AppError>;

    /// Confirmations required before a payment in `currency` is final
    fn required_confirmations(&self, currency: Currency) -> u32;
}

/// Downstream consumer of finalized orders (tickets, receipts, email)
#[async_trait]
pub trait FulfillmentNotifier: Send + Sync {
    /// Called once after a payment completes
    async fn payment_completed(&self, order: &Order, payment: &Payment) -> Result<(), AppError>;
}

/// Notifier that only records the fulfillment in the log
pub struct LoggingNotifier;

#[async_trait]
impl FulfillmentNotifier for LoggingNotifier {
    async fn payment_completed(&self, order: &Order, payment: &Payment) -> Result<(), AppError> {
        tracing::info!(
            order_id = %order.id,
            buyer_id = %order.buyer_id,
            seats = order.items.len(),
            currency = %payment.currency,
            tx_hash = ?payment.tx_hash,
            "Order fulfilled"
        );
        Ok(())
    }
}
