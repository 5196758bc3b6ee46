//! Domain types with validation support.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Maximum number of seats a single reservation may claim
pub const MAX_SEATS_PER_ORDER: usize = 10;

/// Supported settlement currencies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Btc,
    Eth,
    Usdt,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Btc, Currency::Eth, Currency::Usdt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Eth => "ETH",
            Self::Usdt => "USDT",
        }
    }

    /// Stable coins track the dollar and settle in cents
    pub fn is_stablecoin(&self) -> bool {
        matches!(self, Self::Usdt)
    }

    /// Decimal places a converted amount is rounded to
    pub fn decimals(&self) -> u32 {
        if self.is_stablecoin() { 2 } else { 8 }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Self::Btc),
            "ETH" => Ok(Self::Eth),
            "USDT" => Ok(Self::Usdt),
            _ => Err(format!("Invalid currency: {}", s)),
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger network a collection wallet lives on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testnet => "testnet",
            Self::Mainnet => "mainnet",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "testnet" => Ok(Self::Testnet),
            "mainnet" => Ok(Self::Mainnet),
            _ => Err(format!("Invalid network: {}", s)),
        }
    }
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Seats reserved, no payment requested yet
    #[default]
    Pending,
    /// Payment created, waiting for funds
    PendingPayment,
    /// Payment completed, seats are final
    Confirmed,
    /// Payment expired, seats released
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingPayment => "pending_payment",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "pending_payment" => Ok(Self::PendingPayment),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment lifecycle status.
///
/// `Pending -> Confirming -> Completed`, or `Pending | Confirming -> Expired`.
/// `Completed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Waiting for a matching transaction
    #[default]
    Pending,
    /// Matching transaction seen, below the confirmation threshold
    Confirming,
    /// Confirmed on chain
    Completed,
    /// Payment window closed without confirmation
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirming => "confirming",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirming" => Ok(Self::Confirming),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scheduled event that seats are sold for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Match {
    #[schema(example = "0193a3f0-2a4b-7c1e-9d8f-1a2b3c4d5e6f")]
    pub id: String,
    #[schema(example = "Brazil vs Morocco")]
    pub title: String,
    #[schema(example = "MetLife Stadium, New York")]
    pub venue: String,
    pub starts_at: DateTime<Utc>,
}

/// A priced tier of seats with its own capacity counter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TicketClass {
    pub id: String,
    pub match_id: String,
    #[schema(example = "VIP")]
    pub name: String,
    /// Unit price in USD
    #[schema(value_type = String, example = "200.00")]
    pub price: Decimal,
    pub available_count: i32,
    pub total_count: i32,
}

/// A single bookable seat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Seat {
    pub id: String,
    pub match_id: String,
    pub ticket_class_id: String,
    #[schema(example = "VIP")]
    pub section: String,
    #[schema(example = "A")]
    pub row: String,
    #[schema(example = "A1")]
    pub label: String,
    pub booked: bool,
    /// Set once the owning order's payment completed
    pub booking_final: bool,
    /// Back-reference to the order item holding this seat
    pub order_item_id: Option<String>,
}

/// A seat together with the price it currently sells for (display only)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeatListing {
    #[serde(flatten)]
    pub seat: Seat,
    pub ticket_class: String,
    #[schema(value_type = String, example = "100.00")]
    pub price: Decimal,
}

/// Match with all its ticket classes
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchDetails {
    #[serde(rename = "match")]
    pub event: Match,
    pub ticket_classes: Vec<TicketClass>,
}

/// One seat inside an order, with the price charged at booking time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub ticket_class_id: String,
    pub seat_id: Option<String>,
    pub seat_label: Option<String>,
    #[schema(value_type = String, example = "200.00")]
    pub price: Decimal,
}

/// A buyer's claim on a set of seats
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Order {
    pub id: String,
    pub buyer_id: String,
    /// Sum of the snapshotted item prices (USD)
    #[schema(value_type = String, example = "300.00")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Seat ids held by this order
    pub fn seat_ids(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| item.seat_id.as_deref())
            .collect()
    }
}

/// Crypto settlement record for one order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    #[schema(value_type = String, example = "300.00")]
    pub fiat_amount: Decimal,
    pub currency: Currency,
    /// Rounded amount the chain observer matches against
    #[schema(value_type = String, example = "0.00500000")]
    pub crypto_amount: Decimal,
    /// USD price of one unit of `currency` at creation
    #[schema(value_type = String, example = "60000")]
    pub exchange_rate: Decimal,
    pub wallet_address: String,
    pub network: Network,
    #[schema(example = "ORDER-abc123-1699564800000-x7k2")]
    pub reference: String,
    pub status: PaymentStatus,
    pub confirmations: i32,
    pub tx_hash: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Payment URI understood by wallets (and QR renderers)
    pub fn payment_uri(&self) -> String {
        match self.currency {
            Currency::Btc => format!("bitcoin:{}?amount={}", self.wallet_address, self.crypto_amount),
            Currency::Eth | Currency::Usdt => {
                format!("ethereum:{}?value={}", self.wallet_address, self.crypto_amount)
            }
        }
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Everything needed to persist a fresh payment
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: String,
    pub fiat_amount: Decimal,
    pub currency: Currency,
    pub crypto_amount: Decimal,
    pub exchange_rate: Decimal,
    pub wallet_address: String,
    pub network: Network,
    pub reference: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of a single ledger lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainObservation {
    pub found: bool,
    pub received_amount: Option<Decimal>,
    pub confirmations: u32,
    pub required_confirmations: u32,
    pub tx_hash: Option<String>,
    pub is_complete: bool,
}

impl ChainObservation {
    /// No matching transaction yet. This is the normal pending answer, not an error.
    pub fn not_found(required_confirmations: u32) -> Self {
        Self {
            found: false,
            received_amount: None,
            confirmations: 0,
            required_confirmations,
            tx_hash: None,
            is_complete: false,
        }
    }

    pub fn matched(
        received_amount: Decimal,
        confirmations: u32,
        required_confirmations: u32,
        tx_hash: String,
    ) -> Self {
        Self {
            found: true,
            received_amount: Some(received_amount),
            confirmations,
            required_confirmations,
            tx_hash: Some(tx_hash),
            is_complete: confirmations >= required_confirmations,
        }
    }

    pub fn needs_more_confirmations(&self) -> u32 {
        self.required_confirmations.saturating_sub(self.confirmations)
    }
}

/// Relative tolerance when matching a received amount (0.1%)
pub const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Whether `received` is within [`AMOUNT_TOLERANCE`] of `expected`
pub fn amount_matches(received: Decimal, expected: Decimal) -> bool {
    (received - expected).abs() <= expected.abs() * AMOUNT_TOLERANCE
}

/// Outcome of one state machine tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentCheckResult {
    pub order_id: String,
    pub payment_id: String,
    pub status: PaymentStatus,
    /// Whether a matching transaction has been observed
    pub found: bool,
    pub confirmations: i32,
    pub required_confirmations: u32,
    pub needs_more_confirmations: u32,
    pub tx_hash: Option<String>,
    #[schema(example = "Waiting for payment...")]
    pub message: String,
}

impl PaymentCheckResult {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Persisted payment view returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentSummary {
    #[serde(flatten)]
    pub payment: Payment,
    pub payment_uri: String,
    /// Milliseconds left before expiry, zero once past it
    pub time_remaining_ms: i64,
    pub message: String,
}

/// An order together with its payment, if one was created
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderWithPayment {
    #[serde(flatten)]
    pub order: Order,
    pub payment: Option<Payment>,
}

/// Request to reserve seats
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReserveSeatsRequest {
    #[validate(length(min = 1, message = "Buyer ID is required"))]
    #[schema(example = "buyer-42")]
    pub buyer_id: String,
    #[validate(length(min = 1, max = 10, message = "Between 1 and 10 seat IDs are required"))]
    pub seat_ids: Vec<String>,
}

impl ReserveSeatsRequest {
    #[must_use]
    pub fn new(buyer_id: impl Into<String>, seat_ids: Vec<String>) -> Self {
        Self {
            buyer_id: buyer_id.into(),
            seat_ids,
        }
    }
}

/// Reservation outcome returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    pub order_id: String,
    #[schema(value_type = String, example = "300.00")]
    pub total_amount: Decimal,
    pub seats_booked: usize,
}

impl From<&Order> for BookingResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            total_amount: order.total_amount,
            seats_booked: order.seat_ids().len(),
        }
    }
}

/// Request to open a payment for an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentRequest {
    #[validate(length(min = 1, message = "Order ID is required"))]
    pub order_id: String,
    pub currency: Currency,
}

/// Seat listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SeatQuery {
    /// Ticket class name, e.g. `VIP`
    pub ticket_class: Option<String>,
}

/// Collection address for one currency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionWallet {
    pub address: String,
    pub network: Network,
}

/// Collection wallets keyed by currency
#[derive(Debug, Clone, Default)]
pub struct WalletDirectory {
    wallets: HashMap<Currency, CollectionWallet>,
}

impl WalletDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_wallet(mut self, currency: Currency, address: impl Into<String>, network: Network) -> Self {
        self.wallets.insert(
            currency,
            CollectionWallet {
                address: address.into(),
                network,
            },
        );
        self
    }

    pub fn get(&self, currency: Currency) -> Option<&CollectionWallet> {
        self.wallets.get(&currency)
    }

    /// Testnet defaults
    #[must_use]
    pub fn testnet_defaults() -> Self {
        Self::new()
            .with_wallet(
                Currency::Btc,
                "tb1q9pvjqz5u5sdgpatg3wn0ce438u5cyv85lly0pc",
                Network::Testnet,
            )
            .with_wallet(
                Currency::Eth,
                "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb",
                Network::Testnet,
            )
            .with_wallet(
                Currency::Usdt,
                "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb",
                Network::Testnet,
            )
    }
}

/// Per-currency number of confirmations before a payment is final
#[derive(Debug, Clone)]
pub struct ConfirmationPolicy {
    required: HashMap<Currency, u32>,
}

impl ConfirmationPolicy {
    pub fn required(&self, currency: Currency) -> u32 {
        self.required.get(&currency).copied().unwrap_or(1)
    }

    #[must_use]
    pub fn with_required(mut self, currency: Currency, confirmations: u32) -> Self {
        self.required.insert(currency, confirmations);
        self
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            required: HashMap::from([(Currency::Btc, 1), (Currency::Eth, 12), (Currency::Usdt, 12)]),
        }
    }
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: HealthStatus,
    /// Number of payment monitors currently running
    pub active_monitors: usize,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(database: HealthStatus, active_monitors: usize) -> Self {
        Self {
            status: database,
            database,
            active_monitors,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    #[schema(example = "seat_unavailable")]
    pub r#type: String,
    #[schema(example = "Seat A1 is already booked")]
    pub message: String,
    /// Conflicting seat for `seat_unavailable` errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_id: Option<String>,
}

/// Rate limit exceeded response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateLimitResponse {
    pub error: ErrorDetail,
    #[schema(example = 1)]
    pub retry_after: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_payment_status_display_and_parsing() {
        let statuses = vec![
            (PaymentStatus::Pending, "pending"),
            (PaymentStatus::Confirming, "confirming"),
            (PaymentStatus::Completed, "completed"),
            (PaymentStatus::Expired, "expired"),
        ];

        for (status, string) in statuses {
            assert_eq!(status.as_str(), string);
            assert_eq!(status.to_string(), string);
            assert_eq!(PaymentStatus::from_str(string).unwrap(), status);
        }

        assert!(PaymentStatus::from_str("refunded").is_err());
    }

    #[test]
    fn test_order_status_display_and_parsing() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::PendingPayment,
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::from_str("shipped").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Confirming.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
    }

    #[test]
    fn test_currency_parsing_and_decimals() {
        assert_eq!(Currency::from_str("btc").unwrap(), Currency::Btc);
        assert_eq!(Currency::from_str("USDT").unwrap(), Currency::Usdt);
        assert!(Currency::from_str("DOGE").is_err());
        assert_eq!(Currency::Btc.decimals(), 8);
        assert_eq!(Currency::Eth.decimals(), 8);
        assert_eq!(Currency::Usdt.decimals(), 2);
        assert_eq!(serde_json::to_string(&Currency::Eth).unwrap(), "\"ETH\"");
    }

    #[test]
    fn test_reserve_request_validation() {
        let req = ReserveSeatsRequest::new("buyer", vec!["s1".to_string()]);
        assert!(req.validate().is_ok());

        let req = ReserveSeatsRequest::new("", vec!["s1".to_string()]);
        assert!(req.validate().is_err());

        let req = ReserveSeatsRequest::new("buyer", vec![]);
        assert!(req.validate().is_err());

        let too_many = (0..11).map(|i| format!("s{}", i)).collect();
        let req = ReserveSeatsRequest::new("buyer", too_many);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_chain_observation_confirmation_math() {
        let obs = ChainObservation::matched(Decimal::ONE, 4, 12, "0xabc".to_string());
        assert!(obs.found);
        assert!(!obs.is_complete);
        assert_eq!(obs.needs_more_confirmations(), 8);

        let obs = ChainObservation::matched(Decimal::ONE, 15, 12, "0xabc".to_string());
        assert!(obs.is_complete);
        assert_eq!(obs.needs_more_confirmations(), 0);

        let obs = ChainObservation::not_found(1);
        assert!(!obs.found);
        assert_eq!(obs.needs_more_confirmations(), 1);
    }

    #[test]
    fn test_amount_tolerance() {
        let expected = Decimal::from_str("0.00500000").unwrap();
        assert!(amount_matches(expected, expected));
        assert!(amount_matches(Decimal::from_str("0.004995").unwrap(), expected));
        assert!(amount_matches(Decimal::from_str("0.005005").unwrap(), expected));
        assert!(!amount_matches(Decimal::from_str("0.00499").unwrap(), expected));
        assert!(!amount_matches(Decimal::from_str("0.0051").unwrap(), expected));
    }

    #[test]
    fn test_confirmation_policy_defaults() {
        let policy = ConfirmationPolicy::default();
        assert_eq!(policy.required(Currency::Btc), 1);
        assert_eq!(policy.required(Currency::Eth), 12);
        assert_eq!(policy.required(Currency::Usdt), 12);

        let policy = policy.with_required(Currency::Btc, 3);
        assert_eq!(policy.required(Currency::Btc), 3);
    }

    #[test]
    fn test_wallet_directory_defaults() {
        let wallets = WalletDirectory::testnet_defaults();
        for currency in Currency::ALL {
            let wallet = wallets.get(currency).unwrap();
            assert_eq!(wallet.network, Network::Testnet);
        }
    }
}
