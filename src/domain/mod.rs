//! Domain layer containing core business types, traits, and error definitions.

pub mod catalog;
pub mod error;
pub mod traits;
pub mod types;

pub use catalog::{CatalogPlan, CatalogRows, ClassPlan};
pub use error::{AppError, ConfigError, DatabaseError, ExternalServiceError, ValidationError};
pub use traits::{ChainObserver, DatabaseClient, FulfillmentNotifier, LoggingNotifier, PriceFeed};
pub use types::{
    BookingResponse, ChainObservation, CollectionWallet, ConfirmationPolicy, CreatePaymentRequest,
    Currency, ErrorDetail, ErrorResponse, HealthResponse, HealthStatus, Match, MatchDetails,
    Network, NewPayment, Order, OrderItem, OrderStatus, OrderWithPayment, Payment,
    PaymentCheckResult, PaymentStatus, PaymentSummary, RateLimitResponse, ReserveSeatsRequest,
    Seat, SeatListing, SeatQuery, TicketClass, WalletDirectory, amount_matches,
};
