//! Application service: the seam between the HTTP adapter and the core.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::allocator::SeatAllocator;
use super::monitor::{MonitorConfig, MonitorSupervisor};
use super::payment::{DEFAULT_OBSERVER_TIMEOUT, PaymentStateMachine, check_result};
use super::price_oracle::{DEFAULT_CACHE_TTL, DEFAULT_FEED_TIMEOUT, PriceOracle};
use super::reference::{DEFAULT_PAYMENT_TIMEOUT_MINUTES, ReferenceGenerator};
use super::retry::RetryPolicy;
use crate::domain::{
    AppError, ChainObserver, CreatePaymentRequest, DatabaseClient, DatabaseError,
    FulfillmentNotifier, HealthResponse, HealthStatus, LoggingNotifier, Match, MatchDetails,
    NewPayment, Order, OrderStatus, OrderWithPayment, Payment, PaymentCheckResult, PaymentStatus,
    PaymentSummary, PriceFeed, ReserveSeatsRequest, SeatListing, ValidationError, WalletDirectory,
};

/// Tunables for the core components
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub payment_timeout: chrono::Duration,
    pub monitor: MonitorConfig,
    /// Bound on one chain observer call
    pub observer_timeout: Duration,
    pub price_cache_ttl: Duration,
    /// Bound on one price feed call
    pub price_feed_timeout: Duration,
    /// Retry budget for serialization conflicts
    pub retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            payment_timeout: chrono::Duration::minutes(DEFAULT_PAYMENT_TIMEOUT_MINUTES),
            monitor: MonitorConfig::default(),
            observer_timeout: DEFAULT_OBSERVER_TIMEOUT,
            price_cache_ttl: DEFAULT_CACHE_TTL,
            price_feed_timeout: DEFAULT_FEED_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ServiceConfig {
    /// Network calls must finish well inside one monitor tick
    pub fn validate(&self) -> Result<(), AppError> {
        let interval = self.monitor.interval;
        if self.observer_timeout >= interval || self.price_feed_timeout >= interval {
            return Err(AppError::Config(crate::domain::ConfigError::InvalidValue {
                key: "EXTERNAL_TIMEOUT_SECS".to_string(),
                message: format!(
                    "external timeouts must be shorter than the monitor interval ({}s)",
                    interval.as_secs_f64()
                ),
            }));
        }
        Ok(())
    }
}

/// Application service containing business logic
pub struct AppService {
    db_client: Arc<dyn DatabaseClient>,
    allocator: SeatAllocator,
    oracle: PriceOracle,
    references: ReferenceGenerator,
    wallets: WalletDirectory,
    machine: Arc<PaymentStateMachine>,
    monitors: Arc<MonitorSupervisor>,
}

impl AppService {
    #[must_use]
    pub fn new(
        db_client: Arc<dyn DatabaseClient>,
        price_feed: Arc<dyn PriceFeed>,
        chain_observer: Arc<dyn ChainObserver>,
        wallets: WalletDirectory,
        config: ServiceConfig,
    ) -> Self {
        Self::with_notifier(
            db_client,
            price_feed,
            chain_observer,
            wallets,
            config,
            Arc::new(LoggingNotifier),
        )
    }

    #[must_use]
    pub fn with_notifier(
        db_client: Arc<dyn DatabaseClient>,
        price_feed: Arc<dyn PriceFeed>,
        chain_observer: Arc<dyn ChainObserver>,
        wallets: WalletDirectory,
        config: ServiceConfig,
        notifier: Arc<dyn FulfillmentNotifier>,
    ) -> Self {
        let machine = Arc::new(
            PaymentStateMachine::new(Arc::clone(&db_client), chain_observer, notifier)
                .with_observer_timeout(config.observer_timeout)
                .with_retry_policy(config.retry),
        );
        let monitors = Arc::new(MonitorSupervisor::new(
            Arc::clone(&machine),
            Arc::clone(&db_client),
            config.monitor.clone(),
        ));

        Self {
            allocator: SeatAllocator::new(Arc::clone(&db_client), config.retry),
            oracle: PriceOracle::with_settings(
                price_feed,
                config.price_cache_ttl,
                config.price_feed_timeout,
            ),
            references: ReferenceGenerator::new(config.payment_timeout),
            db_client,
            wallets,
            machine,
            monitors,
        }
    }

    pub fn monitors(&self) -> &Arc<MonitorSupervisor> {
        &self.monitors
    }

    pub fn state_machine(&self) -> &Arc<PaymentStateMachine> {
        &self.machine
    }

    /// Reserve seats as a new PENDING order
    #[instrument(skip(self, request), fields(buyer_id = %request.buyer_id))]
    pub async fn reserve_seats(&self, request: &ReserveSeatsRequest) -> Result<Order, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;

        self.allocator.reserve(&request.buyer_id, &request.seat_ids).await
    }

    /// Price the order, persist its payment and start monitoring it
    #[instrument(skip(self, request), fields(order_id = %request.order_id, currency = %request.currency))]
    pub async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<PaymentSummary, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;

        let order = self
            .db_client
            .get_order(&request.order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {}", request.order_id)))?;

        if order.status == OrderStatus::Cancelled {
            return Err(AppError::PaymentExpired(order.id));
        }
        if let Some(existing) = self.db_client.get_payment_by_order(&order.id).await? {
            if existing.status == PaymentStatus::Expired {
                return Err(AppError::PaymentExpired(order.id));
            }
            return Err(AppError::Database(DatabaseError::Duplicate(format!(
                "payment already created for order {}",
                order.id
            ))));
        }
        if order.status != OrderStatus::Pending {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "order_id".to_string(),
                message: format!("Order is {}, not awaiting payment", order.status),
            }));
        }

        let wallet = self.wallets.get(request.currency).ok_or_else(|| {
            AppError::NotSupported(format!("no collection wallet for {}", request.currency))
        })?;

        let conversion = self.oracle.convert(order.total_amount, request.currency).await?;
        let created_at = Utc::now();
        let new_payment = NewPayment {
            order_id: order.id.clone(),
            fiat_amount: order.total_amount,
            currency: request.currency,
            crypto_amount: conversion.crypto_amount,
            exchange_rate: conversion.rate,
            wallet_address: wallet.address.clone(),
            network: wallet.network,
            reference: self.references.reference(&order.id),
            expires_at: self.references.expiry_from(created_at),
            created_at,
        };

        let payment = self.db_client.create_payment(&new_payment).await?;
        info!(
            payment_id = %payment.id,
            crypto_amount = %payment.crypto_amount,
            reference = %payment.reference,
            "Payment created"
        );

        self.monitors.watch(&payment.order_id);
        Ok(self.summarize(payment))
    }

    /// Persisted payment view. Past-deadline payments are expired first.
    #[instrument(skip(self))]
    pub async fn payment_status(&self, order_id: &str) -> Result<PaymentSummary, AppError> {
        let payment = self.load_payment(order_id).await?;

        let payment = if !payment.status.is_terminal() && payment.is_past_expiry(Utc::now()) {
            self.machine.check(&payment).await?;
            self.load_payment(order_id).await?
        } else {
            payment
        };

        Ok(self.summarize(payment))
    }

    /// Run one state machine tick now
    #[instrument(skip(self))]
    pub async fn check_payment(&self, order_id: &str) -> Result<PaymentCheckResult, AppError> {
        self.machine.check_order(order_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_matches(&self) -> Result<Vec<Match>, AppError> {
        self.db_client.list_matches().await
    }

    #[instrument(skip(self))]
    pub async fn get_match(&self, match_id: &str) -> Result<MatchDetails, AppError> {
        self.db_client
            .get_match(match_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("match {match_id}")))
    }

    #[instrument(skip(self))]
    pub async fn list_available_seats(
        &self,
        match_id: &str,
        ticket_class: Option<&str>,
    ) -> Result<Vec<SeatListing>, AppError> {
        self.get_match(match_id).await?;
        self.db_client.list_available_seats(match_id, ticket_class).await
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &str) -> Result<OrderWithPayment, AppError> {
        let order = self
            .db_client
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))?;
        let payment = self.db_client.get_payment_by_order(order_id).await?;
        Ok(OrderWithPayment { order, payment })
    }

    #[instrument(skip(self))]
    pub async fn list_orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<OrderWithPayment>, AppError> {
        let orders = self.db_client.list_orders_for_buyer(buyer_id).await?;
        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let payment = self.db_client.get_payment_by_order(&order.id).await?;
            result.push(OrderWithPayment { order, payment });
        }
        Ok(result)
    }

    /// Perform health check on all dependencies
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.db_client.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };
        HealthResponse::new(db_health, self.monitors.active_count())
    }

    async fn load_payment(&self, order_id: &str) -> Result<Payment, AppError> {
        self.db_client
            .get_payment_by_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("payment for order {order_id}")))
    }

    fn summarize(&self, payment: Payment) -> PaymentSummary {
        let required = self.machine.observer().required_confirmations(payment.currency);
        let message = check_result(&payment, required, false).message;
        let time_remaining_ms = if payment.status.is_terminal() {
            0
        } else {
            (payment.expires_at - Utc::now()).num_milliseconds().max(0)
        };

        PaymentSummary {
            payment_uri: payment.payment_uri(),
            time_remaining_ms,
            message,
            payment,
        }
    }
}
