//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::app::{fallback_rate, round_amount};
use crate::domain::{
    AppError, CatalogPlan, ChainObservation, ChainObserver, ConfirmationPolicy, Currency,
    DatabaseClient, DatabaseError, ExternalServiceError, Match, MatchDetails, Network, NewPayment,
    Order, OrderItem, OrderStatus, Payment, PaymentStatus, PriceFeed, Seat, SeatListing,
    TicketClass, ValidationError, amount_matches,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }
}

/// Ids of the demo catalog seeded into a mock store
#[derive(Debug, Clone)]
pub struct SeededCatalog {
    pub match_id: String,
    pub vip_class_id: String,
    pub regular_class_id: String,
    pub vip_seats: Vec<String>,
    pub regular_seats: Vec<String>,
    pub vip_price: Decimal,
    pub regular_price: Decimal,
}

#[derive(Default)]
struct Store {
    matches: Vec<Match>,
    classes: HashMap<String, TicketClass>,
    seats: HashMap<String, Seat>,
    seat_order: Vec<String>,
    orders: HashMap<String, Order>,
    order_sequence: Vec<String>,
    payments: HashMap<String, Payment>,
    catalog: Option<SeededCatalog>,
}

impl Store {
    fn payment_mut(&mut self, payment_id: &str) -> Result<&mut Payment, AppError> {
        self.payments
            .get_mut(payment_id)
            .ok_or_else(|| AppError::not_found(format!("payment {payment_id}")))
    }

    fn set_order_status(&mut self, order_id: &str, status: OrderStatus, now: DateTime<Utc>) {
        if let Some(order) = self.orders.get_mut(order_id) {
            order.status = status;
            order.updated_at = now;
        }
    }

    fn order_seat_ids(&self, order_id: &str) -> Vec<(String, String)> {
        self.orders
            .get(order_id)
            .map(|order| {
                order
                    .items
                    .iter()
                    .filter_map(|item| item.seat_id.clone().map(|seat| (seat, item.id.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// In-memory store. One mutex guards everything, so every method is atomic.
pub struct MockDatabaseClient {
    store: Arc<Mutex<Store>>,
    config: MockConfig,
    is_healthy: AtomicBool,
    pending_conflicts: AtomicU32,
}

impl MockDatabaseClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            config,
            is_healthy: AtomicBool::new(true),
            pending_conflicts: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Make the next `count` reservations, completions or expiries fail with
    /// a serialization conflict
    pub fn inject_serialization_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Seed the demo catalog once and return its ids
    pub fn seed_demo_catalog(&self) -> SeededCatalog {
        let mut store = self.store.lock().unwrap();
        if let Some(catalog) = &store.catalog {
            return catalog.clone();
        }

        let rows = CatalogPlan::demo(Utc::now()).build();
        let vip = rows.class_named("VIP").cloned().unwrap();
        let regular = rows.class_named("Regular").cloned().unwrap();
        let catalog = SeededCatalog {
            match_id: rows.event.id.clone(),
            vip_seats: rows.seat_ids_in(&vip.id),
            regular_seats: rows.seat_ids_in(&regular.id),
            vip_class_id: vip.id.clone(),
            regular_class_id: regular.id.clone(),
            vip_price: vip.price,
            regular_price: regular.price,
        };

        store.matches.push(rows.event);
        for class in rows.classes {
            store.classes.insert(class.id.clone(), class);
        }
        for seat in rows.seats {
            store.seat_order.push(seat.id.clone());
            store.seats.insert(seat.id.clone(), seat);
        }
        store.catalog = Some(catalog.clone());
        catalog
    }

    /// Move a payment's deadline, e.g. into the past
    pub fn set_payment_expiry(&self, payment_id: &str, expires_at: DateTime<Utc>) {
        let mut store = self.store.lock().unwrap();
        if let Some(payment) = store.payments.get_mut(payment_id) {
            payment.expires_at = expires_at;
        }
    }

    pub fn ticket_class(&self, class_id: &str) -> Option<TicketClass> {
        self.store.lock().unwrap().classes.get(class_id).cloned()
    }

    pub fn seat(&self, seat_id: &str) -> Option<Seat> {
        self.store.lock().unwrap().seats.get(seat_id).cloned()
    }

    /// Number of booked seats in a class
    pub fn booked_count(&self, class_id: &str) -> i32 {
        self.store
            .lock()
            .unwrap()
            .seats
            .values()
            .filter(|s| s.ticket_class_id == class_id && s.booked)
            .count() as i32
    }

    pub fn all_classes(&self) -> Vec<TicketClass> {
        self.store.lock().unwrap().classes.values().cloned().collect()
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock error".to_string());
            return Err(AppError::Database(DatabaseError::Query(msg)));
        }
        Ok(())
    }

    fn take_conflict(&self) -> Result<(), AppError> {
        let took = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            return Err(AppError::Database(DatabaseError::SerializationConflict(
                "could not serialize access due to concurrent update".to_string(),
            )));
        }
        Ok(())
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }

    async fn list_matches(&self) -> Result<Vec<Match>, AppError> {
        self.check_should_fail()?;
        let mut matches = self.store.lock().unwrap().matches.clone();
        matches.sort_by_key(|m| m.starts_at);
        Ok(matches)
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<MatchDetails>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        let Some(event) = store.matches.iter().find(|m| m.id == match_id).cloned() else {
            return Ok(None);
        };
        let mut ticket_classes: Vec<TicketClass> = store
            .classes
            .values()
            .filter(|c| c.match_id == match_id)
            .cloned()
            .collect();
        ticket_classes.sort_by(|a, b| b.price.cmp(&a.price));
        Ok(Some(MatchDetails {
            event,
            ticket_classes,
        }))
    }

    async fn list_available_seats(
        &self,
        match_id: &str,
        ticket_class: Option<&str>,
    ) -> Result<Vec<SeatListing>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        let mut listings: Vec<SeatListing> = store
            .seat_order
            .iter()
            .filter_map(|id| store.seats.get(id))
            .filter(|seat| seat.match_id == match_id && !seat.booked)
            .filter_map(|seat| {
                let class = store.classes.get(&seat.ticket_class_id)?;
                if let Some(name) = ticket_class
                    && !class.name.eq_ignore_ascii_case(name)
                {
                    return None;
                }
                Some(SeatListing {
                    seat: seat.clone(),
                    ticket_class: class.name.clone(),
                    price: class.price,
                })
            })
            .collect();
        listings.sort_by(|a, b| {
            (&a.seat.row, a.seat.label.len(), &a.seat.label).cmp(&(
                &b.seat.row,
                b.seat.label.len(),
                &b.seat.label,
            ))
        });
        Ok(listings)
    }

    async fn reserve_seats(&self, buyer_id: &str, seat_ids: &[String]) -> Result<Order, AppError> {
        self.check_should_fail()?;
        self.take_conflict()?;
        let mut store = self.store.lock().unwrap();

        let mut seats = Vec::with_capacity(seat_ids.len());
        for id in seat_ids {
            let seat = store
                .seats
                .get(id)
                .cloned()
                .ok_or_else(|| AppError::not_found(format!("seat {id}")))?;
            seats.push(seat);
        }
        if let Some(taken) = seats.iter().find(|s| s.booked) {
            return Err(AppError::SeatUnavailable {
                seat_id: taken.id.clone(),
                label: taken.label.clone(),
            });
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();
        let mut items = Vec::with_capacity(seats.len());
        for seat in &seats {
            let class = store
                .classes
                .get_mut(&seat.ticket_class_id)
                .ok_or_else(|| AppError::not_found(format!("ticket class {}", seat.ticket_class_id)))?;
            if class.available_count <= 0 {
                return Err(AppError::Internal(format!("class {} oversold", class.id)));
            }
            items.push(OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order_id.clone(),
                ticket_class_id: class.id.clone(),
                seat_id: Some(seat.id.clone()),
                seat_label: Some(seat.label.clone()),
                price: class.price,
            });
        }

        // Validation done; apply every mutation
        for item in &items {
            if let Some(class) = store.classes.get_mut(&item.ticket_class_id) {
                class.available_count -= 1;
            }
            if let Some(seat) = item.seat_id.as_ref().and_then(|id| store.seats.get_mut(id)) {
                seat.booked = true;
                seat.order_item_id = Some(item.id.clone());
            }
        }

        let order = Order {
            id: order_id.clone(),
            buyer_id: buyer_id.to_string(),
            total_amount: items.iter().map(|i| i.price).sum(),
            status: OrderStatus::Pending,
            items,
            created_at: now,
            updated_at: now,
        };
        store.orders.insert(order_id.clone(), order.clone());
        store.order_sequence.push(order_id);
        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, AppError> {
        self.check_should_fail()?;
        Ok(self.store.lock().unwrap().orders.get(order_id).cloned())
    }

    async fn list_orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        Ok(store
            .order_sequence
            .iter()
            .rev()
            .filter_map(|id| store.orders.get(id))
            .filter(|o| o.buyer_id == buyer_id)
            .cloned()
            .collect())
    }

    async fn create_payment(&self, payment: &NewPayment) -> Result<Payment, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();

        let order = store
            .orders
            .get(&payment.order_id)
            .ok_or_else(|| AppError::not_found(format!("order {}", payment.order_id)))?;
        if store.payments.values().any(|p| p.order_id == payment.order_id) {
            return Err(AppError::Database(DatabaseError::Duplicate(format!(
                "payment already created for order {}",
                payment.order_id
            ))));
        }
        if order.status != OrderStatus::Pending {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "order_id".to_string(),
                message: format!("Order is {}, not awaiting payment", order.status),
            }));
        }

        let created = Payment {
            id: Uuid::new_v4().to_string(),
            order_id: payment.order_id.clone(),
            fiat_amount: payment.fiat_amount,
            currency: payment.currency,
            crypto_amount: payment.crypto_amount,
            exchange_rate: payment.exchange_rate,
            wallet_address: payment.wallet_address.clone(),
            network: payment.network,
            reference: payment.reference.clone(),
            status: PaymentStatus::Pending,
            confirmations: 0,
            tx_hash: None,
            expires_at: payment.expires_at,
            confirmed_at: None,
            created_at: payment.created_at,
            updated_at: payment.created_at,
        };
        store.set_order_status(&payment.order_id, OrderStatus::PendingPayment, payment.created_at);
        store.payments.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        Ok(store.payments.values().find(|p| p.order_id == order_id).cloned())
    }

    async fn record_confirmations(
        &self,
        payment_id: &str,
        confirmations: i32,
        tx_hash: Option<&str>,
    ) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut store = self.store.lock().unwrap();
        let payment = store.payment_mut(payment_id)?;
        if payment.status.is_terminal() {
            return Ok(false);
        }
        payment.status = PaymentStatus::Confirming;
        payment.confirmations = payment.confirmations.max(confirmations);
        if let Some(hash) = tx_hash {
            payment.tx_hash = Some(hash.to_string());
        }
        payment.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete_payment(
        &self,
        payment_id: &str,
        tx_hash: Option<&str>,
        confirmations: i32,
        confirmed_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.check_should_fail()?;
        self.take_conflict()?;
        let mut store = self.store.lock().unwrap();
        let payment = store.payment_mut(payment_id)?;
        if payment.status.is_terminal() {
            return Ok(false);
        }
        payment.status = PaymentStatus::Completed;
        payment.confirmations = payment.confirmations.max(confirmations);
        if let Some(hash) = tx_hash {
            payment.tx_hash = Some(hash.to_string());
        }
        payment.confirmed_at = Some(confirmed_at);
        payment.updated_at = confirmed_at;
        let order_id = payment.order_id.clone();

        store.set_order_status(&order_id, OrderStatus::Confirmed, confirmed_at);
        for (seat_id, _) in store.order_seat_ids(&order_id) {
            if let Some(seat) = store.seats.get_mut(&seat_id) {
                seat.booking_final = true;
            }
        }
        Ok(true)
    }

    async fn expire_payment(&self, payment_id: &str) -> Result<bool, AppError> {
        self.check_should_fail()?;
        self.take_conflict()?;
        let mut store = self.store.lock().unwrap();
        let payment = store.payment_mut(payment_id)?;
        if payment.status.is_terminal() {
            return Ok(false);
        }
        let now = Utc::now();
        payment.status = PaymentStatus::Expired;
        payment.updated_at = now;
        let order_id = payment.order_id.clone();

        store.set_order_status(&order_id, OrderStatus::Cancelled, now);
        for (seat_id, item_id) in store.order_seat_ids(&order_id) {
            let Some(seat) = store.seats.get_mut(&seat_id) else {
                continue;
            };
            if !seat.booked || seat.order_item_id.as_deref() != Some(item_id.as_str()) {
                continue;
            }
            seat.booked = false;
            seat.booking_final = false;
            seat.order_item_id = None;
            let class_id = seat.ticket_class_id.clone();
            if let Some(class) = store.classes.get_mut(&class_id) {
                class.available_count = (class.available_count + 1).min(class.total_count);
            }
        }
        Ok(true)
    }

    async fn list_in_flight_payments(&self) -> Result<Vec<Payment>, AppError> {
        self.check_should_fail()?;
        let store = self.store.lock().unwrap();
        Ok(store
            .payments
            .values()
            .filter(|p| !p.status.is_terminal())
            .cloned()
            .collect())
    }
}

/// Mock price feed. Unset currencies answer with the fallback rate.
pub struct MockPriceFeed {
    prices: Mutex<HashMap<Currency, Decimal>>,
    config: MockConfig,
    calls: AtomicUsize,
}

impl MockPriceFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            config,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self::with_config(MockConfig::failure("price feed unavailable"))
    }

    #[must_use]
    pub fn with_price(self, currency: Currency, price: Decimal) -> Self {
        self.set_price(currency, price);
        self
    }

    pub fn set_price(&self, currency: Currency, price: Decimal) {
        self.prices.lock().unwrap().insert(currency, price);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockPriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceFeed for MockPriceFeed {
    async fn fetch_usd_price(&self, currency: Currency) -> Result<Decimal, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.config.should_fail {
            return Err(AppError::ExternalService(ExternalServiceError::Unavailable(
                self.config.error_message.clone().unwrap_or_default(),
            )));
        }
        let prices = self.prices.lock().unwrap();
        Ok(prices.get(&currency).copied().unwrap_or_else(|| fallback_rate(currency)))
    }
}

#[derive(Debug, Clone)]
struct ScriptedTransaction {
    amount: Decimal,
    confirmations: u32,
    tx_hash: String,
    received_at: DateTime<Utc>,
}

/// Scriptable chain observer: one visible transaction per currency
pub struct MockChainObserver {
    transactions: Mutex<HashMap<Currency, ScriptedTransaction>>,
    failures: Mutex<VecDeque<String>>,
    policy: ConfirmationPolicy,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockChainObserver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            policy: ConfirmationPolicy::default(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sleep this long inside every check
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make a transaction visible, received now
    pub fn set_transaction(&self, currency: Currency, amount: Decimal, confirmations: u32, tx_hash: &str) {
        self.set_transaction_at(currency, amount, confirmations, tx_hash, Utc::now());
    }

    pub fn set_transaction_at(
        &self,
        currency: Currency,
        amount: Decimal,
        confirmations: u32,
        tx_hash: &str,
        received_at: DateTime<Utc>,
    ) {
        self.transactions.lock().unwrap().insert(
            currency,
            ScriptedTransaction {
                amount,
                confirmations,
                tx_hash: tx_hash.to_string(),
                received_at,
            },
        );
    }

    pub fn clear(&self, currency: Currency) {
        self.transactions.lock().unwrap().remove(&currency);
    }

    /// Fail the next check with a transient error
    pub fn fail_next(&self, message: impl Into<String>) {
        self.failures.lock().unwrap().push_back(message.into());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockChainObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainObserver for MockChainObserver {
    async fn check(
        &self,
        currency: Currency,
        expected: Decimal,
        since: DateTime<Utc>,
    ) -> Result<ChainObservation, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failures.lock().unwrap().pop_front() {
            return Err(AppError::ExternalService(ExternalServiceError::Unavailable(message)));
        }

        let required = self.required_confirmations(currency);
        let transactions = self.transactions.lock().unwrap();
        match transactions.get(&currency) {
            Some(tx) if tx.received_at >= since && amount_matches(tx.amount, expected) => Ok(
                ChainObservation::matched(tx.amount, tx.confirmations, required, tx.tx_hash.clone()),
            ),
            _ => Ok(ChainObservation::not_found(required)),
        }
    }

    fn required_confirmations(&self, currency: Currency) -> u32 {
        self.policy.required(currency)
    }
}

/// Reserve the first free seat and open a payment for it
pub async fn seed_pending_payment(db: &MockDatabaseClient, currency: Currency) -> (Order, Payment) {
    let catalog = db.seed_demo_catalog();
    let seat = db
        .list_available_seats(&catalog.match_id, None)
        .await
        .expect("list seats")
        .first()
        .map(|listing| listing.seat.id.clone())
        .expect("a free seat");
    let order = db.reserve_seats("buyer-test", &[seat]).await.expect("reserve");

    let rate = fallback_rate(currency);
    let created_at = Utc::now();
    let payment = db
        .create_payment(&NewPayment {
            order_id: order.id.clone(),
            fiat_amount: order.total_amount,
            currency,
            crypto_amount: round_amount(order.total_amount / rate, currency),
            exchange_rate: rate,
            wallet_address: "tb1qtestwallet".to_string(),
            network: Network::Testnet,
            reference: format!("ORDER-{}-{:013}-beef", order.id, created_at.timestamp_millis()),
            expires_at: created_at + chrono::Duration::minutes(30),
            created_at,
        })
        .await
        .expect("create payment");
    (order, payment)
}
