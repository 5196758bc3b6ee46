//! Payment confirmation state machine.
//!
//! `Pending -> Confirming -> Completed`, or `Pending | Confirming -> Expired`.
//! Every transition is a guarded store update, so concurrent checks of the
//! same payment cannot double-finalize or resurrect a terminal payment.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::retry::{RetryPolicy, retry_on_conflict};
use crate::domain::{
    AppError, ChainObservation, ChainObserver, DatabaseClient, ExternalServiceError,
    FulfillmentNotifier, Payment, PaymentCheckResult, PaymentStatus,
};

/// Default bound on one chain observer call
pub const DEFAULT_OBSERVER_TIMEOUT: Duration = Duration::from_secs(10);

/// Human-readable status line shown to buyers
pub fn status_message(status: PaymentStatus, found: bool, needs_more_confirmations: u32) -> String {
    match status {
        PaymentStatus::Completed => "Payment confirmed!".to_string(),
        PaymentStatus::Expired => "Payment window expired".to_string(),
        PaymentStatus::Pending | PaymentStatus::Confirming if found => format!(
            "Payment received! Waiting for {} more confirmation(s).",
            needs_more_confirmations
        ),
        PaymentStatus::Pending | PaymentStatus::Confirming => {
            "Waiting for payment... No transaction found yet.".to_string()
        }
    }
}

/// Summarize a persisted payment
pub fn check_result(payment: &Payment, required_confirmations: u32, found: bool) -> PaymentCheckResult {
    let confirmations = payment.confirmations.max(0) as u32;
    let found = found
        || payment.tx_hash.is_some()
        || matches!(payment.status, PaymentStatus::Confirming | PaymentStatus::Completed);
    let needs_more = if payment.status == PaymentStatus::Completed {
        0
    } else {
        required_confirmations.saturating_sub(confirmations)
    };

    PaymentCheckResult {
        order_id: payment.order_id.clone(),
        payment_id: payment.id.clone(),
        status: payment.status,
        found,
        confirmations: payment.confirmations,
        required_confirmations,
        needs_more_confirmations: needs_more,
        tx_hash: payment.tx_hash.clone(),
        message: status_message(payment.status, found, needs_more),
    }
}

pub struct PaymentStateMachine {
    db_client: Arc<dyn DatabaseClient>,
    observer: Arc<dyn ChainObserver>,
    notifier: Arc<dyn FulfillmentNotifier>,
    observer_timeout: Duration,
    retry: RetryPolicy,
}

impl PaymentStateMachine {
    #[must_use]
    pub fn new(
        db_client: Arc<dyn DatabaseClient>,
        observer: Arc<dyn ChainObserver>,
        notifier: Arc<dyn FulfillmentNotifier>,
    ) -> Self {
        Self {
            db_client,
            observer,
            notifier,
            observer_timeout: DEFAULT_OBSERVER_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_observer_timeout(mut self, timeout: Duration) -> Self {
        self.observer_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn observer(&self) -> &Arc<dyn ChainObserver> {
        &self.observer
    }

    /// Run one tick for the payment attached to `order_id`
    pub async fn check_order(&self, order_id: &str) -> Result<PaymentCheckResult, AppError> {
        let payment = self.load(order_id).await?;
        self.check(&payment).await
    }

    /// Run one tick: expire, complete, record progress, or leave unchanged.
    ///
    /// Idempotent. Terminal payments are returned as persisted without
    /// touching the ledger.
    #[instrument(skip(self, payment), fields(order_id = %payment.order_id, currency = %payment.currency))]
    pub async fn check(&self, payment: &Payment) -> Result<PaymentCheckResult, AppError> {
        let required = self.observer.required_confirmations(payment.currency);

        if payment.status.is_terminal() {
            return Ok(check_result(payment, required, false));
        }

        let now = Utc::now();
        if payment.is_past_expiry(now) {
            let expired = retry_on_conflict("expire_payment", self.retry, || {
                self.db_client.expire_payment(&payment.id)
            })
            .await?;
            if expired {
                info!(payment_id = %payment.id, "Payment expired, seats released");
            }
            let current = self.load(&payment.order_id).await?;
            return Ok(check_result(&current, required, false));
        }

        let observation = self.observe(payment).await?;

        if observation.found && observation.is_complete {
            let confirmations = observation.confirmations.min(i32::MAX as u32) as i32;
            let completed = retry_on_conflict("complete_payment", self.retry, || {
                self.db_client.complete_payment(
                    &payment.id,
                    observation.tx_hash.as_deref(),
                    confirmations,
                    now,
                )
            })
            .await?;
            let current = self.load(&payment.order_id).await?;
            if completed {
                info!(payment_id = %payment.id, tx_hash = ?observation.tx_hash, "Payment completed");
                self.notify(&current).await;
            }
            return Ok(check_result(&current, required, true));
        }

        if observation.found {
            let confirmations = observation.confirmations.min(i32::MAX as u32) as i32;
            self.db_client
                .record_confirmations(&payment.id, confirmations, observation.tx_hash.as_deref())
                .await?;
            let current = self.load(&payment.order_id).await?;
            return Ok(check_result(&current, required, true));
        }

        Ok(check_result(payment, required, false))
    }

    async fn observe(&self, payment: &Payment) -> Result<ChainObservation, AppError> {
        let lookup = self
            .observer
            .check(payment.currency, payment.crypto_amount, payment.created_at);

        match tokio::time::timeout(self.observer_timeout, lookup).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = self.observer_timeout.as_millis() as u64,
                    "Chain observer timed out"
                );
                Err(AppError::ExternalService(ExternalServiceError::Timeout(format!(
                    "chain observer exceeded {}ms",
                    self.observer_timeout.as_millis()
                ))))
            }
        }
    }

    async fn load(&self, order_id: &str) -> Result<Payment, AppError> {
        self.db_client
            .get_payment_by_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("payment for order {order_id}")))
    }

    /// Completion is already committed; failures here are only logged
    async fn notify(&self, payment: &Payment) {
        let order = match self.db_client.get_order(&payment.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                error!(order_id = %payment.order_id, "Completed payment has no order");
                return;
            }
            Err(e) => {
                error!(order_id = %payment.order_id, error = %e, "Failed to load order for fulfillment");
                return;
            }
        };

        if let Err(e) = self.notifier.payment_completed(&order, payment).await {
            error!(order_id = %order.id, error = %e, "Fulfillment notification failed");
        }
    }
}
