//! Per-currency dispatch to ledger strategies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::{AppError, ChainObservation, ChainObserver, ConfirmationPolicy, Currency};

/// Routes each currency to the observer registered for it
pub struct CurrencyRouter {
    routes: HashMap<Currency, Arc<dyn ChainObserver>>,
    policy: ConfirmationPolicy,
}

impl CurrencyRouter {
    #[must_use]
    pub fn new(policy: ConfirmationPolicy) -> Self {
        Self {
            routes: HashMap::new(),
            policy,
        }
    }

    #[must_use]
    pub fn route(mut self, currency: Currency, observer: Arc<dyn ChainObserver>) -> Self {
        info!(currency = %currency, "Chain observer registered");
        self.routes.insert(currency, observer);
        self
    }

    pub fn supports(&self, currency: Currency) -> bool {
        self.routes.contains_key(&currency)
    }
}

#[async_trait]
impl ChainObserver for CurrencyRouter {
    async fn check(
        &self,
        currency: Currency,
        expected: Decimal,
        since: DateTime<Utc>,
    ) -> Result<ChainObservation, AppError> {
        let observer = self
            .routes
            .get(&currency)
            .ok_or_else(|| AppError::NotSupported(format!("no chain observer for {currency}")))?;
        observer.check(currency, expected, since).await
    }

    fn required_confirmations(&self, currency: Currency) -> u32 {
        self.routes
            .get(&currency)
            .map(|o| o.required_confirmations(currency))
            .unwrap_or_else(|| self.policy.required(currency))
    }
}
