//! Deterministic ledger for demo deployments.
//!
//! Each payment, identified by (currency, amount, since), advances one step
//! per check: not found, then seen with 0 confirmations, then fully confirmed.
//! A payment is forgotten once it reports fully confirmed.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::domain::{AppError, ChainObservation, ChainObserver, ConfirmationPolicy, Currency};

type PaymentKey = (Currency, Decimal, i64);

const FINAL_STEP: u32 = 3;

pub struct SimulatedObserver {
    policy: ConfirmationPolicy,
    checks: DashMap<PaymentKey, u32>,
}

impl SimulatedObserver {
    #[must_use]
    pub fn new(policy: ConfirmationPolicy) -> Self {
        Self {
            policy,
            checks: DashMap::new(),
        }
    }

    /// Synthetic transaction hash, stable for a given payment
    pub fn tx_hash(currency: Currency, amount: Decimal, since: DateTime<Utc>) -> String {
        let digest = Sha256::new()
            .chain_update(currency.as_str())
            .chain_update(amount.normalize().to_string())
            .chain_update(since.timestamp_millis().to_be_bytes())
            .finalize();
        let mut hash = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hash, "{byte:02x}");
        }
        hash
    }

    /// Payments that have been checked but not yet fully confirmed
    pub fn tracked_payments(&self) -> usize {
        self.checks.len()
    }
}

impl Default for SimulatedObserver {
    fn default() -> Self {
        Self::new(ConfirmationPolicy::default())
    }
}

#[async_trait]
impl ChainObserver for SimulatedObserver {
    #[instrument(skip(self))]
    async fn check(
        &self,
        currency: Currency,
        expected: Decimal,
        since: DateTime<Utc>,
    ) -> Result<ChainObservation, AppError> {
        let required = self.required_confirmations(currency);
        let key = (currency, expected.normalize(), since.timestamp_millis());
        let step = {
            let mut count = self.checks.entry(key).or_insert(0);
            *count += 1;
            *count
        };
        if step >= FINAL_STEP {
            self.checks.remove(&key);
        }
        debug!(step, "Simulated check");

        let tx_hash = Self::tx_hash(currency, expected, since);
        Ok(match step {
            1 => ChainObservation::not_found(required),
            2 => ChainObservation::matched(expected, 0, required, tx_hash),
            _ => ChainObservation::matched(expected, required, required, tx_hash),
        })
    }

    fn required_confirmations(&self, currency: Currency) -> u32 {
        self.policy.required(currency)
    }
}
