//! BlockCypher address explorer for BTC payments.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::{AppError, ChainObservation, ChainObserver, ConfirmationPolicy, Currency, amount_matches};
use crate::infra::http::{build_client, fetch_json};

/// BlockCypher BTC testnet base URL
pub const DEFAULT_BLOCKCYPHER_API_URL: &str = "https://api.blockcypher.com/v1/btc/test3";

const SATOSHI_SCALE: u32 = 8;
const TX_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
pub struct AddressFull {
    #[serde(default)]
    pub txs: Vec<BlockCypherTx>,
}

#[derive(Debug, Deserialize)]
pub struct BlockCypherTx {
    pub hash: String,
    pub received: DateTime<Utc>,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub outputs: Vec<TxOutput>,
}

#[derive(Debug, Deserialize)]
pub struct TxOutput {
    /// Satoshis
    pub value: i64,
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
}

impl BlockCypherTx {
    /// Total BTC paid to `address` by this transaction
    pub fn received_by(&self, address: &str) -> Decimal {
        let satoshis: i64 = self
            .outputs
            .iter()
            .filter(|o| o.addresses.as_ref().is_some_and(|a| a.iter().any(|x| x == address)))
            .map(|o| o.value)
            .sum();
        Decimal::new(satoshis, SATOSHI_SCALE)
    }
}

/// Finds the first transaction to `address` received at or after `since`
/// whose paid amount matches `expected`.
pub fn find_payment<'a>(
    txs: &'a [BlockCypherTx],
    address: &str,
    expected: Decimal,
    since: DateTime<Utc>,
) -> Option<(&'a BlockCypherTx, Decimal)> {
    txs.iter()
        .filter(|tx| tx.received >= since)
        .map(|tx| (tx, tx.received_by(address)))
        .find(|(_, amount)| amount_matches(*amount, expected))
}

pub struct BlockCypherObserver {
    http_client: Client,
    base_url: String,
    address: String,
    policy: ConfirmationPolicy,
}

impl BlockCypherObserver {
    pub fn new(
        base_url: Option<String>,
        address: impl Into<String>,
        policy: ConfirmationPolicy,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BLOCKCYPHER_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            address: address.into(),
            policy,
        })
    }
}

#[async_trait]
impl ChainObserver for BlockCypherObserver {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn check(
        &self,
        currency: Currency,
        expected: Decimal,
        since: DateTime<Utc>,
    ) -> Result<ChainObservation, AppError> {
        let required = self.required_confirmations(currency);
        let request = self
            .http_client
            .get(format!("{}/addrs/{}/full", self.base_url, self.address))
            .query(&[("limit", TX_LIMIT)]);
        let body: AddressFull = fetch_json("blockcypher", request).await?;

        match find_payment(&body.txs, &self.address, expected, since) {
            Some((tx, amount)) => {
                debug!(tx_hash = %tx.hash, amount = %amount, confirmations = tx.confirmations, "Matching transaction");
                Ok(ChainObservation::matched(amount, tx.confirmations, required, tx.hash.clone()))
            }
            None => Ok(ChainObservation::not_found(required)),
        }
    }

    fn required_confirmations(&self, currency: Currency) -> u32 {
        self.policy.required(currency)
    }
}
