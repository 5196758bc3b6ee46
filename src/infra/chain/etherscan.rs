//! Etherscan account explorer for ETH and ERC-20 (USDT) payments.
//!
//! Native transfers come from `action=txlist`, token transfers from
//! `action=tokentx` filtered by the configured contract. Etherscan answers
//! "no transactions" with `status = "0"` and an empty `result` array, and
//! errors with `status = "0"` and a string `result`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::domain::{
    AppError, ChainObservation, ChainObserver, ConfirmationPolicy, Currency, ExternalServiceError,
    amount_matches,
};
use crate::infra::http::{build_client, fetch_json};

/// Etherscan Sepolia base URL
pub const DEFAULT_ETHERSCAN_API_URL: &str = "https://api-sepolia.etherscan.io/api";

/// Tether on Sepolia used by the demo deployment
pub const DEFAULT_USDT_CONTRACT: &str = "0x7169D38820dfd117C3FA1f22a697dBA58d90BA06";

const ETH_DECIMALS: u32 = 18;
const USDT_DECIMALS: u32 = 6;
const PAGE_SIZE: &str = "50";

#[derive(Debug, Deserialize)]
pub struct EtherscanResponse {
    pub status: String,
    pub message: String,
    pub result: EtherscanResult,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EtherscanResult {
    Transactions(Vec<EtherscanTx>),
    Message(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtherscanTx {
    pub hash: String,
    /// Unix seconds
    pub time_stamp: String,
    pub to: String,
    /// Integer amount in the smallest unit
    pub value: String,
    #[serde(default)]
    pub confirmations: String,
    #[serde(default)]
    pub is_error: Option<String>,
    #[serde(default)]
    pub token_decimal: Option<String>,
}

impl EtherscanTx {
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.time_stamp.parse::<i64>().ok()?;
        DateTime::from_timestamp(secs, 0)
    }

    /// `value` scaled down by `decimals`
    pub fn amount(&self, decimals: u32) -> Option<Decimal> {
        let decimals = self
            .token_decimal
            .as_deref()
            .and_then(|d| d.parse().ok())
            .unwrap_or(decimals);
        let mut amount = Decimal::from_str(&self.value).ok()?;
        amount.set_scale(decimals).ok()?;
        Some(amount.normalize())
    }

    fn failed(&self) -> bool {
        self.is_error.as_deref() == Some("1")
    }
}

/// Finds the first successful transfer to `address` at or after `since`
/// whose amount matches `expected`.
pub fn find_payment<'a>(
    txs: &'a [EtherscanTx],
    address: &str,
    decimals: u32,
    expected: Decimal,
    since: DateTime<Utc>,
) -> Option<(&'a EtherscanTx, Decimal)> {
    txs.iter()
        .filter(|tx| !tx.failed() && tx.to.eq_ignore_ascii_case(address))
        .filter(|tx| tx.received_at().is_some_and(|at| at.timestamp() >= since.timestamp()))
        .filter_map(|tx| tx.amount(decimals).map(|amount| (tx, amount)))
        .find(|(_, amount)| amount_matches(*amount, expected))
}

pub struct EtherscanObserver {
    http_client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    address: String,
    usdt_contract: String,
    policy: ConfirmationPolicy,
}

impl EtherscanObserver {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<SecretString>,
        address: impl Into<String>,
        usdt_contract: Option<String>,
        policy: ConfirmationPolicy,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        if api_key.is_none() {
            warn!("ETHERSCAN_API_KEY not set, requests will be heavily throttled");
        }
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_ETHERSCAN_API_URL.to_string()),
            api_key,
            address: address.into(),
            usdt_contract: usdt_contract.unwrap_or_else(|| DEFAULT_USDT_CONTRACT.to_string()),
            policy,
        })
    }

    async fn fetch_transfers(&self, currency: Currency) -> Result<Vec<EtherscanTx>, AppError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("module", "account"),
            ("address", self.address.as_str()),
            ("startblock", "0"),
            ("endblock", "99999999"),
            ("page", "1"),
            ("offset", PAGE_SIZE),
            ("sort", "desc"),
        ];
        match currency {
            Currency::Eth => query.push(("action", "txlist")),
            Currency::Usdt => {
                query.push(("action", "tokentx"));
                query.push(("contractaddress", self.usdt_contract.as_str()));
            }
            Currency::Btc => {
                return Err(AppError::NotSupported(format!("{currency} is not an Ethereum asset")));
            }
        }
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.expose_secret()));
        }

        let request = self.http_client.get(&self.base_url).query(&query);
        let body: EtherscanResponse = fetch_json("etherscan", request).await?;

        match body.result {
            EtherscanResult::Transactions(txs) => Ok(txs),
            EtherscanResult::Message(message) if message.to_ascii_lowercase().contains("rate limit") => {
                Err(ExternalServiceError::RateLimited(message).into())
            }
            EtherscanResult::Message(message) => Err(ExternalServiceError::ApiError {
                status_code: 200,
                message: format!("{}: {message}", body.message),
            }
            .into()),
        }
    }
}

#[async_trait]
impl ChainObserver for EtherscanObserver {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn check(
        &self,
        currency: Currency,
        expected: Decimal,
        since: DateTime<Utc>,
    ) -> Result<ChainObservation, AppError> {
        let required = self.required_confirmations(currency);
        let decimals = match currency {
            Currency::Usdt => USDT_DECIMALS,
            _ => ETH_DECIMALS,
        };
        let txs = self.fetch_transfers(currency).await?;

        match find_payment(&txs, &self.address, decimals, expected, since) {
            Some((tx, amount)) => {
                let confirmations = tx.confirmations.parse().unwrap_or(0);
                debug!(tx_hash = %tx.hash, amount = %amount, confirmations, "Matching transaction");
                Ok(ChainObservation::matched(amount, confirmations, required, tx.hash.clone()))
            }
            None => Ok(ChainObservation::not_found(required)),
        }
    }

    fn required_confirmations(&self, currency: Currency) -> u32 {
        self.policy.required(currency)
    }
}
