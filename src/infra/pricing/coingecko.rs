//! CoinGecko simple price feed.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::domain::{AppError, Currency, ExternalServiceError, PriceFeed};
use crate::infra::http::{DEFAULT_HTTP_TIMEOUT, build_client, fetch_json};

/// Default CoinGecko API base URL
pub const DEFAULT_COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko coin id for a currency
pub fn coin_id(currency: Currency) -> &'static str {
    match currency {
        Currency::Btc => "bitcoin",
        Currency::Eth => "ethereum",
        Currency::Usdt => "tether",
    }
}

/// `{"bitcoin": {"usd": 60000.0}}`
type SimplePriceResponse = HashMap<String, HashMap<String, Decimal>>;

#[derive(Debug, Clone)]
pub struct CoinGeckoPriceFeed {
    http_client: Client,
    base_url: String,
}

impl CoinGeckoPriceFeed {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_COINGECKO_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn with_defaults() -> Result<Self, AppError> {
        Self::new(None, DEFAULT_HTTP_TIMEOUT)
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoPriceFeed {
    #[instrument(skip(self), fields(currency = %currency))]
    async fn fetch_usd_price(&self, currency: Currency) -> Result<Decimal, AppError> {
        let id = coin_id(currency);
        let request = self
            .http_client
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", id), ("vs_currencies", "usd")]);

        let body: SimplePriceResponse = fetch_json("coingecko", request).await?;
        let price = body
            .get(id)
            .and_then(|quotes| quotes.get("usd"))
            .copied()
            .ok_or_else(|| ExternalServiceError::ParseError(format!("no usd quote for {id}")))?;

        debug!(price = %price, "Fetched price");
        Ok(price)
    }
}
