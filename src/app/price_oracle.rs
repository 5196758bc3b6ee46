//! Fiat to crypto conversion with a cached external rate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, instrument, warn};

use crate::domain::{AppError, Currency, PriceFeed, ValidationError};

/// Default cache freshness window
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
/// Default bound on one feed call
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Approximate USD price used when the feed is unreachable
pub fn fallback_rate(currency: Currency) -> Decimal {
    match currency {
        Currency::Btc => Decimal::from(60_000),
        Currency::Eth => Decimal::from(3_000),
        Currency::Usdt => Decimal::ONE,
    }
}

/// Round `amount` to the currency's precision, half away from zero, keeping
/// trailing zeros so the stored string is stable (`0.00500000`).
pub fn round_amount(amount: Decimal, currency: Currency) -> Decimal {
    let decimals = currency.decimals();
    let mut rounded = amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(decimals);
    rounded
}

/// Result of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub crypto_amount: Decimal,
    /// USD price of one unit used for the conversion
    pub rate: Decimal,
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    price: Decimal,
    fetched_at: Instant,
}

pub struct PriceOracle {
    feed: Arc<dyn PriceFeed>,
    cache: DashMap<Currency, CachedRate>,
    ttl: Duration,
    feed_timeout: Duration,
}

impl PriceOracle {
    #[must_use]
    pub fn new(feed: Arc<dyn PriceFeed>) -> Self {
        Self::with_settings(feed, DEFAULT_CACHE_TTL, DEFAULT_FEED_TIMEOUT)
    }

    #[must_use]
    pub fn with_settings(feed: Arc<dyn PriceFeed>, ttl: Duration, feed_timeout: Duration) -> Self {
        Self {
            feed,
            cache: DashMap::new(),
            ttl,
            feed_timeout,
        }
    }

    /// USD price of one unit of `currency`. Never fails: a feed error or
    /// timeout falls back to [`fallback_rate`], which is not cached.
    #[instrument(skip(self), fields(currency = %currency))]
    pub async fn rate(&self, currency: Currency) -> Decimal {
        if let Some(cached) = self.cache.get(&currency)
            && cached.fetched_at.elapsed() < self.ttl
        {
            debug!(price = %cached.price, "Using cached rate");
            return cached.price;
        }

        let fetched = tokio::time::timeout(self.feed_timeout, self.feed.fetch_usd_price(currency)).await;
        match fetched {
            Ok(Ok(price)) if price > Decimal::ZERO => {
                self.cache.insert(
                    currency,
                    CachedRate {
                        price,
                        fetched_at: Instant::now(),
                    },
                );
                price
            }
            Ok(Ok(price)) => {
                warn!(price = %price, "Price feed returned a non-positive rate, using fallback");
                fallback_rate(currency)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Price feed failed, using fallback");
                fallback_rate(currency)
            }
            Err(_) => {
                warn!(timeout_ms = self.feed_timeout.as_millis() as u64, "Price feed timed out, using fallback");
                fallback_rate(currency)
            }
        }
    }

    /// Convert a USD amount to `currency`, rounded once to its precision
    #[instrument(skip(self), fields(currency = %currency))]
    pub async fn convert(&self, usd_amount: Decimal, currency: Currency) -> Result<Conversion, AppError> {
        if usd_amount.is_sign_negative() {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "amount".to_string(),
                message: "Amount must not be negative".to_string(),
            }));
        }

        let rate = self.rate(currency).await;
        let raw = usd_amount
            .checked_div(rate)
            .ok_or_else(|| AppError::Internal(format!("Cannot convert {usd_amount} at rate {rate}")))?;

        Ok(Conversion {
            crypto_amount: round_amount(raw, currency),
            rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockPriceFeed;
    use std::str::FromStr;

    #[test]
    fn test_rounding_policy() {
        let btc = round_amount(Decimal::from_str("0.005").unwrap(), Currency::Btc);
        assert_eq!(btc.to_string(), "0.00500000");

        let eth = round_amount(Decimal::from_str("0.123456785").unwrap(), Currency::Eth);
        assert_eq!(eth.to_string(), "0.12345679");

        let usdt = round_amount(Decimal::from_str("299.995").unwrap(), Currency::Usdt);
        assert_eq!(usdt.to_string(), "300.00");
    }

    #[tokio::test]
    async fn test_convert_btc_at_mocked_rate() {
        let feed = Arc::new(MockPriceFeed::new().with_price(Currency::Btc, Decimal::from(60_000)));
        let oracle = PriceOracle::new(feed);

        let conversion = oracle.convert(Decimal::from(300), Currency::Btc).await.unwrap();
        assert_eq!(conversion.crypto_amount.to_string(), "0.00500000");
        assert_eq!(conversion.rate, Decimal::from(60_000));
    }

    #[tokio::test]
    async fn test_rate_is_cached_within_ttl() {
        let feed = Arc::new(MockPriceFeed::new().with_price(Currency::Eth, Decimal::from(2_500)));
        let oracle = PriceOracle::new(Arc::clone(&feed) as Arc<dyn PriceFeed>);

        oracle.rate(Currency::Eth).await;
        feed.set_price(Currency::Eth, Decimal::from(9_999));
        assert_eq!(oracle.rate(Currency::Eth).await, Decimal::from(2_500));
        assert_eq!(feed.call_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_refetches() {
        let feed = Arc::new(MockPriceFeed::new().with_price(Currency::Eth, Decimal::from(2_500)));
        let oracle = PriceOracle::with_settings(
            Arc::clone(&feed) as Arc<dyn PriceFeed>,
            Duration::ZERO,
            DEFAULT_FEED_TIMEOUT,
        );

        oracle.rate(Currency::Eth).await;
        feed.set_price(Currency::Eth, Decimal::from(2_600));
        assert_eq!(oracle.rate(Currency::Eth).await, Decimal::from(2_600));
        assert_eq!(feed.call_count(), 2);
    }

    #[tokio::test]
    async fn test_feed_failure_falls_back() {
        let feed = Arc::new(MockPriceFeed::failing());
        let oracle = PriceOracle::new(feed);

        assert_eq!(oracle.rate(Currency::Btc).await, Decimal::from(60_000));
        let conversion = oracle.convert(Decimal::from(150), Currency::Usdt).await.unwrap();
        assert_eq!(conversion.crypto_amount.to_string(), "150.00");
    }

    #[tokio::test]
    async fn test_negative_amount_rejected() {
        let oracle = PriceOracle::new(Arc::new(MockPriceFeed::new()));
        let result = oracle.convert(Decimal::from(-1), Currency::Btc).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
