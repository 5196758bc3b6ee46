//! External price feeds.

pub mod coingecko;

pub use coingecko::{CoinGeckoPriceFeed, DEFAULT_COINGECKO_API_URL};
