//! Infrastructure layer implementations.

pub mod chain;
pub mod database;
pub mod http;
pub mod pricing;

pub use chain::{BlockCypherObserver, CurrencyRouter, EtherscanObserver, SimulatedObserver};
pub use database::{PostgresClient, PostgresConfig};
pub use pricing::CoinGeckoPriceFeed;
