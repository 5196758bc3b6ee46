//! Ledger observers.
//!
//! Each strategy answers "has a payment of this amount reached the collection
//! address since this instant, and how many confirmations does it have".
//! [`CurrencyRouter`] picks the strategy per currency.

pub mod blockcypher;
pub mod etherscan;
pub mod router;
pub mod simulated;

pub use blockcypher::{BlockCypherObserver, DEFAULT_BLOCKCYPHER_API_URL};
pub use etherscan::{DEFAULT_ETHERSCAN_API_URL, DEFAULT_USDT_CONTRACT, EtherscanObserver};
pub use router::CurrencyRouter;
pub use simulated::SimulatedObserver;
