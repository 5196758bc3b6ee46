//! Test doubles shared by unit and integration tests.

pub mod mocks;

pub use mocks::{
    MockChainObserver, MockConfig, MockDatabaseClient, MockPriceFeed, SeededCatalog,
    seed_pending_payment,
};
