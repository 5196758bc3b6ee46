//! Seat reservation and crypto payment confirmation service.
//!
//! Buyers reserve seats atomically, then settle the order with a crypto
//! transfer that a background monitor watches until it is confirmed on chain
//! or the payment window expires.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
