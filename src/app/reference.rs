//! Payment reference strings and expiry deadlines.
//!
//! A reference reads `ORDER-{order_id}-{millis:013}-{suffix:4 hex}`. The order
//! id may itself contain `-`, so parsing anchors on the prefix and the two
//! fixed-width trailing fields instead of splitting.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

pub const REFERENCE_PREFIX: &str = "ORDER-";
const TIMESTAMP_WIDTH: usize = 13;
const SUFFIX_WIDTH: usize = 4;
/// `-{timestamp}-{suffix}`
const TAIL_LEN: usize = 1 + TIMESTAMP_WIDTH + 1 + SUFFIX_WIDTH;

/// Default payment window
pub const DEFAULT_PAYMENT_TIMEOUT_MINUTES: i64 = 30;

pub struct ReferenceGenerator {
    timeout: Duration,
    last_millis: AtomicI64,
}

impl Default for ReferenceGenerator {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_PAYMENT_TIMEOUT_MINUTES))
    }
}

impl ReferenceGenerator {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_millis: AtomicI64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a fresh reference for `order_id`
    pub fn reference(&self, order_id: &str) -> String {
        self.reference_at(order_id, Utc::now())
    }

    /// Build a reference as of `now`. The embedded timestamp strictly
    /// increases across calls on the same generator.
    pub fn reference_at(&self, order_id: &str, now: DateTime<Utc>) -> String {
        let millis = self.next_millis(now.timestamp_millis());
        let suffix: u16 = rand::thread_rng().r#gen();
        format!(
            "{REFERENCE_PREFIX}{order_id}-{millis:0width$}-{suffix:04x}",
            width = TIMESTAMP_WIDTH
        )
    }

    /// Deadline for a payment created at `created_at`
    pub fn expiry_from(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + self.timeout
    }

    fn next_millis(&self, now_millis: i64) -> i64 {
        let previous = self
            .last_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_millis.max(last + 1))
            })
            .unwrap_or(now_millis);
        now_millis.max(previous + 1)
    }
}

/// Recover the order id from a reference, or `None` if it is malformed
pub fn parse_order_id(reference: &str) -> Option<&str> {
    let rest = reference.strip_prefix(REFERENCE_PREFIX)?;
    if rest.len() <= TAIL_LEN {
        return None;
    }

    let split = rest.len() - TAIL_LEN;
    let tail = rest.as_bytes().get(split..)?;
    let (timestamp, suffix) = (&tail[1..=TIMESTAMP_WIDTH], &tail[TIMESTAMP_WIDTH + 2..]);

    let well_formed = tail[0] == b'-'
        && tail[TIMESTAMP_WIDTH + 1] == b'-'
        && timestamp.iter().all(u8::is_ascii_digit)
        && suffix.iter().all(u8::is_ascii_hexdigit);
    if !well_formed {
        return None;
    }

    rest.get(..split)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let generator = ReferenceGenerator::default();
        let now = DateTime::from_timestamp_millis(1_699_564_800_000).unwrap();
        let reference = generator.reference_at("abc123", now);

        assert!(reference.starts_with("ORDER-abc123-1699564800000-"));
        assert_eq!(reference.len(), "ORDER-abc123-1699564800000-".len() + 4);
    }

    #[test]
    fn test_round_trip_with_separators_in_order_id() {
        let generator = ReferenceGenerator::default();
        for order_id in [
            "abc",
            "0193a3f0-2a4b-7c1e-9d8f-1a2b3c4d5e6f",
            "a-1234567890123-beef",
            "ORDER-",
            "-",
            "ünïcode-id",
        ] {
            let reference = generator.reference(order_id);
            assert_eq!(parse_order_id(&reference), Some(order_id), "{reference}");
        }
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let generator = ReferenceGenerator::default();
        let now = Utc::now();
        let first = generator.reference_at("o", now);
        let second = generator.reference_at("o", now);
        assert_ne!(first[..first.len() - 5], second[..second.len() - 5]);
        assert!(second[..second.len() - 5] > first[..first.len() - 5]);
    }

    #[test]
    fn test_rejects_malformed_references() {
        assert_eq!(parse_order_id(""), None);
        assert_eq!(parse_order_id("ORDER-"), None);
        assert_eq!(parse_order_id("PAY-abc-1699564800000-beef"), None);
        assert_eq!(parse_order_id("ORDER--1699564800000-beef"), None);
        assert_eq!(parse_order_id("ORDER-abc-169956480000x-beef"), None);
        assert_eq!(parse_order_id("ORDER-abc-1699564800000-beeg"), None);
        assert_eq!(parse_order_id("ORDER-abc_1699564800000-beef"), None);
    }

    #[test]
    fn test_expiry_uses_fixed_timeout() {
        let generator = ReferenceGenerator::default();
        let created = Utc::now();
        assert_eq!(generator.expiry_from(created), created + Duration::minutes(30));
    }
}
