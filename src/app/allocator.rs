//! Seat allocation with at-most-one-winner semantics.
//!
//! The store's transaction is the only arbiter of who gets a seat; this layer
//! validates input and retries transactions that lost a serialization race.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::retry::{RetryPolicy, retry_on_conflict};
use crate::domain::types::MAX_SEATS_PER_ORDER;
use crate::domain::{AppError, DatabaseClient, Order, ValidationError};

pub struct SeatAllocator {
    db_client: Arc<dyn DatabaseClient>,
    retry: RetryPolicy,
}

impl SeatAllocator {
    #[must_use]
    pub fn new(db_client: Arc<dyn DatabaseClient>, retry: RetryPolicy) -> Self {
        Self { db_client, retry }
    }

    /// Reserve `seat_ids` for `buyer_id` as a single PENDING order
    #[instrument(skip(self, seat_ids), fields(seat_count = seat_ids.len()))]
    pub async fn reserve(&self, buyer_id: &str, seat_ids: &[String]) -> Result<Order, AppError> {
        let buyer_id = buyer_id.trim();
        if buyer_id.is_empty() {
            return Err(AppError::Validation(ValidationError::MissingField(
                "buyer_id".to_string(),
            )));
        }
        let seat_ids = normalize_seat_ids(seat_ids)?;

        let result = retry_on_conflict("reserve_seats", self.retry, || {
            self.db_client.reserve_seats(buyer_id, &seat_ids)
        })
        .await;

        match &result {
            Ok(order) => info!(
                order_id = %order.id,
                total_amount = %order.total_amount,
                "Seats reserved"
            ),
            Err(AppError::SeatUnavailable { seat_id, label }) => {
                warn!(seat_id = %seat_id, label = %label, "Seat already booked")
            }
            Err(e) => warn!(error = %e, "Reservation failed"),
        }
        result
    }
}

/// Trim, reject blanks and drop duplicates while keeping request order
fn normalize_seat_ids(seat_ids: &[String]) -> Result<Vec<String>, AppError> {
    if seat_ids.is_empty() {
        return Err(AppError::Validation(ValidationError::MissingField(
            "seat_ids".to_string(),
        )));
    }

    let mut seen = HashSet::with_capacity(seat_ids.len());
    let mut normalized = Vec::with_capacity(seat_ids.len());
    for id in seat_ids {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "seat_ids".to_string(),
                message: "Seat IDs must not be blank".to_string(),
            }));
        }
        if seen.insert(id) {
            normalized.push(id.to_string());
        }
    }
    if normalized.len() > MAX_SEATS_PER_ORDER {
        return Err(AppError::Validation(ValidationError::InvalidField {
            field: "seat_ids".to_string(),
            message: format!("At most {MAX_SEATS_PER_ORDER} seats per order"),
        }));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockDatabaseClient;
    use std::time::Duration;

    fn allocator(db: Arc<MockDatabaseClient>) -> SeatAllocator {
        SeatAllocator::new(db, RetryPolicy::new(3, Duration::from_millis(1)))
    }

    #[test]
    fn test_normalize_dedupes_in_order() {
        let ids = vec!["b".to_string(), " a ".to_string(), "b".to_string()];
        assert_eq!(normalize_seat_ids(&ids).unwrap(), vec!["b", "a"]);
        assert!(normalize_seat_ids(&[]).is_err());
        assert!(normalize_seat_ids(&["  ".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_reserve_books_seats() {
        let db = Arc::new(MockDatabaseClient::new());
        let catalog = db.seed_demo_catalog();
        let seats = vec![catalog.vip_seats[0].clone(), catalog.vip_seats[1].clone()];

        let order = allocator(Arc::clone(&db)).reserve("buyer-1", &seats).await.unwrap();

        assert_eq!(order.items.len(), 2);
        assert_eq!(order.total_amount, catalog.vip_price * rust_decimal::Decimal::from(2));
    }

    #[tokio::test]
    async fn test_reserve_rejects_blank_buyer() {
        let db = Arc::new(MockDatabaseClient::new());
        let result = allocator(db).reserve(" ", &["s1".to_string()]).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reserve_retries_serialization_conflicts() {
        let db = Arc::new(MockDatabaseClient::new());
        let catalog = db.seed_demo_catalog();
        db.inject_serialization_conflicts(2);

        let order = allocator(Arc::clone(&db))
            .reserve("buyer-1", &[catalog.regular_seats[0].clone()])
            .await
            .unwrap();
        assert_eq!(order.items.len(), 1);
    }

    #[tokio::test]
    async fn test_reserve_surfaces_conflict_after_budget() {
        let db = Arc::new(MockDatabaseClient::new());
        let catalog = db.seed_demo_catalog();
        db.inject_serialization_conflicts(10);

        let result = allocator(Arc::clone(&db))
            .reserve("buyer-1", &[catalog.regular_seats[0].clone()])
            .await;
        assert!(result.unwrap_err().is_serialization_conflict());
    }
}
