//! PostgreSQL database client implementation.
//!
//! Reservation, completion and expiry each run in one SERIALIZABLE transaction
//! and lock the affected seat rows. Payment status updates are guarded by
//! `status IN ('pending', 'confirming')`, so terminal states stay terminal no
//! matter how many processes race on them.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{
    AppError, CatalogRows, DatabaseClient, DatabaseError, Match, MatchDetails, NewPayment, Order,
    OrderItem, OrderStatus, Payment, PaymentStatus, Seat, SeatListing, TicketClass,
    ValidationError,
};

const PAYMENT_COLUMNS: &str = r#"
    id, order_id, fiat_amount, currency, crypto_amount, exchange_rate, wallet_address,
    network, reference, status, confirmations, tx_hash, expires_at, confirmed_at,
    created_at, updated_at
"#;

const IN_FLIGHT: &str = "('pending', 'confirming')";

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL database client with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client with default configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Wrap an existing pool
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a generated catalog in one transaction
    #[instrument(skip(self, rows), fields(match_id = %rows.event.id, seats = rows.seats.len()))]
    pub async fn seed_catalog(&self, rows: &CatalogRows) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO matches (id, title, venue, starts_at) VALUES ($1, $2, $3, $4)")
            .bind(&rows.event.id)
            .bind(&rows.event.title)
            .bind(&rows.event.venue)
            .bind(rows.event.starts_at)
            .execute(&mut *tx)
            .await?;

        for class in &rows.classes {
            sqlx::query(
                r#"
                INSERT INTO ticket_classes (id, match_id, name, price, available_count, total_count)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&class.id)
            .bind(&class.match_id)
            .bind(&class.name)
            .bind(class.price)
            .bind(class.available_count)
            .bind(class.total_count)
            .execute(&mut *tx)
            .await?;
        }

        for seat in &rows.seats {
            sqlx::query(
                r#"
                INSERT INTO seats (id, match_id, ticket_class_id, section, seat_row, label)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&seat.id)
            .bind(&seat.match_id)
            .bind(&seat.ticket_class_id)
            .bind(&seat.section)
            .bind(&seat.row)
            .bind(&seat.label)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Catalog seeded");
        Ok(())
    }

    async fn begin_serializable(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn fetch_items(&self, order_ids: &[String]) -> Result<HashMap<String, Vec<OrderItem>>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, ticket_class_id, seat_id, seat_label, price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, length(seat_label), seat_label
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let item = row_to_order_item(row)?;
            items.entry(item.order_id.clone()).or_default().push(item);
        }
        Ok(items)
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T, AppError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: String| AppError::Database(DatabaseError::Query(e)))
}

fn row_to_match(row: &PgRow) -> Result<Match, AppError> {
    Ok(Match {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        venue: row.try_get("venue")?,
        starts_at: row.try_get("starts_at")?,
    })
}

fn row_to_ticket_class(row: &PgRow) -> Result<TicketClass, AppError> {
    Ok(TicketClass {
        id: row.try_get("id")?,
        match_id: row.try_get("match_id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        available_count: row.try_get("available_count")?,
        total_count: row.try_get("total_count")?,
    })
}

fn row_to_seat(row: &PgRow) -> Result<Seat, AppError> {
    Ok(Seat {
        id: row.try_get("id")?,
        match_id: row.try_get("match_id")?,
        ticket_class_id: row.try_get("ticket_class_id")?,
        section: row.try_get("section")?,
        row: row.try_get("seat_row")?,
        label: row.try_get("label")?,
        booked: row.try_get("booked")?,
        booking_final: row.try_get("booking_final")?,
        order_item_id: row.try_get("order_item_id")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem, AppError> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        ticket_class_id: row.try_get("ticket_class_id")?,
        seat_id: row.try_get("seat_id")?,
        seat_label: row.try_get("seat_label")?,
        price: row.try_get("price")?,
    })
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order, AppError> {
    Ok(Order {
        id: row.try_get("id")?,
        buyer_id: row.try_get("buyer_id")?,
        total_amount: row.try_get("total_amount")?,
        status: parse_column::<OrderStatus>(row, "status")?,
        items,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment, AppError> {
    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        fiat_amount: row.try_get("fiat_amount")?,
        currency: parse_column(row, "currency")?,
        crypto_amount: row.try_get("crypto_amount")?,
        exchange_rate: row.try_get("exchange_rate")?,
        wallet_address: row.try_get("wallet_address")?,
        network: parse_column(row, "network")?,
        reference: row.try_get("reference")?,
        status: parse_column::<PaymentStatus>(row, "status")?,
        confirmations: row.try_get("confirmations")?,
        tx_hash: row.try_get("tx_hash")?,
        expires_at: row.try_get("expires_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_matches(&self) -> Result<Vec<Match>, AppError> {
        let rows = sqlx::query("SELECT id, title, venue, starts_at FROM matches ORDER BY starts_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_match).collect()
    }

    #[instrument(skip(self))]
    async fn get_match(&self, match_id: &str) -> Result<Option<MatchDetails>, AppError> {
        let Some(row) = sqlx::query("SELECT id, title, venue, starts_at FROM matches WHERE id = $1")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let classes = sqlx::query(
            r#"
            SELECT id, match_id, name, price, available_count, total_count
            FROM ticket_classes
            WHERE match_id = $1
            ORDER BY price DESC
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(MatchDetails {
            event: row_to_match(&row)?,
            ticket_classes: classes.iter().map(row_to_ticket_class).collect::<Result<_, _>>()?,
        }))
    }

    #[instrument(skip(self))]
    async fn list_available_seats(
        &self,
        match_id: &str,
        ticket_class: Option<&str>,
    ) -> Result<Vec<SeatListing>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.match_id, s.ticket_class_id, s.section, s.seat_row, s.label,
                   s.booked, s.booking_final, s.order_item_id,
                   c.name AS class_name, c.price
            FROM seats s
            JOIN ticket_classes c ON c.id = s.ticket_class_id
            WHERE s.match_id = $1
              AND s.booked = FALSE
              AND ($2::TEXT IS NULL OR lower(c.name) = lower($2))
            ORDER BY s.seat_row, length(s.label), s.label
            "#,
        )
        .bind(match_id)
        .bind(ticket_class)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SeatListing {
                    seat: row_to_seat(row)?,
                    ticket_class: row.try_get("class_name")?,
                    price: row.try_get("price")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, seat_ids), fields(seat_count = seat_ids.len()))]
    async fn reserve_seats(&self, buyer_id: &str, seat_ids: &[String]) -> Result<Order, AppError> {
        let mut tx = self.begin_serializable().await?;

        // Lock in a stable order so overlapping requests queue instead of deadlocking
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.label, s.booked, s.ticket_class_id, c.price
            FROM seats s
            JOIN ticket_classes c ON c.id = s.ticket_class_id
            WHERE s.id = ANY($1)
            ORDER BY s.id
            FOR UPDATE OF s
            "#,
        )
        .bind(seat_ids)
        .fetch_all(&mut *tx)
        .await?;

        let mut locked = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            let label: String = row.try_get("label")?;
            let booked: bool = row.try_get("booked")?;
            let class_id: String = row.try_get("ticket_class_id")?;
            let price: Decimal = row.try_get("price")?;
            locked.insert(id, (label, booked, class_id, price));
        }

        if let Some(missing) = seat_ids.iter().find(|id| !locked.contains_key(*id)) {
            return Err(AppError::not_found(format!("seat {missing}")));
        }
        for id in seat_ids {
            if let Some((label, true, _, _)) = locked.get(id) {
                return Err(AppError::SeatUnavailable {
                    seat_id: id.clone(),
                    label: label.clone(),
                });
            }
        }

        let now = Utc::now();
        let order_id = Uuid::now_v7().to_string();
        let total: Decimal = seat_ids.iter().filter_map(|id| locked.get(id)).map(|s| s.3).sum();

        sqlx::query(
            r#"
            INSERT INTO orders (id, buyer_id, total_amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            "#,
        )
        .bind(&order_id)
        .bind(buyer_id)
        .bind(total)
        .bind(OrderStatus::Pending.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(seat_ids.len());
        let mut per_class: BTreeMap<String, i32> = BTreeMap::new();
        for seat_id in seat_ids {
            let Some((label, _, class_id, price)) = locked.get(seat_id) else {
                continue;
            };
            let item = OrderItem {
                id: Uuid::now_v7().to_string(),
                order_id: order_id.clone(),
                ticket_class_id: class_id.clone(),
                seat_id: Some(seat_id.clone()),
                seat_label: Some(label.clone()),
                price: *price,
            };

            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, ticket_class_id, seat_id, seat_label, price, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&item.id)
            .bind(&item.order_id)
            .bind(&item.ticket_class_id)
            .bind(&item.seat_id)
            .bind(&item.seat_label)
            .bind(item.price)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            let updated = sqlx::query(
                "UPDATE seats SET booked = TRUE, order_item_id = $2 WHERE id = $1 AND booked = FALSE",
            )
            .bind(seat_id)
            .bind(&item.id)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                return Err(AppError::SeatUnavailable {
                    seat_id: seat_id.clone(),
                    label: label.clone(),
                });
            }

            *per_class.entry(class_id.clone()).or_default() += 1;
            items.push(item);
        }

        for (class_id, count) in &per_class {
            let updated = sqlx::query(
                r#"
                UPDATE ticket_classes
                SET available_count = available_count - $2
                WHERE id = $1 AND available_count >= $2
                "#,
            )
            .bind(class_id)
            .bind(count)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                return Err(AppError::Internal(format!(
                    "ticket class {class_id} has fewer than {count} seats available"
                )));
            }
        }

        tx.commit().await?;
        info!(order_id = %order_id, total_amount = %total, "Order created");

        Ok(Order {
            id: order_id,
            buyer_id: buyer_id.to_string(),
            total_amount: total,
            status: OrderStatus::Pending,
            items,
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, AppError> {
        let Some(row) = sqlx::query(
            "SELECT id, buyer_id, total_amount, status, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let mut items = self.fetch_items(&[order_id.to_string()]).await?;
        let items = items.remove(order_id).unwrap_or_default();
        Ok(Some(row_to_order(&row, items)?))
    }

    #[instrument(skip(self))]
    async fn list_orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id, buyer_id, total_amount, status, created_at, updated_at
            FROM orders
            WHERE buyer_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = rows
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<_, _>>()?;
        let mut items = self.fetch_items(&ids).await?;

        rows.iter()
            .zip(&ids)
            .map(|(row, id)| row_to_order(row, items.remove(id).unwrap_or_default()))
            .collect()
    }

    #[instrument(skip(self, payment), fields(order_id = %payment.order_id, currency = %payment.currency))]
    async fn create_payment(&self, payment: &NewPayment) -> Result<Payment, AppError> {
        let mut tx = self.begin_serializable().await?;

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(&payment.order_id)
            .fetch_optional(&mut *tx)
            .await?;
        let status: OrderStatus = status
            .ok_or_else(|| AppError::not_found(format!("order {}", payment.order_id)))?
            .parse()
            .map_err(|e: String| AppError::Database(DatabaseError::Query(e)))?;

        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM payments WHERE order_id = $1")
            .bind(&payment.order_id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(AppError::Database(DatabaseError::Duplicate(format!(
                "payment already created for order {}",
                payment.order_id
            ))));
        }
        if status != OrderStatus::Pending {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "order_id".to_string(),
                message: format!("Order is {status}, not awaiting payment"),
            }));
        }

        let sql = format!(
            r#"
            INSERT INTO payments (
                id, order_id, fiat_amount, currency, crypto_amount, exchange_rate,
                wallet_address, network, reference, status, confirmations,
                expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11, $12, $12)
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::now_v7().to_string())
            .bind(&payment.order_id)
            .bind(payment.fiat_amount)
            .bind(payment.currency.as_str())
            .bind(payment.crypto_amount)
            .bind(payment.exchange_rate)
            .bind(&payment.wallet_address)
            .bind(payment.network.as_str())
            .bind(&payment.reference)
            .bind(PaymentStatus::Pending.as_str())
            .bind(payment.expires_at)
            .bind(payment.created_at)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(&payment.order_id)
            .bind(OrderStatus::PendingPayment.as_str())
            .bind(payment.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        row_to_payment(&row)
    }

    #[instrument(skip(self))]
    async fn get_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>, AppError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_payment).transpose()
    }

    #[instrument(skip(self))]
    async fn record_confirmations(
        &self,
        payment_id: &str,
        confirmations: i32,
        tx_hash: Option<&str>,
    ) -> Result<bool, AppError> {
        let sql = format!(
            r#"
            UPDATE payments
            SET status = 'confirming',
                confirmations = GREATEST(confirmations, $2),
                tx_hash = COALESCE($3, tx_hash),
                updated_at = NOW()
            WHERE id = $1 AND status IN {IN_FLIGHT}
            "#
        );
        let result = sqlx::query(&sql)
            .bind(payment_id)
            .bind(confirmations.max(0))
            .bind(tx_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn complete_payment(
        &self,
        payment_id: &str,
        tx_hash: Option<&str>,
        confirmations: i32,
        confirmed_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tx = self.begin_serializable().await?;

        let sql = format!(
            r#"
            UPDATE payments
            SET status = 'completed',
                confirmations = GREATEST(confirmations, $2),
                tx_hash = COALESCE($3, tx_hash),
                confirmed_at = $4,
                updated_at = $4
            WHERE id = $1 AND status IN {IN_FLIGHT}
            RETURNING order_id
            "#
        );
        let order_id: Option<String> = sqlx::query_scalar(&sql)
            .bind(payment_id)
            .bind(confirmations.max(0))
            .bind(tx_hash)
            .bind(confirmed_at)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(order_id) = order_id else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(&order_id)
            .bind(OrderStatus::Confirmed.as_str())
            .bind(confirmed_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE seats SET booking_final = TRUE
            WHERE order_item_id IN (SELECT id FROM order_items WHERE order_id = $1)
            "#,
        )
        .bind(&order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn expire_payment(&self, payment_id: &str) -> Result<bool, AppError> {
        let mut tx = self.begin_serializable().await?;

        let sql = format!(
            r#"
            UPDATE payments
            SET status = 'expired', updated_at = NOW()
            WHERE id = $1 AND status IN {IN_FLIGHT}
            RETURNING order_id
            "#
        );
        let order_id: Option<String> = sqlx::query_scalar(&sql)
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(order_id) = order_id else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(&order_id)
            .bind(OrderStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?;

        let seats = sqlx::query(
            r#"
            SELECT s.id, s.ticket_class_id
            FROM seats s
            JOIN order_items i ON i.id = s.order_item_id
            WHERE i.order_id = $1 AND s.booked = TRUE
            ORDER BY s.id
            FOR UPDATE OF s
            "#,
        )
        .bind(&order_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut seat_ids = Vec::with_capacity(seats.len());
        let mut per_class: BTreeMap<String, i32> = BTreeMap::new();
        for row in &seats {
            seat_ids.push(row.try_get::<String, _>("id")?);
            *per_class.entry(row.try_get("ticket_class_id")?).or_default() += 1;
        }

        sqlx::query(
            "UPDATE seats SET booked = FALSE, booking_final = FALSE, order_item_id = NULL WHERE id = ANY($1)",
        )
        .bind(&seat_ids)
        .execute(&mut *tx)
        .await?;

        for (class_id, count) in &per_class {
            sqlx::query("UPDATE ticket_classes SET available_count = available_count + $2 WHERE id = $1")
                .bind(class_id)
                .bind(count)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(order_id = %order_id, released = seat_ids.len(), "Seats released");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn list_in_flight_payments(&self) -> Result<Vec<Payment>, AppError> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE status IN {IN_FLIGHT} ORDER BY created_at"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_payment).collect()
    }
}
