//! Catalog seed plans.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::types::{Match, Seat, TicketClass};

/// A ticket class and the seat rows it owns
#[derive(Debug, Clone)]
pub struct ClassPlan {
    pub name: String,
    pub price: Decimal,
    pub rows: Vec<String>,
    pub seats_per_row: u32,
}

/// Description of one match to seed
#[derive(Debug, Clone)]
pub struct CatalogPlan {
    pub title: String,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub classes: Vec<ClassPlan>,
}

/// Concrete rows generated from a [`CatalogPlan`]
#[derive(Debug, Clone)]
pub struct CatalogRows {
    pub event: Match,
    pub classes: Vec<TicketClass>,
    pub seats: Vec<Seat>,
}

impl CatalogRows {
    pub fn class_named(&self, name: &str) -> Option<&TicketClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Seat ids of a class in row/label order
    pub fn seat_ids_in(&self, class_id: &str) -> Vec<String> {
        self.seats
            .iter()
            .filter(|s| s.ticket_class_id == class_id)
            .map(|s| s.id.clone())
            .collect()
    }
}

impl CatalogPlan {
    /// VIP (200 USD, rows A-C) and Regular (100 USD, rows D-F), ten seats per row
    pub fn demo(now: DateTime<Utc>) -> Self {
        let rows = |r: &[&str]| r.iter().map(|s| s.to_string()).collect();
        Self {
            title: "Brazil vs Morocco".to_string(),
            venue: "MetLife Stadium, New York".to_string(),
            starts_at: now + Duration::days(30),
            classes: vec![
                ClassPlan {
                    name: "VIP".to_string(),
                    price: Decimal::from(200),
                    rows: rows(&["A", "B", "C"]),
                    seats_per_row: 10,
                },
                ClassPlan {
                    name: "Regular".to_string(),
                    price: Decimal::from(100),
                    rows: rows(&["D", "E", "F"]),
                    seats_per_row: 10,
                },
            ],
        }
    }

    /// Assign ids and expand rows into seats
    pub fn build(&self) -> CatalogRows {
        let event = Match {
            id: Uuid::new_v4().to_string(),
            title: self.title.clone(),
            venue: self.venue.clone(),
            starts_at: self.starts_at,
        };

        let mut classes = Vec::with_capacity(self.classes.len());
        let mut seats = Vec::new();
        for plan in &self.classes {
            let total = plan.rows.len() as i32 * plan.seats_per_row as i32;
            let class = TicketClass {
                id: Uuid::new_v4().to_string(),
                match_id: event.id.clone(),
                name: plan.name.clone(),
                price: plan.price,
                available_count: total,
                total_count: total,
            };
            for row in &plan.rows {
                for n in 1..=plan.seats_per_row {
                    seats.push(Seat {
                        id: Uuid::new_v4().to_string(),
                        match_id: event.id.clone(),
                        ticket_class_id: class.id.clone(),
                        section: plan.name.clone(),
                        row: row.clone(),
                        label: format!("{row}{n}"),
                        booked: false,
                        booking_final: false,
                        order_item_id: None,
                    });
                }
            }
            classes.push(class);
        }

        CatalogRows {
            event,
            classes,
            seats,
        }
    }
}
