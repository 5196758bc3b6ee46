//! Seed the demo match: VIP (rows A-C) and Regular (rows D-F), ten seats a row.
//!
//! Usage:
//!   cargo run --bin seed_catalog

use std::env;

use anyhow::{Context, Result};
use chrono::Utc;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ticket_checkout::domain::CatalogPlan;
use ticket_checkout::infra::{PostgresClient, PostgresConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")))
        .init();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let client = PostgresClient::new(&database_url, PostgresConfig::default()).await?;
    client.run_migrations().await?;

    let rows = CatalogPlan::demo(Utc::now()).build();
    client
        .seed_catalog(&rows)
        .await
        .context("Failed to insert catalog")?;

    info!(match_id = %rows.event.id, title = %rows.event.title, "Match created");
    for class in &rows.classes {
        info!(
            class_id = %class.id,
            name = %class.name,
            price = %class.price,
            seats = class.total_count,
            "Ticket class created"
        );
    }
    println!("{}", rows.event.id);
    Ok(())
}
