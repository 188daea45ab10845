//! PostgreSQL ledger wiring example.
//!
//! Connects a pool from `DATABASE_URL`, applies the schema, and runs a
//! creation through the full transactional allocation path.
//!
//! Run with: `DATABASE_URL=postgres://... cargo run --example postgres_ledger --features postgres`

use std::sync::Arc;

use tally::{
    CacheConfig, DashboardCache, InMemoryCacheStore, Ledger, NewInvoice, OwnerId,
    PersistenceConfig, PostgresLedger,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PersistenceConfig {
        connection_string: std::env::var("DATABASE_URL")?,
        max_connections: 5,
        min_connections: 1,
        acquire_timeout_seconds: 5,
    };

    let ledger_store = PostgresLedger::connect(&config).await?;
    sqlx::raw_sql(include_str!("../schema.sql"))
        .execute(ledger_store.pool())
        .await?;

    let cache = DashboardCache::new(
        Arc::new(InMemoryCacheStore::new()),
        CacheConfig::default(),
    );
    let ledger = Ledger::new(Arc::new(ledger_store), cache);
    let shop = OwnerId(1);

    let invoice = ledger
        .create_invoice(
            shop,
            NewInvoice {
                subtotal_cents: 19_900,
                total_cents: 19_900,
                ..Default::default()
            },
        )
        .await?;
    println!("created invoice {} for owner {}", invoice.number, shop);

    ledger.record_payment(shop, invoice.id, 19_900).await?;

    let summary = ledger.dashboard_summary(shop).await?;
    println!(
        "this month: {} invoices, {} cents revenue ({:+.1}% vs last month)",
        summary.current.invoice_count,
        summary.current.revenue_cents,
        summary.revenue_change(),
    );

    Ok(())
}
