//! Basic ledger walkthrough using the in-memory backend from
//! tally-testkit: numbering, payments, and cache invalidation without a
//! database.

use std::sync::Arc;

use tally::{DashboardCache, InvoiceStatus, Ledger, NewInvoice, NewJobCard, OwnerId};
use tally_testkit::InMemoryLedger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryLedger::new());
    let ledger = Ledger::new(store.clone(), DashboardCache::in_memory());
    let shop = OwnerId(1);

    // Create a couple of invoices; numbers are per-owner and gapless.
    let first = ledger
        .create_invoice(
            shop,
            NewInvoice {
                subtotal_cents: 12_500,
                total_cents: 12_500,
                ..Default::default()
            },
        )
        .await?;
    let second = ledger
        .create_invoice(
            shop,
            NewInvoice {
                subtotal_cents: 4_000,
                total_cents: 4_000,
                ..Default::default()
            },
        )
        .await?;
    println!("invoice numbers: {} and {}", first.number, second.number);

    // Job cards run on their own counter.
    let card = ledger
        .create_job_card(
            shop,
            NewJobCard {
                item: "espresso machine".to_string(),
                problem: Some("won't heat".to_string()),
                estimated_cents: 8_000,
                ..Default::default()
            },
        )
        .await?;
    println!("job card number: {}", card.number);

    // Record a partial payment and watch the status roll up.
    let invoice = ledger.record_payment(shop, first.id, 5_000).await?;
    println!(
        "invoice {} is {} with {} cents outstanding",
        invoice.number,
        invoice.status,
        invoice.balance_cents()
    );
    assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);

    // Dashboard reads are cached, but every mutation above already
    // invalidated, so this reflects the latest state.
    let summary = ledger.dashboard_summary(shop).await?;
    println!(
        "this month: {} invoices, {} job cards, {} cents revenue, {} cents outstanding",
        summary.current.invoice_count,
        summary.current.job_card_count,
        summary.current.revenue_cents,
        summary.current.outstanding_cents,
    );

    // Another owner's books are entirely separate.
    let other = ledger
        .create_invoice(OwnerId(2), NewInvoice::default())
        .await?;
    println!("owner 2 starts at invoice {}", other.number);

    Ok(())
}
