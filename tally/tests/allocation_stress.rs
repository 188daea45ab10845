//! Stress tests for sequence allocation under concurrent creators.
//!
//! The in-memory backend holds its counter and row map under one lock,
//! so these tests exercise the same serialization contract the Postgres
//! counter row provides.

use std::collections::HashSet;
use std::sync::Arc;

use tally::{DashboardCache, Ledger};
use tally_testkit::{invoice_draft, job_card_draft, owner, InMemoryLedger};

fn ledger() -> Ledger<InMemoryLedger> {
    Ledger::new(Arc::new(InMemoryLedger::new()), DashboardCache::in_memory())
}

#[tokio::test]
async fn hundred_concurrent_creators_get_a_gapless_run() {
    let ledger = ledger();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .create_invoice(owner(1), invoice_draft(1_000))
                .await
                .expect("create invoice")
        }));
    }

    let mut numbers = HashSet::new();
    for handle in handles {
        let invoice = handle.await.expect("join");
        assert!(
            numbers.insert(invoice.number.as_i64()),
            "duplicate number {}",
            invoice.number
        );
    }

    let expected: HashSet<i64> = (1..=100).collect();
    assert_eq!(numbers, expected, "numbers must be exactly 1..=100");
}

#[tokio::test]
async fn interleaved_owners_number_independently() {
    let ledger = ledger();

    let mut handles = Vec::new();
    for i in 0..100 {
        let ledger = ledger.clone();
        let who = owner(if i % 2 == 0 { 1 } else { 2 });
        handles.push(tokio::spawn(async move {
            let invoice = ledger
                .create_invoice(who, invoice_draft(1_000))
                .await
                .expect("create invoice");
            (who, invoice.number.as_i64())
        }));
    }

    let mut by_owner: std::collections::HashMap<_, HashSet<i64>> =
        std::collections::HashMap::new();
    for handle in handles {
        let (who, number) = handle.await.expect("join");
        assert!(
            by_owner.entry(who).or_default().insert(number),
            "duplicate number {number} for owner {who}"
        );
    }

    let expected: HashSet<i64> = (1..=50).collect();
    assert_eq!(by_owner[&owner(1)], expected);
    assert_eq!(by_owner[&owner(2)], expected);
}

#[tokio::test]
async fn kinds_number_independently_under_concurrency() {
    let ledger = ledger();

    let mut invoice_handles = Vec::new();
    let mut card_handles = Vec::new();
    for _ in 0..30 {
        let l = ledger.clone();
        invoice_handles.push(tokio::spawn(async move {
            l.create_invoice(owner(1), invoice_draft(1_000))
                .await
                .expect("create invoice")
                .number
                .as_i64()
        }));
        let l = ledger.clone();
        card_handles.push(tokio::spawn(async move {
            l.create_job_card(owner(1), job_card_draft("widget"))
                .await
                .expect("create job card")
                .number
                .as_i64()
        }));
    }

    let mut invoice_numbers = HashSet::new();
    for handle in invoice_handles {
        assert!(invoice_numbers.insert(handle.await.expect("join")));
    }
    let mut card_numbers = HashSet::new();
    for handle in card_handles {
        assert!(card_numbers.insert(handle.await.expect("join")));
    }

    let expected: HashSet<i64> = (1..=30).collect();
    assert_eq!(invoice_numbers, expected);
    assert_eq!(card_numbers, expected);
}

#[tokio::test]
async fn sequential_creations_are_strictly_increasing() {
    let ledger = ledger();

    let mut last = 0;
    for _ in 0..20 {
        let invoice = ledger
            .create_invoice(owner(7), invoice_draft(500))
            .await
            .expect("create invoice");
        assert!(invoice.number.as_i64() > last);
        last = invoice.number.as_i64();
    }
    assert_eq!(last, 20);
}
