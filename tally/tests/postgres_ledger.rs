//! Integration tests for the PostgreSQL ledger backend.
//!
//! Requires a running Postgres instance; the schema is applied on
//! connect. Run with:
//! `DATABASE_URL=postgres://... cargo test --test postgres_ledger --features postgres -- --ignored`

#![cfg(feature = "postgres")]

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::PgPool;
use tally::{LedgerStore, NewInvoice, OwnerId, PostgresLedger, SequenceKind};
use uuid::Uuid;

async fn connect() -> PgPool {
    let pool = PgPool::connect(
        &std::env::var("DATABASE_URL").expect("DATABASE_URL required"),
    )
    .await
    .expect("connect");

    sqlx::raw_sql(include_str!("../schema.sql"))
        .execute(&pool)
        .await
        .expect("apply schema");

    pool
}

/// Fresh owner per test so runs never collide.
fn random_owner() -> OwnerId {
    OwnerId((Uuid::new_v4().as_u128() as i64) & i64::MAX)
}

fn draft(total_cents: i64) -> NewInvoice {
    NewInvoice {
        subtotal_cents: total_cents,
        total_cents,
        ..Default::default()
    }
}

async fn cleanup(pool: &PgPool, owner: OwnerId) {
    for table in ["invoices", "job_cards", "owner_sequences"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE owner_id = $1"))
            .bind(owner.0)
            .execute(pool)
            .await
            .ok();
    }
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn concurrent_creators_get_a_gapless_run() {
    let pool = connect().await;
    let owner = random_owner();
    let ledger = Arc::new(PostgresLedger::new(pool.clone()));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .create_invoice(owner, draft(1_000))
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
    assert_eq!(numbers, (1..=16).collect::<HashSet<i64>>());

    cleanup(&pool, owner).await;
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn owners_allocate_independently() {
    let pool = connect().await;
    let owner_a = random_owner();
    let owner_b = random_owner();
    let ledger = Arc::new(PostgresLedger::new(pool.clone()));

    let mut handles = Vec::new();
    for i in 0..20 {
        let ledger = ledger.clone();
        let who = if i % 2 == 0 { owner_a } else { owner_b };
        handles.push(tokio::spawn(async move {
            let invoice = ledger.create_invoice(who, draft(500)).await.expect("create");
            (who, invoice.number.as_i64())
        }));
    }

    let mut by_owner: std::collections::HashMap<OwnerId, HashSet<i64>> =
        std::collections::HashMap::new();
    for handle in handles {
        let (who, number) = handle.await.expect("join");
        assert!(by_owner.entry(who).or_default().insert(number));
    }

    let expected: HashSet<i64> = (1..=10).collect();
    assert_eq!(by_owner[&owner_a], expected);
    assert_eq!(by_owner[&owner_b], expected);

    cleanup(&pool, owner_a).await;
    cleanup(&pool, owner_b).await;
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn deleted_numbers_are_never_reused() {
    let pool = connect().await;
    let owner = random_owner();
    let ledger = PostgresLedger::new(pool.clone());

    let first = ledger.create_invoice(owner, draft(1_000)).await.expect("create");
    let second = ledger.create_invoice(owner, draft(2_000)).await.expect("create");
    assert_eq!(first.number.as_i64(), 1);
    assert_eq!(second.number.as_i64(), 2);

    ledger.delete_invoice(owner, second.id).await.expect("delete");

    let third = ledger.create_invoice(owner, draft(3_000)).await.expect("create");
    assert_eq!(third.number.as_i64(), 3);

    // The deleted row keeps its number; restore brings it back intact.
    let restored = ledger.restore_invoice(owner, second.id).await.expect("restore");
    assert_eq!(restored.number.as_i64(), 2);

    cleanup(&pool, owner).await;
}

/// A writer that bypasses the counter trips the unique index; the error
/// is retryable and a retry lands on the next free number.
#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn bypassing_writer_surfaces_a_retryable_conflict() {
    let pool = connect().await;
    let owner = random_owner();
    let ledger = PostgresLedger::new(pool.clone());

    let first = ledger.create_invoice(owner, draft(1_000)).await.expect("create");
    assert_eq!(first.number.as_i64(), 1);

    // Insert number 2 directly, without touching owner_sequences.
    sqlx::query(
        r#"
        INSERT INTO invoices (id, owner_id, number, total_cents, status, created_at, updated_at)
        VALUES ($1, $2, 2, 0, 'draft', NOW(), NOW())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner.0)
    .execute(&pool)
    .await
    .expect("bypass insert");

    let err = ledger
        .create_invoice(owner, draft(1_000))
        .await
        .expect_err("allocator's number 2 must collide with the bypassed row");
    assert!(err.is_retryable(), "conflict must be retryable, got {err}");

    // The caller-owned retry succeeds on the next number.
    let retried = ledger.create_invoice(owner, draft(1_000)).await.expect("retry");
    assert_eq!(retried.number.as_i64(), 3);

    cleanup(&pool, owner).await;
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn allocation_is_transactional_with_the_insert() {
    let pool = connect().await;
    let owner = random_owner();

    // Allocate inside a transaction that rolls back; the counter must
    // roll back with it so the next creation still gets number 1.
    {
        let mut tx = pool.begin().await.expect("begin");
        let number = PostgresLedger::allocate_next(&mut tx, owner, SequenceKind::Invoice)
            .await
            .expect("allocate");
        assert_eq!(number.as_i64(), 1);
        tx.rollback().await.expect("rollback");
    }

    let ledger = PostgresLedger::new(pool.clone());
    let invoice = ledger.create_invoice(owner, draft(1_000)).await.expect("create");
    assert_eq!(invoice.number.as_i64(), 1);

    cleanup(&pool, owner).await;
}
