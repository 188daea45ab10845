use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::config::PersistenceConfig;
use crate::entity::{
    Invoice, InvoiceStatus, JobCard, JobCardStatus, NewInvoice, NewJobCard, OwnerId,
};
use crate::sequence::{LedgerError, SequenceKind, SequenceNumber};
use crate::store::{DailyRevenuePoint, LedgerStore, PeriodStats};
use crate::telemetry;

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::backend(err)
    }
}

/// PostgreSQL-backed implementation of the ledger store.
///
/// Sequence allocation uses a dedicated counter row per `(owner, kind)`
/// updated atomically inside the caller's transaction; the counter row
/// lock serializes concurrent creators for the same owner while leaving
/// other owners untouched. A unique index on `(owner_id, number)`
/// backstops writers that bypass the counter.
#[derive(Clone, Debug)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Create a new ledger over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool from configuration and wrap it.
    pub async fn connect(config: &PersistenceConfig) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.connection_string)
            .await?;
        Ok(Self::new(pool))
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Allocate the next sequence number for `(owner, kind)`.
    ///
    /// Must run inside the same transaction that inserts the numbered
    /// row: the counter increment is only visible (and the number only
    /// spent) once that transaction commits, so a rollback leaves no
    /// gap. The first allocation for a pair yields 1.
    pub async fn allocate_next(
        conn: &mut PgConnection,
        owner: OwnerId,
        kind: SequenceKind,
    ) -> Result<SequenceNumber, LedgerError> {
        let started = Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO owner_sequences (owner_id, kind, value)
            VALUES ($1, $2, 1)
            ON CONFLICT (owner_id, kind)
            DO UPDATE SET value = owner_sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(owner.0)
        .bind(kind.as_str())
        .fetch_one(conn)
        .await
        .map_err(|err| map_lock_error(err, owner, kind))?;

        let value: i64 = row.try_get("value")?;
        telemetry::record_allocation(kind.as_str(), started.elapsed().as_secs_f64());
        Ok(SequenceNumber(value))
    }
}

/// Allocation-path errors: the counter row is contended, never conflicted.
fn map_lock_error(err: sqlx::Error, owner: OwnerId, kind: SequenceKind) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(db_err.code().as_deref(), Some("55P03") | Some("40P01")) {
            return LedgerError::LockTimeout { owner, kind };
        }
    }
    LedgerError::backend(err)
}

/// Insert/commit-path errors: a 23505 on `(owner_id, number)` means a
/// writer bypassed the counter lock.
fn map_insert_error(
    err: sqlx::Error,
    owner: OwnerId,
    kind: SequenceKind,
    number: SequenceNumber,
) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("55P03") | Some("40P01") => {
                return LedgerError::LockTimeout { owner, kind };
            }
            Some("23505") => {
                telemetry::record_number_conflict(kind.as_str());
                return LedgerError::NumberConflict {
                    owner,
                    kind,
                    number,
                };
            }
            _ => {}
        }
    }
    LedgerError::backend(err)
}

fn row_to_invoice(row: &PgRow) -> Result<Invoice, LedgerError> {
    let status_str: String = row.try_get("status")?;
    let status = InvoiceStatus::parse(&status_str)
        .ok_or_else(|| LedgerError::backend(format!("unknown invoice status: {status_str}")))?;

    Ok(Invoice {
        id: row.try_get("id")?,
        owner: OwnerId(row.try_get("owner_id")?),
        number: SequenceNumber(row.try_get("number")?),
        customer: row.try_get("customer_id")?,
        job_card: row.try_get("job_card_id")?,
        subtotal_cents: row.try_get("subtotal_cents")?,
        tax_cents: row.try_get("tax_cents")?,
        discount_cents: row.try_get("discount_cents")?,
        total_cents: row.try_get("total_cents")?,
        paid_cents: row.try_get("paid_cents")?,
        status,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn row_to_job_card(row: &PgRow) -> Result<JobCard, LedgerError> {
    let status_str: String = row.try_get("status")?;
    let status = JobCardStatus::parse(&status_str)
        .ok_or_else(|| LedgerError::backend(format!("unknown job card status: {status_str}")))?;

    Ok(JobCard {
        id: row.try_get("id")?,
        owner: OwnerId(row.try_get("owner_id")?),
        number: SequenceNumber(row.try_get("number")?),
        customer: row.try_get("customer_id")?,
        item: row.try_get("item")?,
        problem: row.try_get("problem")?,
        status,
        estimated_cents: row.try_get("estimated_cents")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn create_invoice(
        &self,
        owner: OwnerId,
        draft: NewInvoice,
    ) -> Result<Invoice, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let number = Self::allocate_next(&mut *tx, owner, SequenceKind::Invoice).await?;
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, owner_id, number, customer_id, job_card_id,
                subtotal_cents, tax_cents, discount_cents, total_cents, paid_cents,
                status, notes, created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10, $11, $12, $12, NULL)
            "#,
        )
        .bind(id)
        .bind(owner.0)
        .bind(number.0)
        .bind(draft.customer)
        .bind(draft.job_card)
        .bind(draft.subtotal_cents)
        .bind(draft.tax_cents)
        .bind(draft.discount_cents)
        .bind(draft.total_cents)
        .bind(InvoiceStatus::Draft.as_str())
        .bind(&draft.notes)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|err| map_insert_error(err, owner, SequenceKind::Invoice, number))?;

        tx.commit()
            .await
            .map_err(|err| map_insert_error(err, owner, SequenceKind::Invoice, number))?;

        debug!(owner = %owner, number = %number, "invoice created");

        Ok(Invoice {
            id,
            owner,
            number,
            customer: draft.customer,
            job_card: draft.job_card,
            subtotal_cents: draft.subtotal_cents,
            tax_cents: draft.tax_cents,
            discount_cents: draft.discount_cents,
            total_cents: draft.total_cents,
            paid_cents: 0,
            status: InvoiceStatus::Draft,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    async fn invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError> {
        let row = sqlx::query("SELECT * FROM invoices WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_invoice(&row),
            None => Err(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            }),
        }
    }

    async fn update_invoice_status(
        &self,
        owner: OwnerId,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner.0)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_invoice(&row),
            None => Err(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            }),
        }
    }

    async fn record_payment(
        &self,
        owner: OwnerId,
        id: Uuid,
        amount_cents: i64,
    ) -> Result<Invoice, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE invoices
            SET paid_cents = paid_cents + $3,
                status = CASE
                    WHEN paid_cents + $3 >= total_cents THEN 'paid'
                    WHEN paid_cents + $3 > 0 THEN 'partially_paid'
                    ELSE 'sent'
                END,
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner.0)
        .bind(amount_cents)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_invoice(&row),
            None => Err(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            }),
        }
    }

    async fn delete_invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE invoices
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_invoice(&row),
            None => Err(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            }),
        }
    }

    async fn restore_invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE invoices
            SET deleted_at = NULL, updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND deleted_at IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_invoice(&row),
            None => Err(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            }),
        }
    }

    async fn create_job_card(
        &self,
        owner: OwnerId,
        draft: NewJobCard,
    ) -> Result<JobCard, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let number = Self::allocate_next(&mut *tx, owner, SequenceKind::JobCard).await?;
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO job_cards (
                id, owner_id, number, customer_id, item, problem,
                status, estimated_cents, created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, NULL)
            "#,
        )
        .bind(id)
        .bind(owner.0)
        .bind(number.0)
        .bind(draft.customer)
        .bind(&draft.item)
        .bind(&draft.problem)
        .bind(JobCardStatus::Pending.as_str())
        .bind(draft.estimated_cents)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|err| map_insert_error(err, owner, SequenceKind::JobCard, number))?;

        tx.commit()
            .await
            .map_err(|err| map_insert_error(err, owner, SequenceKind::JobCard, number))?;

        debug!(owner = %owner, number = %number, "job card created");

        Ok(JobCard {
            id,
            owner,
            number,
            customer: draft.customer,
            item: draft.item,
            problem: draft.problem,
            status: JobCardStatus::Pending,
            estimated_cents: draft.estimated_cents,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    async fn job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError> {
        let row = sqlx::query("SELECT * FROM job_cards WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_job_card(&row),
            None => Err(LedgerError::NotFound {
                owner,
                kind: SequenceKind::JobCard,
                id,
            }),
        }
    }

    async fn update_job_card_status(
        &self,
        owner: OwnerId,
        id: Uuid,
        status: JobCardStatus,
    ) -> Result<JobCard, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE job_cards
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner.0)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_job_card(&row),
            None => Err(LedgerError::NotFound {
                owner,
                kind: SequenceKind::JobCard,
                id,
            }),
        }
    }

    async fn delete_job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE job_cards
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_job_card(&row),
            None => Err(LedgerError::NotFound {
                owner,
                kind: SequenceKind::JobCard,
                id,
            }),
        }
    }

    async fn restore_job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE job_cards
            SET deleted_at = NULL, updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND deleted_at IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_job_card(&row),
            None => Err(LedgerError::NotFound {
                owner,
                kind: SequenceKind::JobCard,
                id,
            }),
        }
    }

    async fn period_stats(
        &self,
        owner: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PeriodStats, LedgerError> {
        let invoice_row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(paid_cents), 0)::bigint AS revenue,
                   COUNT(*)::bigint AS invoice_count,
                   COALESCE(SUM(total_cents - paid_cents), 0)::bigint AS outstanding
            FROM invoices
            WHERE owner_id = $1
              AND deleted_at IS NULL
              AND created_at >= $2
              AND created_at < $3
            "#,
        )
        .bind(owner.0)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        let job_card_row = sqlx::query(
            r#"
            SELECT COUNT(*)::bigint AS job_card_count
            FROM job_cards
            WHERE owner_id = $1
              AND deleted_at IS NULL
              AND created_at >= $2
              AND created_at < $3
            "#,
        )
        .bind(owner.0)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        let invoice_count: i64 = invoice_row.try_get("invoice_count")?;
        let job_card_count: i64 = job_card_row.try_get("job_card_count")?;

        Ok(PeriodStats {
            revenue_cents: invoice_row.try_get("revenue")?,
            invoice_count: invoice_count as u64,
            job_card_count: job_card_count as u64,
            outstanding_cents: invoice_row.try_get("outstanding")?,
        })
    }

    async fn daily_revenue(
        &self,
        owner: OwnerId,
        days: u32,
    ) -> Result<Vec<DailyRevenuePoint>, LedgerError> {
        let now = Utc::now();
        let from = (now - ChronoDuration::days(i64::from(days) - 1))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);

        let rows = sqlx::query(
            r#"
            SELECT DATE(created_at) AS day,
                   COALESCE(SUM(paid_cents), 0)::bigint AS revenue
            FROM invoices
            WHERE owner_id = $1
              AND deleted_at IS NULL
              AND created_at >= $2
            GROUP BY day
            "#,
        )
        .bind(owner.0)
        .bind(from)
        .fetch_all(&self.pool)
        .await?;

        let mut by_day: HashMap<NaiveDate, i64> = HashMap::with_capacity(rows.len());
        for row in rows {
            let day: NaiveDate = row.try_get("day")?;
            let revenue: i64 = row.try_get("revenue")?;
            by_day.insert(day, revenue);
        }

        // Dense series, oldest first, with zero-filled gaps.
        let mut series = Vec::with_capacity(days as usize);
        for offset in (0..i64::from(days)).rev() {
            let date = (now - ChronoDuration::days(offset)).date_naive();
            series.push(DailyRevenuePoint {
                date,
                revenue_cents: by_day.get(&date).copied().unwrap_or(0),
            });
        }
        Ok(series)
    }
}
