use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use tally::{
    DailyRevenuePoint, Invoice, InvoiceStatus, JobCard, JobCardStatus, LedgerError, LedgerStore,
    NewInvoice, NewJobCard, OwnerId, PeriodStats, SequenceKind, SequenceNumber,
};

/// In-memory implementation of the ledger store.
///
/// Counter increment and row insert happen under one mutex guard, so
/// this backend honors the same atomicity contract as the counter-row
/// lock in the PostgreSQL backend. All state is process-local; clones
/// share it.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    inner: Arc<Mutex<LedgerState>>,
}

#[derive(Default)]
struct LedgerState {
    counters: HashMap<(OwnerId, SequenceKind), i64>,
    invoices: HashMap<Uuid, Invoice>,
    job_cards: HashMap<Uuid, JobCard>,
}

impl LedgerState {
    fn allocate(&mut self, owner: OwnerId, kind: SequenceKind) -> SequenceNumber {
        let value = self.counters.entry((owner, kind)).or_insert(0);
        *value += 1;
        SequenceNumber(*value)
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter value for an `(owner, kind)` pair, for asserting
    /// that deletes never roll a counter back.
    pub fn counter(&self, owner: OwnerId, kind: SequenceKind) -> i64 {
        let state = self.inner.lock();
        state.counters.get(&(owner, kind)).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn create_invoice(
        &self,
        owner: OwnerId,
        draft: NewInvoice,
    ) -> Result<Invoice, LedgerError> {
        let mut state = self.inner.lock();
        let number = state.allocate(owner, SequenceKind::Invoice);
        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::now_v7(),
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
        };
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError> {
        let state = self.inner.lock();
        state
            .invoices
            .get(&id)
            .filter(|inv| inv.owner == owner)
            .cloned()
            .ok_or(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            })
    }

    async fn update_invoice_status(
        &self,
        owner: OwnerId,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, LedgerError> {
        let mut state = self.inner.lock();
        let invoice = state
            .invoices
            .get_mut(&id)
            .filter(|inv| inv.owner == owner && inv.deleted_at.is_none())
            .ok_or(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            })?;
        invoice.status = status;
        invoice.updated_at = Utc::now();
        Ok(invoice.clone())
    }

    async fn record_payment(
        &self,
        owner: OwnerId,
        id: Uuid,
        amount_cents: i64,
    ) -> Result<Invoice, LedgerError> {
        let mut state = self.inner.lock();
        let invoice = state
            .invoices
            .get_mut(&id)
            .filter(|inv| inv.owner == owner && inv.deleted_at.is_none())
            .ok_or(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            })?;
        invoice.paid_cents += amount_cents;
        invoice.status = InvoiceStatus::for_payment(invoice.total_cents, invoice.paid_cents);
        invoice.updated_at = Utc::now();
        Ok(invoice.clone())
    }

    async fn delete_invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError> {
        let mut state = self.inner.lock();
        let invoice = state
            .invoices
            .get_mut(&id)
            .filter(|inv| inv.owner == owner && inv.deleted_at.is_none())
            .ok_or(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            })?;
        invoice.deleted_at = Some(Utc::now());
        invoice.updated_at = Utc::now();
        Ok(invoice.clone())
    }

    async fn restore_invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError> {
        let mut state = self.inner.lock();
        let invoice = state
            .invoices
            .get_mut(&id)
            .filter(|inv| inv.owner == owner && inv.deleted_at.is_some())
            .ok_or(LedgerError::NotFound {
                owner,
                kind: SequenceKind::Invoice,
                id,
            })?;
        invoice.deleted_at = None;
        invoice.updated_at = Utc::now();
        Ok(invoice.clone())
    }

    async fn create_job_card(
        &self,
        owner: OwnerId,
        draft: NewJobCard,
    ) -> Result<JobCard, LedgerError> {
        let mut state = self.inner.lock();
        let number = state.allocate(owner, SequenceKind::JobCard);
        let now = Utc::now();
        let card = JobCard {
            id: Uuid::now_v7(),
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
        };
        state.job_cards.insert(card.id, card.clone());
        Ok(card)
    }

    async fn job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError> {
        let state = self.inner.lock();
        state
            .job_cards
            .get(&id)
            .filter(|card| card.owner == owner)
            .cloned()
            .ok_or(LedgerError::NotFound {
                owner,
                kind: SequenceKind::JobCard,
                id,
            })
    }

    async fn update_job_card_status(
        &self,
        owner: OwnerId,
        id: Uuid,
        status: JobCardStatus,
    ) -> Result<JobCard, LedgerError> {
        let mut state = self.inner.lock();
        let card = state
            .job_cards
            .get_mut(&id)
            .filter(|card| card.owner == owner && card.deleted_at.is_none())
            .ok_or(LedgerError::NotFound {
                owner,
                kind: SequenceKind::JobCard,
                id,
            })?;
        card.status = status;
        card.updated_at = Utc::now();
        Ok(card.clone())
    }

    async fn delete_job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError> {
        let mut state = self.inner.lock();
        let card = state
            .job_cards
            .get_mut(&id)
            .filter(|card| card.owner == owner && card.deleted_at.is_none())
            .ok_or(LedgerError::NotFound {
                owner,
                kind: SequenceKind::JobCard,
                id,
            })?;
        card.deleted_at = Some(Utc::now());
        card.updated_at = Utc::now();
        Ok(card.clone())
    }

    async fn restore_job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError> {
        let mut state = self.inner.lock();
        let card = state
            .job_cards
            .get_mut(&id)
            .filter(|card| card.owner == owner && card.deleted_at.is_some())
            .ok_or(LedgerError::NotFound {
                owner,
                kind: SequenceKind::JobCard,
                id,
            })?;
        card.deleted_at = None;
        card.updated_at = Utc::now();
        Ok(card.clone())
    }

    async fn period_stats(
        &self,
        owner: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PeriodStats, LedgerError> {
        let state = self.inner.lock();

        let mut stats = PeriodStats::default();
        for invoice in state.invoices.values() {
            if invoice.owner != owner
                || invoice.deleted_at.is_some()
                || invoice.created_at < from
                || invoice.created_at >= to
            {
                continue;
            }
            stats.revenue_cents += invoice.paid_cents;
            stats.outstanding_cents += invoice.balance_cents();
            stats.invoice_count += 1;
        }
        stats.job_card_count = state
            .job_cards
            .values()
            .filter(|card| {
                card.owner == owner
                    && card.deleted_at.is_none()
                    && card.created_at >= from
                    && card.created_at < to
            })
            .count() as u64;

        Ok(stats)
    }

    async fn daily_revenue(
        &self,
        owner: OwnerId,
        days: u32,
    ) -> Result<Vec<DailyRevenuePoint>, LedgerError> {
        let now = Utc::now();
        let state = self.inner.lock();

        let mut by_day: HashMap<NaiveDate, i64> = HashMap::new();
        for invoice in state.invoices.values() {
            if invoice.owner != owner || invoice.deleted_at.is_some() {
                continue;
            }
            *by_day.entry(invoice.created_at.date_naive()).or_insert(0) += invoice.paid_cents;
        }

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
