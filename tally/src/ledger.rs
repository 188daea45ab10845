use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{AggregateKind, DashboardCache};
use crate::entity::{
    ChangeAction, EntityChange, EntityRef, Invoice, InvoiceStatus, JobCard, JobCardStatus,
    NewInvoice, NewJobCard, OwnerId,
};
use crate::observer::LedgerObserver;
use crate::sequence::{LedgerError, SequenceKind};
use crate::store::{DailyRevenuePoint, DashboardSummary, LedgerStore, PeriodStats};

/// Length of the trailing revenue series served to the dashboard.
const DAILY_SERIES_DAYS: u32 = 30;

/// Facade tying a ledger store to its cache invalidation hooks.
///
/// Every mutation persists through the store and then fires the
/// lifecycle observer before returning, so callers can never forget the
/// invalidation half of the contract. Dashboard reads go through the
/// aggregate cache.
pub struct Ledger<S> {
    store: Arc<S>,
    cache: DashboardCache,
    observer: LedgerObserver,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, cache: DashboardCache) -> Self {
        let observer = LedgerObserver::new(cache.clone());
        Self {
            store,
            cache,
            observer,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &DashboardCache {
        &self.cache
    }

    async fn changed(&self, owner: OwnerId, kind: SequenceKind, id: Uuid, action: ChangeAction) {
        let change = EntityChange::new(owner, EntityRef { kind, id }, action);
        self.observer.entity_changed(&change).await;
    }

    pub async fn create_invoice(
        &self,
        owner: OwnerId,
        draft: NewInvoice,
    ) -> Result<Invoice, LedgerError> {
        let invoice = self.store.create_invoice(owner, draft).await?;
        self.changed(owner, SequenceKind::Invoice, invoice.id, ChangeAction::Created)
            .await;
        Ok(invoice)
    }

    pub async fn invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError> {
        self.store.invoice(owner, id).await
    }

    pub async fn update_invoice_status(
        &self,
        owner: OwnerId,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, LedgerError> {
        let invoice = self.store.update_invoice_status(owner, id, status).await?;
        self.changed(owner, SequenceKind::Invoice, id, ChangeAction::Updated)
            .await;
        Ok(invoice)
    }

    pub async fn record_payment(
        &self,
        owner: OwnerId,
        id: Uuid,
        amount_cents: i64,
    ) -> Result<Invoice, LedgerError> {
        let invoice = self.store.record_payment(owner, id, amount_cents).await?;
        self.changed(owner, SequenceKind::Invoice, id, ChangeAction::Updated)
            .await;
        Ok(invoice)
    }

    pub async fn delete_invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError> {
        let invoice = self.store.delete_invoice(owner, id).await?;
        self.changed(owner, SequenceKind::Invoice, id, ChangeAction::Deleted)
            .await;
        Ok(invoice)
    }

    pub async fn restore_invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError> {
        let invoice = self.store.restore_invoice(owner, id).await?;
        self.changed(owner, SequenceKind::Invoice, id, ChangeAction::Restored)
            .await;
        Ok(invoice)
    }

    pub async fn create_job_card(
        &self,
        owner: OwnerId,
        draft: NewJobCard,
    ) -> Result<JobCard, LedgerError> {
        let card = self.store.create_job_card(owner, draft).await?;
        self.changed(owner, SequenceKind::JobCard, card.id, ChangeAction::Created)
            .await;
        Ok(card)
    }

    pub async fn job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError> {
        self.store.job_card(owner, id).await
    }

    pub async fn update_job_card_status(
        &self,
        owner: OwnerId,
        id: Uuid,
        status: JobCardStatus,
    ) -> Result<JobCard, LedgerError> {
        let card = self.store.update_job_card_status(owner, id, status).await?;
        self.changed(owner, SequenceKind::JobCard, id, ChangeAction::Updated)
            .await;
        Ok(card)
    }

    pub async fn delete_job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError> {
        let card = self.store.delete_job_card(owner, id).await?;
        self.changed(owner, SequenceKind::JobCard, id, ChangeAction::Deleted)
            .await;
        Ok(card)
    }

    pub async fn restore_job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError> {
        let card = self.store.restore_job_card(owner, id).await?;
        self.changed(owner, SequenceKind::JobCard, id, ChangeAction::Restored)
            .await;
        Ok(card)
    }

    /// Stats for the running calendar month, cached.
    pub async fn current_period_stats(&self, owner: OwnerId) -> Result<PeriodStats, LedgerError> {
        let now = Utc::now();
        self.cache
            .get_or_compute(owner, AggregateKind::CurrentPeriodStats, || async move {
                self.store.period_stats(owner, month_start(now), now).await
            })
            .await
    }

    /// Stats for the previous calendar month, cached.
    pub async fn prior_period_stats(&self, owner: OwnerId) -> Result<PeriodStats, LedgerError> {
        let now = Utc::now();
        self.cache
            .get_or_compute(owner, AggregateKind::PriorPeriodStats, || async move {
                self.store
                    .period_stats(owner, prior_month_start(now), month_start(now))
                    .await
            })
            .await
    }

    /// The dashboard headline, cached, composed from the cached period
    /// stats so each layer refreshes on its own TTL.
    pub async fn dashboard_summary(&self, owner: OwnerId) -> Result<DashboardSummary, LedgerError> {
        self.cache
            .get_or_compute(owner, AggregateKind::DashboardSummary, || async move {
                let current = self.current_period_stats(owner).await?;
                let prior = self.prior_period_stats(owner).await?;
                Ok(DashboardSummary { current, prior })
            })
            .await
    }

    /// Trailing 30-day revenue series, cached.
    pub async fn daily_revenue(
        &self,
        owner: OwnerId,
    ) -> Result<Vec<DailyRevenuePoint>, LedgerError> {
        self.cache
            .get_or_compute(owner, AggregateKind::DailyRevenueSeries, || async move {
                self.store.daily_revenue(owner, DAILY_SERIES_DAYS).await
            })
            .await
    }
}

fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

fn prior_month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if at.month() == 1 {
        (at.year() - 1, 12)
    } else {
        (at.year(), at.month() - 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_boundaries() {
        let at = Utc.with_ymd_and_hms(2026, 3, 15, 12, 30, 0).single().unwrap();
        assert_eq!(
            month_start(at),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap()
        );
        assert_eq!(
            prior_month_start(at),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().unwrap()
        );
    }

    #[test]
    fn prior_month_wraps_the_year() {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).single().unwrap();
        assert_eq!(
            prior_month_start(at),
            Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).single().unwrap()
        );
    }
}
