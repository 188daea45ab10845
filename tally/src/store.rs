use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{
    Invoice, InvoiceStatus, JobCard, JobCardStatus, NewInvoice, NewJobCard, OwnerId,
};
use crate::sequence::LedgerError;

/// Trait for ledger backends that persist numbered entities.
///
/// Implementors must allocate the sequence number and insert the new row
/// inside one atomic unit of work: on any failure nothing is persisted
/// and the number is released with the rollback. Every method takes the
/// owner explicitly; an implementation must never return or touch
/// another owner's rows.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create an invoice, allocating the owner's next invoice number.
    async fn create_invoice(
        &self,
        owner: OwnerId,
        draft: NewInvoice,
    ) -> Result<Invoice, LedgerError>;

    /// Fetch an invoice, including soft-deleted ones.
    async fn invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError>;

    async fn update_invoice_status(
        &self,
        owner: OwnerId,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, LedgerError>;

    /// Add a completed payment to an invoice and roll up its status.
    async fn record_payment(
        &self,
        owner: OwnerId,
        id: Uuid,
        amount_cents: i64,
    ) -> Result<Invoice, LedgerError>;

    /// Soft-delete an invoice. Its number is never reused.
    async fn delete_invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError>;

    async fn restore_invoice(&self, owner: OwnerId, id: Uuid) -> Result<Invoice, LedgerError>;

    /// Create a job card, allocating the owner's next job number.
    async fn create_job_card(
        &self,
        owner: OwnerId,
        draft: NewJobCard,
    ) -> Result<JobCard, LedgerError>;

    async fn job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError>;

    async fn update_job_card_status(
        &self,
        owner: OwnerId,
        id: Uuid,
        status: JobCardStatus,
    ) -> Result<JobCard, LedgerError>;

    async fn delete_job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError>;

    async fn restore_job_card(&self, owner: OwnerId, id: Uuid) -> Result<JobCard, LedgerError>;

    /// Aggregate invoice and job-card activity over `[from, to)`.
    async fn period_stats(
        &self,
        owner: OwnerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PeriodStats, LedgerError>;

    /// Revenue per calendar day over the trailing `days` days, oldest
    /// first, with zero-filled gaps.
    async fn daily_revenue(
        &self,
        owner: OwnerId,
        days: u32,
    ) -> Result<Vec<DailyRevenuePoint>, LedgerError>;
}

/// Owner-scoped activity totals over a date range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub revenue_cents: i64,
    pub invoice_count: u64,
    pub job_card_count: u64,
    pub outstanding_cents: i64,
}

/// One day of revenue in the trailing series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRevenuePoint {
    pub date: NaiveDate,
    pub revenue_cents: i64,
}

/// Direction of a period-over-period movement.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
}

/// Percent change from `previous` to `current`, one decimal place.
///
/// A zero baseline reports 100%, matching how the dashboard presents
/// growth from nothing.
pub fn percent_change(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return 100.0;
    }
    let raw = (current - previous) as f64 / previous as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

/// Movement direction; `inverse` flips polarity for metrics where lower
/// is better (outstanding balance).
pub fn trend(current: i64, previous: i64, inverse: bool) -> TrendDirection {
    if current == previous {
        return TrendDirection::Neutral;
    }
    let up = if inverse {
        current < previous
    } else {
        current > previous
    };
    if up {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    }
}

/// The dashboard headline: current period next to the prior one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub current: PeriodStats,
    pub prior: PeriodStats,
}

impl DashboardSummary {
    pub fn revenue_change(&self) -> f64 {
        percent_change(self.current.revenue_cents, self.prior.revenue_cents)
    }

    pub fn revenue_trend(&self) -> TrendDirection {
        trend(self.current.revenue_cents, self.prior.revenue_cents, false)
    }

    pub fn invoice_change(&self) -> f64 {
        percent_change(
            self.current.invoice_count as i64,
            self.prior.invoice_count as i64,
        )
    }

    pub fn outstanding_trend(&self) -> TrendDirection {
        trend(
            self.current.outstanding_cents,
            self.prior.outstanding_cents,
            true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_change_handles_zero_baseline() {
        assert_eq!(percent_change(5_000, 0), 100.0);
        assert_eq!(percent_change(0, 0), 100.0);
    }

    #[test]
    fn percent_change_rounds_to_one_decimal() {
        assert_eq!(percent_change(150, 100), 50.0);
        assert_eq!(percent_change(100, 300), -66.7);
    }

    #[test]
    fn trend_polarity() {
        assert_eq!(trend(10, 5, false), TrendDirection::Up);
        assert_eq!(trend(5, 10, false), TrendDirection::Down);
        assert_eq!(trend(5, 5, false), TrendDirection::Neutral);
        // Lower outstanding balance is an improvement.
        assert_eq!(trend(5, 10, true), TrendDirection::Up);
        assert_eq!(trend(10, 5, true), TrendDirection::Down);
    }
}
