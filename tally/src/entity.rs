use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::sequence::{SequenceKind, SequenceNumber};

/// Tenant identity that scopes every record, counter, and cache entry.
///
/// There is no cross-owner visibility anywhere in the crate: every store
/// method and every SQL predicate takes an `OwnerId` explicitly.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub i64);

impl OwnerId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OwnerId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Invoice lifecycle states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
    PartiallyPaid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::PartiallyPaid => "partially_paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(InvoiceStatus::Draft),
            "sent" => Some(InvoiceStatus::Sent),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            "partially_paid" => Some(InvoiceStatus::PartiallyPaid),
            _ => None,
        }
    }

    /// Status after a payment lands, given the invoice totals.
    pub fn for_payment(total_cents: i64, paid_cents: i64) -> Self {
        if paid_cents >= total_cents {
            InvoiceStatus::Paid
        } else if paid_cents > 0 {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::Sent
        }
    }
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job card lifecycle states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobCardStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl JobCardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobCardStatus::Pending => "pending",
            JobCardStatus::Processing => "processing",
            JobCardStatus::Completed => "completed",
            JobCardStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobCardStatus::Pending),
            "processing" => Some(JobCardStatus::Processing),
            "completed" => Some(JobCardStatus::Completed),
            "cancelled" => Some(JobCardStatus::Cancelled),
            _ => None,
        }
    }
}

impl Display for JobCardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A numbered invoice. Monetary amounts are integer cents.
///
/// The sequence number is assigned at creation and immutable afterwards;
/// it is never reallocated, even if the invoice is later deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub owner: OwnerId,
    pub number: SequenceNumber,
    pub customer: Option<Uuid>,
    pub job_card: Option<Uuid>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn balance_cents(&self) -> i64 {
        self.total_cents - self.paid_cents
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields supplied by the caller when creating an invoice.
///
/// Owner and number are deliberately absent: the owner is an explicit
/// argument to the create call and the number is allocated inside it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewInvoice {
    pub customer: Option<Uuid>,
    pub job_card: Option<Uuid>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub notes: Option<String>,
}

/// A numbered job card.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobCard {
    pub id: Uuid,
    pub owner: OwnerId,
    pub number: SequenceNumber,
    pub customer: Option<Uuid>,
    pub item: String,
    pub problem: Option<String>,
    pub status: JobCardStatus,
    pub estimated_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl JobCard {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields supplied by the caller when creating a job card.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewJobCard {
    pub customer: Option<Uuid>,
    pub item: String,
    pub problem: Option<String>,
    pub estimated_cents: i64,
}

/// Reference to a numbered entity, used in lifecycle events.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: SequenceKind,
    pub id: Uuid,
}

/// Lifecycle transitions that must drop the owner's cached aggregates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
    Restored,
}

/// Emitted after every successful mutation, before control returns to
/// the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityChange {
    pub owner: OwnerId,
    pub entity: EntityRef,
    pub action: ChangeAction,
    pub at: DateTime<Utc>,
}

impl EntityChange {
    pub fn new(owner: OwnerId, entity: EntityRef, action: ChangeAction) -> Self {
        Self {
            owner,
            entity,
            action,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_status_round_trips_through_strings() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
            InvoiceStatus::Cancelled,
            InvoiceStatus::PartiallyPaid,
        ] {
            assert_eq!(InvoiceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InvoiceStatus::parse("bogus"), None);
    }

    #[test]
    fn payment_status_rollup() {
        assert_eq!(
            InvoiceStatus::for_payment(10_000, 10_000),
            InvoiceStatus::Paid
        );
        assert_eq!(
            InvoiceStatus::for_payment(10_000, 12_000),
            InvoiceStatus::Paid
        );
        assert_eq!(
            InvoiceStatus::for_payment(10_000, 2_500),
            InvoiceStatus::PartiallyPaid
        );
        assert_eq!(InvoiceStatus::for_payment(10_000, 0), InvoiceStatus::Sent);
    }

    #[test]
    fn balance_is_total_minus_paid() {
        let invoice = Invoice {
            id: Uuid::now_v7(),
            owner: OwnerId(1),
            number: SequenceNumber(1),
            customer: None,
            job_card: None,
            subtotal_cents: 9_000,
            tax_cents: 1_000,
            discount_cents: 0,
            total_cents: 10_000,
            paid_cents: 4_000,
            status: InvoiceStatus::PartiallyPaid,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        assert_eq!(invoice.balance_cents(), 6_000);
    }
}
