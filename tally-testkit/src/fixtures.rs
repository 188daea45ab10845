use tally::{NewInvoice, NewJobCard, OwnerId};

/// Owner fixture; tests read better with named tenants.
pub fn owner(id: i64) -> OwnerId {
    OwnerId(id)
}

/// Invoice draft with the given total, paid in full by `record_payment`
/// of the same amount.
pub fn invoice_draft(total_cents: i64) -> NewInvoice {
    NewInvoice {
        subtotal_cents: total_cents,
        total_cents,
        ..Default::default()
    }
}

/// Minimal job card draft.
pub fn job_card_draft(item: &str) -> NewJobCard {
    NewJobCard {
        item: item.to_string(),
        estimated_cents: 5_000,
        ..Default::default()
    }
}
