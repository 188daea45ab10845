use tracing::{debug, Instrument};

use crate::cache::DashboardCache;
use crate::entity::EntityChange;
use crate::telemetry;

/// Lifecycle hook tying entity mutations to cache invalidation.
///
/// Must be invoked synchronously after each successful create, update,
/// delete, or restore, before control returns to the caller. After it
/// returns, the next read of any of the owner's aggregates recomputes.
#[derive(Clone, Debug)]
pub struct LedgerObserver {
    cache: DashboardCache,
}

impl LedgerObserver {
    pub fn new(cache: DashboardCache) -> Self {
        Self { cache }
    }

    /// Handle a lifecycle transition.
    ///
    /// Never fails: invalidation is best-effort and must not abort the
    /// mutation that triggered it.
    pub async fn entity_changed(&self, change: &EntityChange) {
        debug!(
            owner = %change.owner,
            entity = %change.entity.kind,
            action = ?change.action,
            "entity changed; invalidating cached aggregates"
        );
        let span = telemetry::invalidation_span(change.owner.to_string());
        self.cache.invalidate(change.owner).instrument(span).await;
    }
}
