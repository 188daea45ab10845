//! Tracing and telemetry instrumentation for tally.
//!
//! Helper functions for creating tracing spans and recording metrics
//! around sequence allocation and aggregate caching. All functions work
//! both with and without the `metrics` feature flag.

use tracing::{info_span, Span};

/// Create a tracing span for a sequence allocation.
///
/// The span includes the owner and sequence kind as fields.
#[must_use]
pub fn allocation_span(owner: impl AsRef<str>, kind: impl AsRef<str>) -> Span {
    info_span!(
        "tally.allocate",
        owner = %owner.as_ref(),
        kind = %kind.as_ref(),
    )
}

/// Create a tracing span for an owner-wide cache invalidation.
#[must_use]
pub fn invalidation_span(owner: impl AsRef<str>) -> Span {
    info_span!(
        "tally.invalidate",
        owner = %owner.as_ref(),
    )
}

/// Create a tracing span for computing an aggregate on a cache miss.
#[must_use]
pub fn aggregate_compute_span(owner: impl AsRef<str>, aggregate: impl AsRef<str>) -> Span {
    info_span!(
        "tally.compute",
        owner = %owner.as_ref(),
        aggregate = %aggregate.as_ref(),
    )
}

/// Record a successful sequence allocation.
pub fn record_allocation(kind: &str, duration_secs: f64) {
    tracing::debug!(kind = %kind, duration_secs = duration_secs, "sequence number allocated");

    #[cfg(feature = "metrics")]
    crate::metrics::record_allocation(kind, duration_secs);
}

/// Record a commit-time number conflict.
///
/// A conflict means some writer bypassed the allocation lock, so this
/// also logs at warn level.
pub fn record_number_conflict(kind: &str) {
    tracing::warn!(kind = %kind, "sequence number conflict at commit");

    #[cfg(feature = "metrics")]
    crate::metrics::record_number_conflict(kind);
}

/// Record an aggregate served from cache.
pub fn record_cache_hit(aggregate: &str) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_cache_hit(aggregate);
    let _ = aggregate;
}

/// Record an aggregate that had to be computed.
pub fn record_cache_miss(aggregate: &str) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_cache_miss(aggregate);
    let _ = aggregate;
}

/// Record one aggregate key dropped by an invalidation.
pub fn record_cache_invalidation(aggregate: &str) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_cache_invalidation(aggregate);
    let _ = aggregate;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let span = allocation_span("42", "invoice");
        assert_eq!(span.metadata().unwrap().name(), "tally.allocate");
    }

    #[test]
    fn test_invalidation_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let span = invalidation_span("42");
        assert_eq!(span.metadata().unwrap().name(), "tally.invalidate");
    }

    #[test]
    fn test_aggregate_compute_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let span = aggregate_compute_span("42", "dashboard_summary");
        assert_eq!(span.metadata().unwrap().name(), "tally.compute");
    }

    #[test]
    fn test_record_helpers_do_not_panic() {
        record_allocation("invoice", 0.002);
        record_number_conflict("job_card");
        record_cache_hit("dashboard_summary");
        record_cache_miss("dashboard_summary");
        record_cache_invalidation("daily_revenue_series");
    }
}
