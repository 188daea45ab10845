//! Prometheus metrics instrumentation for tally.
//!
//! All metrics are conditionally compiled behind the `metrics` feature
//! flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `tally_numbers_allocated_total` - Sequence numbers allocated
//! - `tally_number_conflicts_total` - Commit-time number conflicts
//! - `tally_cache_hits_total` - Aggregates served from cache
//! - `tally_cache_misses_total` - Aggregates computed on miss
//! - `tally_cache_invalidations_total` - Aggregate keys dropped
//!
//! ## Histograms
//! - `tally_allocation_duration_seconds` - Allocation latency
#![cfg(feature = "metrics")]

use prometheus::{exponential_buckets, CounterVec, HistogramVec, Opts, Registry};
use std::sync::LazyLock;

/// Global Prometheus registry for tally metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Counter for allocated sequence numbers.
///
/// Labels:
/// - `kind`: The sequence kind (invoice, job_card)
pub static NUMBERS_ALLOCATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "tally_numbers_allocated_total",
        "Total number of sequence numbers allocated",
    );
    CounterVec::new(opts, &["kind"])
        .expect("tally_numbers_allocated_total metric creation failed")
});

/// Counter for commit-time number conflicts.
///
/// Conflicts indicate a writer that bypassed the allocation lock.
///
/// Labels:
/// - `kind`: The sequence kind (invoice, job_card)
pub static NUMBER_CONFLICTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "tally_number_conflicts_total",
        "Total number of commit-time sequence number conflicts",
    );
    CounterVec::new(opts, &["kind"])
        .expect("tally_number_conflicts_total metric creation failed")
});

/// Counter for aggregates served from cache.
///
/// Labels:
/// - `aggregate`: The aggregate kind
pub static CACHE_HITS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "tally_cache_hits_total",
        "Total number of aggregates served from cache",
    );
    CounterVec::new(opts, &["aggregate"])
        .expect("tally_cache_hits_total metric creation failed")
});

/// Counter for aggregates computed on a cache miss.
///
/// Labels:
/// - `aggregate`: The aggregate kind
pub static CACHE_MISSES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "tally_cache_misses_total",
        "Total number of aggregates computed on cache miss",
    );
    CounterVec::new(opts, &["aggregate"])
        .expect("tally_cache_misses_total metric creation failed")
});

/// Counter for aggregate keys dropped by invalidations.
///
/// Labels:
/// - `aggregate`: The aggregate kind
pub static CACHE_INVALIDATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "tally_cache_invalidations_total",
        "Total number of aggregate cache keys dropped",
    );
    CounterVec::new(opts, &["aggregate"])
        .expect("tally_cache_invalidations_total metric creation failed")
});

/// Histogram for sequence allocation latency in seconds.
///
/// Labels:
/// - `kind`: The sequence kind (invoice, job_card)
pub static ALLOCATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.0005, 2.0, 12).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "tally_allocation_duration_seconds",
        "Sequence allocation latency in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["kind"])
        .expect("tally_allocation_duration_seconds metric creation failed")
});

/// Initialize all metrics by registering them with the global registry.
///
/// This function is idempotent - calling it multiple times is safe.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(NUMBERS_ALLOCATED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(NUMBER_CONFLICTS_TOTAL.clone()),
        Box::new(CACHE_HITS_TOTAL.clone()),
        Box::new(CACHE_MISSES_TOTAL.clone()),
        Box::new(CACHE_INVALIDATIONS_TOTAL.clone()),
        Box::new(ALLOCATION_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg.contains("Duplicate metrics collector registration attempted") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Helper to record a successful allocation with its latency.
pub fn record_allocation(kind: &str, duration_secs: f64) {
    NUMBERS_ALLOCATED_TOTAL.with_label_values(&[kind]).inc();
    ALLOCATION_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration_secs);
}

/// Helper to record a commit-time number conflict.
pub fn record_number_conflict(kind: &str) {
    NUMBER_CONFLICTS_TOTAL.with_label_values(&[kind]).inc();
}

/// Helper to record an aggregate cache hit.
pub fn record_cache_hit(aggregate: &str) {
    CACHE_HITS_TOTAL.with_label_values(&[aggregate]).inc();
}

/// Helper to record an aggregate cache miss.
pub fn record_cache_miss(aggregate: &str) {
    CACHE_MISSES_TOTAL.with_label_values(&[aggregate]).inc();
}

/// Helper to record one dropped aggregate key.
pub fn record_cache_invalidation(aggregate: &str) {
    CACHE_INVALIDATIONS_TOTAL
        .with_label_values(&[aggregate])
        .inc();
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init_metrics().expect("metrics initialization should succeed");
    }

    #[test]
    fn test_record_allocation() {
        record_allocation("invoice", 0.002);
        record_allocation("job_card", 0.001);
    }

    #[test]
    fn test_record_cache_events() {
        record_cache_hit("dashboard_summary");
        record_cache_miss("dashboard_summary");
        record_cache_invalidation("daily_revenue_series");
        record_number_conflict("invoice");
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().expect("metrics initialization should succeed");

        record_allocation("invoice", 0.002);
        record_cache_hit("dashboard_summary");

        let output = gather_metrics().expect("gather should succeed");
        assert!(output.contains("tally_numbers_allocated_total"));
        assert!(output.contains("tally_cache_hits_total"));
    }
}
