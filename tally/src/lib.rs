//! Tally - per-tenant document numbering and dashboard caching.
//!
//! The core of a small business-management backend: invoices and job
//! cards carry per-owner sequential numbers, and each owner's dashboard
//! aggregates are cached with TTLs and invalidated on every mutation.
//!
//! # Core Concepts
//!
//! - **Owner**: The tenant scoping all data. Every store method takes an
//!   [`OwnerId`] explicitly; no ambient scoping exists anywhere.
//!
//! - **Sequence allocation**: Each `(owner, kind)` pair has an atomic
//!   counter. [`PostgresLedger::allocate_next`] increments it inside the
//!   caller's transaction so the number is spent only when the insert
//!   commits. Numbers are unique, strictly increasing, and never reused.
//!
//! - **Aggregate cache**: [`DashboardCache`] is an explicit handle over a
//!   [`CacheStore`] backend. Reads go through `get_or_compute`; every
//!   mutation fires [`LedgerObserver`], which drops all of the owner's
//!   cached aggregates before control returns.
//!
//! - **Ledger**: The [`Ledger`] facade ties a [`LedgerStore`] backend to
//!   the observer so callers cannot persist a change without
//!   invalidating.
//!
//! # Feature Flags
//!
//! - `postgres` - PostgreSQL persistence via sqlx
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tally::{DashboardCache, Ledger, NewInvoice, OwnerId};
//!
//! let store = Arc::new(/* a LedgerStore backend */);
//! let ledger = Ledger::new(store, DashboardCache::in_memory());
//!
//! let invoice = ledger
//!     .create_invoice(OwnerId(1), NewInvoice { total_cents: 12_500, ..Default::default() })
//!     .await?;
//! assert_eq!(invoice.number.to_string(), "00001");
//! ```

/// Aggregate caching with TTLs and owner-wide invalidation.
///
/// The `cache` module provides the [`CacheStore`] trait for cache
/// backends, the [`InMemoryCacheStore`] implementation, the
/// [`AggregateKind`] key set, and [`DashboardCache`], the handle
/// combining `get_or_compute` reads with best-effort invalidation.
pub mod cache;

/// Configuration structures for persistence and cache settings.
///
/// The `config` module defines [`PersistenceConfig`] and [`CacheConfig`]
/// for tuning pool sizes and per-aggregate TTLs.
pub mod config;

/// Owners, invoices, job cards, and lifecycle events.
///
/// The `entity` module defines the domain records ([`Invoice`],
/// [`JobCard`]) with their status enums, the [`OwnerId`] tenant key, and
/// the [`EntityChange`] event emitted after each mutation.
pub mod entity;

/// The ledger facade tying stores to cache invalidation.
pub mod ledger;

/// Lifecycle observer dropping cached aggregates on mutation.
pub mod observer;

/// Sequence kinds, numbers, and the ledger error taxonomy.
///
/// The `sequence` module defines [`SequenceKind`], [`SequenceNumber`],
/// and [`LedgerError`] with its retryable classification.
pub mod sequence;

/// The store trait and aggregate value types.
///
/// The `store` module defines the [`LedgerStore`] trait implemented by
/// persistence backends, plus [`PeriodStats`], [`DashboardSummary`], and
/// the trend helpers the dashboard renders from.
pub mod store;

#[cfg(feature = "postgres")]
/// PostgreSQL persistence implementation.
///
/// The `persistence` module provides the sqlx-backed [`PostgresLedger`]
/// when the `postgres` feature is enabled.
pub mod persistence;

/// Tracing spans and telemetry helpers.
pub mod telemetry;

#[cfg(feature = "metrics")]
/// Prometheus metrics, enabled by the `metrics` feature.
pub mod metrics;

pub use cache::*;
pub use config::*;
pub use entity::*;
pub use ledger::*;
pub use observer::*;
#[cfg(feature = "postgres")]
pub use persistence::*;
pub use sequence::*;
pub use store::*;
