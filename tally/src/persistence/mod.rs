//! PostgreSQL-backed ledger persistence.

mod postgres;

pub use postgres::PostgresLedger;
