//! Helpers for integration tests against a real Postgres server.
//!
//! - [`database`] creates a throwaway database per test from the `TESTS_DATABASE_*`
//!   environment variables and drops it again afterwards.
//! - [`table`] creates archive tables and fills them with rows.
pub mod database;
pub mod table;
