//! Postgres-backed implementation of [`sda_core::traits::FileStore`]: the
//! event-logged file store (C1).

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use pool::DatabasePool;
pub use queries::PostgresStore;
