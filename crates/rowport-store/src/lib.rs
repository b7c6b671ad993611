//! Record store adapters: in-memory and PostgreSQL.

pub mod memory;
pub mod postgres;

pub use memory::{MemorySnapshot, MemoryStore, StoredRow};
pub use postgres::{PostgresStore, map_sqlx_error};
