//! tipcast-storage: storage backends for Tipcast.
//!
//! Backends:
//! - [`memory`]: in-memory, no persistence (dev and testing)
//! - [`sqlite`]: SQLite via `sqlx`, single-file persistence

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
