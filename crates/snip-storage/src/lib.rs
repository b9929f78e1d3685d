//! Storage backends for the Snip URL shortener.
//!
//! Three interchangeable implementations of [`Storage`]:
//!
//! - [`MemoryStorage`]: process memory only, the reference semantics
//! - [`FileStorage`]: memory plus a JSON snapshot written at shutdown
//! - [`PostgresStorage`]: the `urls` table in PostgreSQL
//!
//! [`StorageConfig::open`] picks one from configuration.

pub mod config;
pub mod file;
pub mod memory;
pub mod postgres;

pub use config::{StorageBackend, StorageConfig};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use postgres::{PostgresSettings, PostgresStorage};
pub use snip_core::{Storage, StorageError};
