//! Core types and traits for the Snip URL shortener.
//!
//! This crate provides the entity model, the storage error taxonomy and the
//! [`Storage`] capability set shared by every backend and by the
//! application layer.

pub mod error;
pub mod model;
pub mod storage;

pub use error::{ErrorKind, StorageError};
pub use model::{BatchRequestRecord, BatchResponseRecord, ShortenedUrl, UrlId};
pub use storage::Storage;
