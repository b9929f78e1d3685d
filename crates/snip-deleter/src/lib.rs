//! Asynchronous, batched tombstoning of short URLs.
//!
//! Request handlers hand ids to a [`DeleteQueue`] and return at once. A single
//! background task owns the pending buffer and calls
//! [`Storage::delete_by_id_multi`](snip_core::Storage::delete_by_id_multi)
//! when the buffer reaches the batch size or the window elapses.

pub mod error;
pub mod queue;
pub mod settings;
mod worker;

pub use error::{DeleterError, Result};
pub use queue::{spawn, DeleteQueue, DeleterHandle, ShutdownReport};
pub use settings::DeleterSettings;
