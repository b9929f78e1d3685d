use crate::error::{DeleterError, Result};
use crate::settings::DeleterSettings;
use crate::worker::Coalescer;
use snip_core::{Storage, UrlId};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Producer side of the deletion pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeleteQueue {
    tx: mpsc::Sender<UrlId>,
}

impl DeleteQueue {
    /// Queues an id for tombstoning without waiting.
    ///
    /// Fails with [`DeleterError::QueueFull`] when the worker is behind and
    /// with [`DeleterError::Closed`] once shutdown has started.
    pub fn enqueue(&self, id: UrlId) -> Result<()> {
        self.tx.try_send(id).map_err(|err| match err {
            TrySendError::Full(_) => DeleterError::QueueFull,
            TrySendError::Closed(_) => DeleterError::Closed,
        })
    }

    /// Queues every id in `ids` or none of them.
    ///
    /// Capacity for the whole slice is reserved up front, so a
    /// [`DeleterError::QueueFull`] leaves the queue untouched.
    pub fn enqueue_many(&self, ids: &[UrlId]) -> Result<()> {
        let permits = self.tx.try_reserve_many(ids.len()).map_err(|err| match err {
            TrySendError::Full(_) => DeleterError::QueueFull,
            TrySendError::Closed(_) => DeleterError::Closed,
        })?;

        for (permit, id) in permits.zip(ids) {
            permit.send(*id);
        }
        Ok(())
    }
}

/// What the worker managed to persist over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Ids passed to a successful batch delete.
    pub flushed: usize,
    /// Ids still pending when the final flush failed.
    pub dropped: usize,
}

/// Owner side of the deletion pipeline.
#[derive(Debug)]
pub struct DeleterHandle {
    cancel: CancellationToken,
    task: JoinHandle<ShutdownReport>,
}

impl DeleterHandle {
    /// Stops the worker, drains ids that were already queued and attempts
    /// one last flush.
    pub async fn shutdown(self) -> Result<ShutdownReport> {
        self.cancel.cancel();
        Ok(self.task.await?)
    }
}

/// Starts the background worker on the current tokio runtime.
pub fn spawn(storage: Arc<dyn Storage>, settings: DeleterSettings) -> (DeleteQueue, DeleterHandle) {
    let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
    let cancel = CancellationToken::new();

    let coalescer = Coalescer::new(storage, &settings);
    let task = tokio::spawn(coalescer.run(rx, cancel.clone()));

    (DeleteQueue { tx }, DeleterHandle { cancel, task })
}
