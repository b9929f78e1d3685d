use crate::queue::ShutdownReport;
use crate::settings::DeleterSettings;
use snip_core::{Storage, UrlId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Single owner of the pending buffer.
///
/// Ids are flushed when the buffer reaches `batch_size` or when the window
/// timer fires with a non-empty buffer. The buffer is cleared only after a
/// successful flush, so a failed batch is retried by the next trigger.
/// Deleting an already tombstoned id is a no-op, which makes retries safe.
pub(crate) struct Coalescer {
    storage: Arc<dyn Storage>,
    batch_size: usize,
    window: Duration,
    buffer: Vec<UrlId>,
    flushed: usize,
}

impl Coalescer {
    pub(crate) fn new(storage: Arc<dyn Storage>, settings: &DeleterSettings) -> Self {
        let batch_size = settings.batch_size.max(1);
        Self {
            storage,
            batch_size,
            window: settings.window,
            buffer: Vec::with_capacity(batch_size),
            flushed: 0,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::Receiver<UrlId>,
        cancel: CancellationToken,
    ) -> ShutdownReport {
        let timer = tokio::time::sleep(self.window);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                received = rx.recv() => {
                    let Some(id) = received else {
                        debug!("all delete queue senders dropped");
                        break;
                    };
                    self.buffer.push(id);
                    if self.buffer.len() >= self.batch_size && self.flush().await {
                        timer.as_mut().reset(Instant::now() + self.window);
                    }
                }

                () = &mut timer => {
                    if !self.buffer.is_empty() {
                        self.flush().await;
                    }
                    timer.as_mut().reset(Instant::now() + self.window);
                }
            }
        }

        rx.close();
        while let Some(id) = rx.recv().await {
            self.buffer.push(id);
        }

        let dropped = if self.buffer.is_empty() || self.flush().await {
            0
        } else {
            warn!(
                dropped = self.buffer.len(),
                "final delete flush failed, pending ids were not tombstoned"
            );
            self.buffer.len()
        };

        info!(flushed = self.flushed, dropped, "delete worker stopped");
        ShutdownReport {
            flushed: self.flushed,
            dropped,
        }
    }

    /// Returns whether the buffer was persisted and cleared.
    async fn flush(&mut self) -> bool {
        self.buffer.sort_unstable();
        self.buffer.dedup();

        match self.storage.delete_by_id_multi(&self.buffer).await {
            Ok(()) => {
                debug!(count = self.buffer.len(), "flushed delete batch");
                self.flushed += self.buffer.len();
                self.buffer.clear();
                true
            }
            Err(err) => {
                warn!(
                    count = self.buffer.len(),
                    error = %err,
                    "delete batch failed, keeping ids for the next attempt"
                );
                false
            }
        }
    }
}
