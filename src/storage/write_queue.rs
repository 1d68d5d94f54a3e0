// Ordered write queue
// A single writer task applies persistence writes strictly in submission order

use super::{KeyValueStore, StorageError, StorageResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum WriteOp {
    Set(String),
    Remove,
    /// Completes once every earlier write has been applied
    Barrier,
}

struct WriteRequest {
    key: String,
    op: WriteOp,
    reply: Option<oneshot::Sender<StorageResult<()>>>,
}

/// Handle to a writer task owning all writes for the keys submitted to it.
///
/// Cloning the handle shares the same writer, so ordering holds across clones.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<WriteRequest>,
}

/// Pending reply for a submitted write
pub type WriteTicket = oneshot::Receiver<StorageResult<()>>;

/// Counts mutations whose persistence tail is still running.
///
/// Not a lock: overlapping mutations proceed, the count only tells
/// callers that something is in flight.
#[derive(Clone, Default)]
pub struct UpdateTracker {
    in_flight: Arc<AtomicUsize>,
}

/// Marks one mutation as in flight until dropped
pub struct UpdateGuard {
    in_flight: Arc<AtomicUsize>,
}

impl UpdateTracker {
    pub fn begin(&self) -> UpdateGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        UpdateGuard {
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WriteQueue {
    /// Spawn the writer task. Must be called from within a Tokio runtime.
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteRequest>();

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = match request.op {
                    WriteOp::Set(value) => store.set(&request.key, &value).await,
                    WriteOp::Remove => store.remove(&request.key).await,
                    WriteOp::Barrier => Ok(()),
                };

                match request.reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(key = %request.key, error = %e, "Background write failed");
                        }
                    }
                }
            }

            debug!("Write queue drained and closed");
        });

        Self { tx }
    }

    fn submit(&self, key: &str, op: WriteOp) -> WriteTicket {
        let (reply, ticket) = oneshot::channel();
        let request = WriteRequest {
            key: key.to_string(),
            op,
            reply: Some(reply),
        };

        // A closed queue drops the request and with it the reply sender,
        // which the ticket observes as an error.
        let _ = self.tx.send(request);
        ticket
    }

    /// Enqueue a write and hand back its ticket without waiting
    pub fn enqueue_set(&self, key: &str, value: String) -> WriteTicket {
        self.submit(key, WriteOp::Set(value))
    }

    /// Store `value` under `key` once all earlier writes have landed
    pub async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        Self::wait(self.enqueue_set(key, value)).await
    }

    /// Enqueue a removal and hand back its ticket without waiting
    pub fn enqueue_remove(&self, key: &str) -> WriteTicket {
        self.submit(key, WriteOp::Remove)
    }

    /// Remove `key` once all earlier writes have landed
    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        Self::wait(self.enqueue_remove(key)).await
    }

    /// Enqueue a write whose failure is only logged.
    /// Used to re-persist state after a rollback.
    pub fn set_detached(&self, key: &str, value: String) {
        let request = WriteRequest {
            key: key.to_string(),
            op: WriteOp::Set(value),
            reply: None,
        };
        if self.tx.send(request).is_err() {
            warn!(key = %key, "Write queue closed, dropping background write");
        }
    }

    /// Wait until every write submitted before this call has been applied
    pub async fn flush(&self) -> StorageResult<()> {
        Self::wait(self.submit("", WriteOp::Barrier)).await
    }

    /// Resolve a ticket into the write's result
    pub async fn wait(ticket: WriteTicket) -> StorageResult<()> {
        ticket.await.map_err(|_| StorageError::QueueClosed)?
    }
}
