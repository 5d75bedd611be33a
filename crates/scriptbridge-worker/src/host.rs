//! Host side of the worker channel.

use scriptbridge_core::PackageSource;
use scriptbridge_proto::{decode_frame, encode_frame, WorkerMessage, WorkerReply, WorkerRequest, WorkerResponse};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::WorkerError;
use crate::worker::{spawn_worker, WorkerChannel};

type Reply = Result<WorkerResponse, WorkerError>;

/// Requests awaiting a reply, keyed by correlation id.
#[derive(Default)]
struct Pending {
    waiters: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    dead: AtomicBool,
}

impl Pending {
    fn register(&self, id: u64) -> Result<oneshot::Receiver<Reply>, WorkerError> {
        let mut waiters = lock(&self.waiters);
        if self.dead.load(Ordering::SeqCst) {
            return Err(WorkerError::Dead);
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(id, tx);
        Ok(rx)
    }

    fn complete(&self, id: u64, reply: Reply) {
        match lock(&self.waiters).remove(&id) {
            Some(tx) => {
                // The caller may have stopped waiting
                let _ = tx.send(reply);
            }
            None => warn!(correlation_id = id, "reply for unknown request"),
        }
    }

    /// Mark the worker dead and reject everything still waiting.
    fn reject_all(&self, make_error: impl Fn() -> WorkerError) {
        self.dead.store(true, Ordering::SeqCst);
        let drained: Vec<_> = lock(&self.waiters).drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "rejecting pending requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(make_error()));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Correlates requests to the worker with its replies.
///
/// Any number of requests may be outstanding. A fatal worker error, a closed
/// channel or [`WorkerHost::shutdown`] rejects every one of them; the worker
/// is never restarted.
pub struct WorkerHost {
    to_worker: mpsc::UnboundedSender<Vec<u8>>,
    pending: Arc<Pending>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl WorkerHost {
    /// Start a worker over `source` and attach a host to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(source: Arc<dyn PackageSource>) -> io::Result<Self> {
        Ok(Self::from_channel(spawn_worker(source)?))
    }

    /// Attach a host to an already running worker.
    ///
    /// The worker thread is detached. It exits once it reads the shutdown
    /// frame or the host drops its end of the channel.
    pub fn from_channel(channel: WorkerChannel) -> Self {
        let WorkerChannel {
            to_worker,
            from_worker,
            ..
        } = channel;
        let pending = Arc::new(Pending::default());
        let reader = tokio::spawn(read_replies(from_worker, Arc::clone(&pending)));

        Self {
            to_worker,
            pending,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    /// Send `request` and wait for its reply.
    ///
    /// The request's correlation id is assigned here.
    pub async fn request(&self, mut request: WorkerRequest) -> Result<WorkerResponse, WorkerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        request.correlation_id = id;
        let package = request.package_name.clone();

        let frame = encode_frame(&WorkerMessage::Resolve {
            request: Box::new(request),
        })?;
        let rx = self.pending.register(id)?;

        if self.to_worker.send(frame).is_err() {
            self.pending
                .reject_all(|| WorkerError::Fatal("worker channel closed".to_string()));
        } else {
            debug!(correlation_id = id, %package, "request sent");
        }

        rx.await.unwrap_or(Err(WorkerError::Shutdown))
    }

    /// Whether the worker can still take requests.
    pub fn is_alive(&self) -> bool {
        !self.pending.dead.load(Ordering::SeqCst)
    }

    /// Stop the worker and reject every pending request.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if let Ok(frame) = encode_frame(&WorkerMessage::Shutdown) {
            let _ = self.to_worker.send(frame);
        }
        self.pending.reject_all(|| WorkerError::Shutdown);
    }
}

impl Drop for WorkerHost {
    fn drop(&mut self) {
        self.shutdown();
        self.reader.abort();
    }
}

async fn read_replies(mut from_worker: mpsc::UnboundedReceiver<Vec<u8>>, pending: Arc<Pending>) {
    while let Some(bytes) = from_worker.recv().await {
        let reply = match decode_frame::<WorkerReply>(&bytes) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "undecodable reply");
                continue;
            }
        };
        match reply {
            WorkerReply::Resolved { response } => {
                pending.complete(response.correlation_id, Ok(*response));
            }
            WorkerReply::Failed {
                correlation_id,
                code,
                message,
            } => pending.complete(correlation_id, Err(WorkerError::Failed { code, message })),
            WorkerReply::Fatal { message } => {
                error!(%message, "worker died");
                pending.reject_all(|| WorkerError::Fatal(message.clone()));
                return;
            }
        }
    }
    pending.reject_all(|| WorkerError::Fatal("worker exited".to_string()));
}
