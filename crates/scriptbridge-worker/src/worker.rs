//! The worker loop.

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use scriptbridge_core::PackageSource;
use scriptbridge_proto::{decode_frame, encode_frame, WorkerMessage, WorkerReply};
use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::handler::handle_request;

/// Both ends of a running worker, as seen from the host.
pub struct WorkerChannel {
    /// Encoded [`WorkerMessage`] frames.
    pub to_worker: mpsc::UnboundedSender<Vec<u8>>,
    /// Encoded [`WorkerReply`] frames.
    pub from_worker: mpsc::UnboundedReceiver<Vec<u8>>,
    pub thread: thread::JoinHandle<()>,
}

/// Start a worker on its own thread.
///
/// Requests are handled concurrently on the worker's runtime. A panic while
/// handling any of them is reported as [`WorkerReply::Fatal`] and ends the
/// worker.
pub fn spawn_worker(source: Arc<dyn PackageSource>) -> io::Result<WorkerChannel> {
    let (to_worker, inbox) = mpsc::unbounded_channel();
    let (outbox, from_worker) = mpsc::unbounded_channel();

    let thread = thread::Builder::new()
        .name("scriptbridge-worker".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    send(
                        &outbox,
                        &WorkerReply::Fatal {
                            message: format!("failed to start worker runtime: {e}"),
                        },
                    );
                    return;
                }
            };
            runtime.block_on(run(source, inbox, outbox));
        })?;

    Ok(WorkerChannel {
        to_worker,
        from_worker,
        thread,
    })
}

async fn run(
    source: Arc<dyn PackageSource>,
    mut inbox: mpsc::UnboundedReceiver<Vec<u8>>,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
) {
    info!("worker started");
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            frame = inbox.recv() => {
                let Some(bytes) = frame else {
                    debug!("host closed the channel");
                    break;
                };
                match decode_frame::<WorkerMessage>(&bytes) {
                    Ok(WorkerMessage::Resolve { request }) => {
                        debug!(correlation_id = request.correlation_id, "request received");
                        in_flight.push(
                            AssertUnwindSafe(handle_request(source.as_ref(), *request)).catch_unwind(),
                        );
                    }
                    Ok(WorkerMessage::Shutdown) => {
                        info!(pending = in_flight.len(), "worker shutting down");
                        break;
                    }
                    Err(e) => {
                        // Without a correlation id nothing can be answered
                        error!(error = %e, "undecodable frame");
                        send(&outbox, &WorkerReply::Fatal {
                            message: format!("invalid frame: {e}"),
                        });
                        break;
                    }
                }
            }
            Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                match outcome {
                    Ok(reply) => send(&outbox, &reply),
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(%message, "worker panicked");
                        send(&outbox, &WorkerReply::Fatal { message });
                        break;
                    }
                }
            }
        }
    }
}

fn send(outbox: &mpsc::UnboundedSender<Vec<u8>>, reply: &WorkerReply) {
    match encode_frame(reply) {
        Ok(bytes) => {
            if outbox.send(bytes).is_err() {
                debug!("host is gone, dropping reply");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode reply"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
