//! Stream lifecycle management.
//!
//! The driver owns the registry of active per-container streams. Each
//! `StartLogging` opens the container's FIFO, registers it under the
//! stream key (the FIFO path), and spawns an independent consumption task;
//! `StopLogging` cancels the task and forgets the registration.
//!
//! # Concurrency model
//!
//! - One consumption task per active stream, running until canceled or the
//!   stream ends. Start/stop never block on task progress.
//! - The registry mutex is the only shared mutable state; it is held for
//!   map mutation only, never across I/O or an await point.
//! - Cancellation is cooperative: the consumption loop re-checks the token
//!   before every read, and a pending read is abandoned the moment the
//!   token fires. A canceled task never decodes one more frame.
//! - Within a stream, records are emitted in strict frame-arrival order.
//!   Streams are fully independent of each other.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::container::{ContainerInfo, ContainerOptions};
use crate::error::DriverError;
use crate::frames::FrameDecoder;
use crate::mapper::map_entry;
use crate::transport::RecordEmitter;

const POISONED: &str = "stream registry lock poisoned";

/// One active stream: the cancellation signal and the task it governs,
/// both first-class values owned by the registry.
struct StreamRegistration {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

/// The stream lifecycle manager.
///
/// Shared behind an `Arc` by every plugin connection; all emitted records
/// flow through the single [`RecordEmitter`] handed in at construction.
pub struct Driver {
    streams: Mutex<HashMap<String, StreamRegistration>>,
    emitter: Arc<dyn RecordEmitter>,
}

impl Driver {
    #[must_use]
    pub fn new(emitter: Arc<dyn RecordEmitter>) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            emitter,
        }
    }

    /// Starts consuming the log stream at `file` for the given container.
    ///
    /// Fails with [`DriverError::AlreadyRegistered`] when a consumer for
    /// the key is already active - duplicate starts are rejected, not
    /// absorbed. On success the consumption task runs asynchronously; its
    /// later failures are not reported through this call.
    pub async fn start_logging(&self, file: &str, info: ContainerInfo) -> Result<(), DriverError> {
        if self.streams.lock().expect(POISONED).contains_key(file) {
            return Err(DriverError::AlreadyRegistered(file.to_string()));
        }

        let stream = tokio::fs::File::open(file)
            .await
            .map_err(|source| DriverError::OpenStream {
                path: file.to_string(),
                source,
            })?;

        let options = ContainerOptions::from_config(&info.config, &info.container_id);
        let cancel = CancellationToken::new();

        info!(
            container_id = %info.container_id,
            file,
            "starting log stream consumer"
        );

        let mut streams = self.streams.lock().expect(POISONED);
        match streams.entry(file.to_string()) {
            // Re-checked under the lock: the open above runs outside it,
            // so two racing starts for the same key could otherwise both
            // register. The loser's freshly opened handle is dropped.
            Entry::Occupied(_) => Err(DriverError::AlreadyRegistered(file.to_string())),
            Entry::Vacant(slot) => {
                let task = tokio::spawn(consume(
                    stream,
                    info,
                    options,
                    Arc::clone(&self.emitter),
                    cancel.clone(),
                ));
                slot.insert(StreamRegistration { cancel, task });
                Ok(())
            }
        }
    }

    /// Stops the consumer for `file`. A stop for a key that was never
    /// started (or already ended) is a successful no-op.
    ///
    /// The cancellation signal is fire-and-forget: this never waits for
    /// the task to observe it.
    pub fn stop_logging(&self, file: &str) {
        let mut streams = self.streams.lock().expect(POISONED);
        if let Some(registration) = streams.remove(file) {
            registration.cancel.cancel();
            debug!(
                file,
                task_finished = registration.task.is_finished(),
                "stopped log stream consumer"
            );
        } else {
            debug!(file, "stop for unregistered stream; nothing to do");
        }
    }

    /// Number of registered streams (streams whose task ended on EOF stay
    /// registered until the daemon sends the stop).
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.streams.lock().expect(POISONED).len()
    }
}

/// Consumption loop for one stream: decode, map, emit, in arrival order,
/// until cancellation or end-of-stream. The task exclusively owns the
/// stream handle and closes it on exit.
async fn consume<R>(
    stream: R,
    info: ContainerInfo,
    options: ContainerOptions,
    emitter: Arc<dyn RecordEmitter>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new(stream);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = decoder.next_frame() => match next {
                Some(entry) => emitter.emit(map_entry(&entry, &info, &options)),
                // Clean end-of-stream: not an error, just done.
                None => break,
            },
        }
    }
    debug!(
        container_id = %info.container_id,
        resyncs = decoder.resync_count(),
        "log stream consumer exited"
    );
}
