/// Background preview loader
///
/// Decoding flipbooks is slow, so it runs on a small blocking pool instead of
/// the thread that asks for previews. Results come back over a channel and are
/// only applied when the coordinating thread polls, after checking that the
/// request was not cancelled in the meantime.

use crate::error::{Result, SnipError};
use crate::preview::cache::{PreviewCache, PreviewEntry};
use crate::preview::processor::{self, PreviewSize};
use crate::session::MutationObserver;
use crate::state::data::SnipRecord;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default size of the decode pool
pub const DEFAULT_WORKERS: usize = 4;

/// One logical preview consumer, e.g. the selection of a list view.
/// At most one request per consumer is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(pub u32);

/// Ticket for one preview request
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    id: u64,
    identifier: String,
    cancelled: Arc<AtomicBool>,
}

impl PreviewHandle {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Mark the result as discardable. A decode already running is not
    /// interrupted; its result is dropped when it arrives.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// What to decode for one snip
#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub record: SnipRecord,
    pub snapshot: Option<PathBuf>,
    pub frames: Vec<PathBuf>,
}

impl PreviewRequest {
    /// Decode synchronously on the calling thread
    pub fn decode(self, max: PreviewSize) -> PreviewEntry {
        let snapshot = self.snapshot.as_deref().and_then(|path| {
            processor::decode_preview(path, max)
                .map_err(|e| debug!(error = %e, "snapshot left empty"))
                .ok()
        });
        let frames = processor::decode_flipbook(&self.frames, max);
        PreviewEntry {
            record: self.record,
            frames,
            snapshot,
        }
    }
}

/// A load that finished and was applied to the cache
#[derive(Debug, Clone)]
pub struct PreviewReady {
    pub consumer: ConsumerId,
    pub entry: Arc<PreviewEntry>,
}

struct Completed {
    consumer: ConsumerId,
    handle: PreviewHandle,
    entry: PreviewEntry,
}

pub struct AsyncPreviewLoader {
    runtime: Runtime,
    sender: mpsc::UnboundedSender<Completed>,
    receiver: mpsc::UnboundedReceiver<Completed>,
    current: HashMap<ConsumerId, PreviewHandle>,
    next_id: u64,
    max_size: PreviewSize,
}

impl AsyncPreviewLoader {
    pub fn new(workers: usize, max_size: PreviewSize) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .max_blocking_threads(workers.max(1))
            .thread_name("snip-preview")
            .enable_time()
            .build()
            .map_err(|e| SnipError::Runtime(e.to_string()))?;
        let (sender, receiver) = mpsc::unbounded_channel();

        Ok(Self {
            runtime,
            sender,
            receiver,
            current: HashMap::new(),
            next_id: 1,
            max_size,
        })
    }

    /// Queue a decode for `consumer`, cancelling whatever it requested before
    pub fn request(&mut self, consumer: ConsumerId, request: PreviewRequest) -> PreviewHandle {
        let id = self.next_id;
        self.next_id += 1;
        let handle = PreviewHandle {
            id,
            identifier: request.record.identifier.clone(),
            cancelled: Arc::new(AtomicBool::new(false)),
        };

        if let Some(previous) = self.current.insert(consumer, handle.clone()) {
            debug!(identifier = previous.identifier(), "superseded preview request cancelled");
            previous.cancel();
        }

        let sender = self.sender.clone();
        let task_handle = handle.clone();
        let max = self.max_size;
        self.runtime.spawn_blocking(move || {
            if task_handle.is_cancelled() {
                trace!(identifier = task_handle.identifier(), "skipped before decode");
                return;
            }
            let entry = request.decode(max);
            // Receiver gone means the loader was dropped
            let _ = sender.send(Completed {
                consumer,
                handle: task_handle,
                entry,
            });
        });

        handle
    }

    /// Cancel the current request of a consumer, if any
    pub fn cancel(&mut self, consumer: ConsumerId) {
        if let Some(handle) = self.current.remove(&consumer) {
            handle.cancel();
        }
    }

    /// Cancel every in-flight request for an identifier
    pub fn cancel_identifier(&mut self, identifier: &str) {
        self.current.retain(|_, handle| {
            if handle.identifier() == identifier {
                handle.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Request currently considered live for a consumer
    pub fn current(&self, consumer: ConsumerId) -> Option<&PreviewHandle> {
        self.current.get(&consumer)
    }

    /// Apply every finished load without blocking
    pub fn poll(&mut self, cache: &mut PreviewCache) -> Vec<PreviewReady> {
        let mut ready = Vec::new();
        while let Ok(completed) = self.receiver.try_recv() {
            if let Some(applied) = self.apply(completed, cache) {
                ready.push(applied);
            }
        }
        ready
    }

    /// Block until one finished load has been applied, or the timeout passes.
    /// Cancelled results that arrive meanwhile are discarded and waiting goes on.
    pub fn wait(&mut self, cache: &mut PreviewCache, timeout: Duration) -> Option<PreviewReady> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let receiver = &mut self.receiver;
            let completed = self
                .runtime
                .block_on(async { tokio::time::timeout_at(deadline, receiver.recv()).await })
                .ok()
                .flatten()?;
            if let Some(applied) = self.apply(completed, cache) {
                return Some(applied);
            }
        }
    }

    fn apply(&mut self, completed: Completed, cache: &mut PreviewCache) -> Option<PreviewReady> {
        let Completed { consumer, handle, entry } = completed;
        if handle.is_cancelled() {
            debug!(identifier = handle.identifier(), "discarding cancelled preview");
            return None;
        }

        if self.current.get(&consumer).map(|live| live.id) == Some(handle.id) {
            self.current.remove(&consumer);
        }

        let entry = cache.insert(entry);
        Some(PreviewReady { consumer, entry })
    }
}

impl MutationObserver for AsyncPreviewLoader {
    fn on_mutated(&mut self, identifier: &str) {
        self.cancel_identifier(identifier);
    }
}

impl std::fmt::Debug for AsyncPreviewLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPreviewLoader")
            .field("in_flight", &self.current.len())
            .field("max_size", &self.max_size)
            .finish()
    }
}
