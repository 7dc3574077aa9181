use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use chunkload_protocol::{ChunkTotal, UploadProgress};

/// Lifecycle notification emitted by the uploader.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A session was created and persisted.
    Prepared {
        session_id: String,
        chunk_total: ChunkTotal,
    },
    /// A chunk was written and the session still needs more.
    ChunkSaved {
        chunk_index: u64,
        progress: UploadProgress,
    },
    /// The session received its last missing chunk.
    Completed {
        session_id: String,
        file_name: String,
    },
    /// The chunks were assembled into `path`.
    Assembled { session_id: String, path: PathBuf },
    /// Assembly failed; the error was also returned to the caller.
    AssemblyFailed { session_id: String, error: String },
    /// The session and its temp chunks were discarded.
    Discarded { session_id: String },
}

/// Callback invoked with upload events.
pub type EventCallback = Box<dyn Fn(UploadEvent) + Send + Sync>;

/// Fans upload events out to registered callbacks.
///
/// Callbacks run synchronously on the task that emits the event, so they
/// should hand heavy work off (for example to a channel). A callback may
/// register further callbacks; those see the next event, not the current
/// one.
#[derive(Default)]
pub struct EventHub {
    callbacks: RwLock<Vec<Arc<dyn Fn(UploadEvent) + Send + Sync>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event callback.
    pub fn on_event(&self, callback: EventCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::from(callback));
    }

    /// Delivers `event` to every callback.
    pub fn emit(&self, event: UploadEvent) {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for cb in &callbacks {
            cb(event.clone());
        }
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("callbacks", &self.callback_count())
            .finish()
    }
}
