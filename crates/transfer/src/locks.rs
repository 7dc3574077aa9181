//! Per-session serialization.
//!
//! Every operation that reads and rewrites a session (or its temp
//! directory) holds that session's lock, so two chunks of one upload never
//! race on the record and assembly never overlaps a chunk write. Sessions
//! do not share locks, so different uploads never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Async mutexes keyed by session id, created on demand.
#[derive(Debug, Default)]
pub(crate) struct SessionLocks {
    inner: Arc<Mutex<LockMap>>,
}

/// Holds one session's lock; the map entry is dropped with the last holder.
#[derive(Debug)]
pub(crate) struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    session_id: String,
    locks: Arc<Mutex<LockMap>>,
}

impl SessionLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits until the session's lock is free and takes it.
    pub(crate) async fn lock(&self, session_id: &str) -> SessionGuard {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(session_id.to_string()).or_default())
        };
        let guard = entry.lock_owned().await;
        SessionGuard {
            guard: Some(guard),
            session_id: session_id.to_string(),
            locks: Arc::clone(&self.inner),
        }
    }

    /// Number of sessions with a held or awaited lock.
    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map still points at the mutex: nobody holds or awaits it.
        if map
            .get(&self.session_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            map.remove(&self.session_id);
        }
    }
}
