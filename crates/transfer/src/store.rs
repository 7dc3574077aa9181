//! Session persistence.
//!
//! [`SessionStore`] is the seam between the uploader and whatever keeps
//! session records. The uploader owns one store for its whole lifetime;
//! [`MemoryStore`] is the default and [`JsonFileStore`] survives restarts.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chunkload_protocol::UploadSession;
use tokio::sync::RwLock;

use crate::UploadError;
use crate::validation::validate_path_component;

/// A boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Key-value persistence for upload session records.
///
/// Implementations must be safe to call concurrently for different session
/// ids. The uploader serializes calls for the same id itself.
pub trait SessionStore: Send + Sync {
    /// Fetches a session, failing with [`UploadError::SessionNotFound`].
    fn get<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, UploadSession>;

    /// Creates or overwrites a session. Returns `true` if a previous record
    /// was replaced.
    fn set<'a>(&'a self, session_id: &'a str, session: UploadSession) -> StoreFuture<'a, bool>;

    /// Removes a session. Returns `true` if a record existed; absent ids are
    /// not an error.
    fn delete<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, bool>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process session map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, UploadSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently stored.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn get<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, UploadSession> {
        Box::pin(async move {
            self.sessions
                .read()
                .await
                .get(session_id)
                .cloned()
                .ok_or_else(|| UploadError::SessionNotFound(session_id.to_string()))
        })
    }

    fn set<'a>(&'a self, session_id: &'a str, session: UploadSession) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let previous = self
                .sessions
                .write()
                .await
                .insert(session_id.to_string(), session);
            Ok(previous.is_some())
        })
    }

    fn delete<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.sessions.write().await.remove(session_id).is_some()) })
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Stores each session as `<dir>/<session_id>.json`.
///
/// Records are written to a sibling temp file and renamed into place so a
/// crash never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, session_id: &str) -> Result<PathBuf, UploadError> {
        validate_path_component(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

fn storage_error(action: &str, session_id: &str, e: impl std::fmt::Display) -> UploadError {
    UploadError::Storage(format!("{action} {session_id}: {e}"))
}

impl SessionStore for JsonFileStore {
    fn get<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, UploadSession> {
        Box::pin(async move {
            let path = self.record_path(session_id)?;
            let content = match tokio::fs::read(&path).await {
                Ok(c) => c,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(UploadError::SessionNotFound(session_id.to_string()));
                }
                Err(e) => return Err(storage_error("read", session_id, e)),
            };
            serde_json::from_slice(&content).map_err(|e| storage_error("decode", session_id, e))
        })
    }

    fn set<'a>(&'a self, session_id: &'a str, session: UploadSession) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let path = self.record_path(session_id)?;
            let json = serde_json::to_vec_pretty(&session)
                .map_err(|e| storage_error("encode", session_id, e))?;

            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|e| storage_error("create store dir for", session_id, e))?;

            let existed = tokio::fs::try_exists(&path)
                .await
                .map_err(|e| storage_error("stat", session_id, e))?;

            let tmp_path = self.dir.join(format!("{session_id}.json.tmp"));
            tokio::fs::write(&tmp_path, &json)
                .await
                .map_err(|e| storage_error("write", session_id, e))?;
            tokio::fs::rename(&tmp_path, &path)
                .await
                .map_err(|e| storage_error("commit", session_id, e))?;

            Ok(existed)
        })
    }

    fn delete<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let path = self.record_path(session_id)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(storage_error("delete", session_id, e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chunkload_protocol::ChunkTotal;
    use tempfile::TempDir;

    use super::*;

    fn sample_session(id: &str) -> UploadSession {
        UploadSession {
            session_id: id.into(),
            file_name: "clip.mp4".into(),
            file_type: "video/mp4".into(),
            total_size_bytes: 10,
            max_chunk_size: 4,
            chunk_total: ChunkTotal::Bounded(3),
            last_chunk_size_bytes: 2,
            last_saved_chunk_index: None,
            received_chunks: BTreeSet::new(),
        }
    }

    async fn exercise_store(store: &dyn SessionStore) {
        assert!(matches!(
            store.get("s1").await,
            Err(UploadError::SessionNotFound(id)) if id == "s1"
        ));

        assert!(!store.set("s1", sample_session("s1")).await.unwrap());
        assert_eq!(store.get("s1").await.unwrap(), sample_session("s1"));

        let mut updated = sample_session("s1");
        updated.record_chunk(1);
        assert!(store.set("s1", updated.clone()).await.unwrap());
        assert_eq!(store.get("s1").await.unwrap(), updated);

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert!(store.get("s1").await.is_err());
    }

    #[tokio::test]
    async fn memory_store_contract() {
        let store = MemoryStore::new();
        exercise_store(&store).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn json_file_store_contract() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions"));
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn memory_store_isolates_sessions() {
        let store = MemoryStore::new();
        store.set("a", sample_session("a")).await.unwrap();
        store.set("b", sample_session("b")).await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("b").await.unwrap().session_id, "b");
    }

    #[tokio::test]
    async fn json_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let mut session = sample_session("s2");
        session.record_chunk(0);

        JsonFileStore::new(dir.path())
            .set("s2", session.clone())
            .await
            .unwrap();

        let reopened = JsonFileStore::new(dir.path());
        assert_eq!(reopened.get("s2").await.unwrap(), session);
        assert!(!dir.path().join("s2.json.tmp").exists());
    }

    #[tokio::test]
    async fn json_file_store_rejects_traversal_ids() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let result = store.get("../escape").await;
        assert!(matches!(result, Err(UploadError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn json_file_store_corrupt_record() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.get("bad").await,
            Err(UploadError::Storage(_))
        ));
    }
}
