use std::path::{Component, Path};

use chunkload_protocol::{ChunkTotal, UploadSession};

use crate::{UploadError, UploaderConfig};

/// Creates `path` (and parents) if it does not exist yet.
pub async fn ensure_dir(path: &Path) -> Result<(), UploadError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| UploadError::DirectoryCreateFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// Checks an incoming chunk against its session before anything is written.
///
/// Runs in order and stops at the first violation:
/// 1. the session's temp directory exists (created if absent)
/// 2. `declared_size` fits within `max_chunk_size`
/// 3. `chunk_index` is within the chunk total (skipped when unbounded)
/// 4. `declared_session_id` is the session's own id
/// 5. the final chunk has exactly `last_chunk_size_bytes` (skipped when unbounded)
pub async fn validate_chunk(
    config: &UploaderConfig,
    declared_size: u64,
    chunk_index: u64,
    declared_session_id: &str,
    session: &UploadSession,
) -> Result<(), UploadError> {
    ensure_dir(&config.session_temp_dir(&session.session_id)).await?;

    if declared_size > config.max_chunk_size {
        return Err(UploadError::ChunkTooLarge {
            size: declared_size,
            max: config.max_chunk_size,
        });
    }

    if let ChunkTotal::Bounded(total) = session.chunk_total {
        if chunk_index >= total {
            return Err(UploadError::ChunkIndexOutOfRange {
                index: chunk_index,
                total,
            });
        }
    }

    if declared_session_id != session.session_id {
        return Err(UploadError::SessionMismatch {
            declared: declared_session_id.to_string(),
            expected: session.session_id.clone(),
        });
    }

    if session.is_final_chunk(chunk_index) && declared_size != session.last_chunk_size_bytes {
        return Err(UploadError::LastChunkSizeMismatch {
            size: declared_size,
            expected: session.last_chunk_size_bytes,
        });
    }

    Ok(())
}

/// Rejects a payload whose length differs from the size the client declared.
pub fn validate_payload_len(declared_size: u64, payload_len: usize) -> Result<(), UploadError> {
    if payload_len as u64 != declared_size {
        return Err(UploadError::ChunkSizeMismatch {
            declared: declared_size,
            actual: payload_len as u64,
        });
    }
    Ok(())
}

/// Validates that `value` is usable as a single path component.
///
/// Session ids and output file names are joined onto the temp, end and
/// store directories. Rejects:
/// - Empty values
/// - Anything with more than one component (`a/b`)
/// - Absolute paths, `.` and `..`
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_path_component(value: &str) -> Result<(), UploadError> {
    if value.is_empty() {
        return Err(UploadError::InvalidPath("empty path".into()));
    }

    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        (Some(Component::ParentDir), _)
        | (Some(Component::Normal(_)), Some(Component::ParentDir)) => {
            return Err(UploadError::InvalidPath(format!(
                "parent directory traversal not allowed: {value}"
            )));
        }
        (Some(Component::RootDir) | Some(Component::Prefix(_)), _) => {
            return Err(UploadError::InvalidPath(format!(
                "absolute path not allowed: {value}"
            )));
        }
        _ => {
            return Err(UploadError::InvalidPath(format!(
                "expected a single path component: {value}"
            )));
        }
    }

    // `Path::components` normalizes away a trailing slash.
    if value.ends_with('/') || value.ends_with('\\') {
        return Err(UploadError::InvalidPath(format!(
            "expected a single path component: {value}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tempfile::TempDir;

    use super::*;

    // 10 bytes in chunks of 4: 4, 4, 2.
    fn sample(config: &UploaderConfig, chunk_total: ChunkTotal) -> UploadSession {
        UploadSession {
            session_id: "s1".into(),
            file_name: "f.bin".into(),
            file_type: String::new(),
            total_size_bytes: 10,
            max_chunk_size: config.max_chunk_size,
            chunk_total,
            last_chunk_size_bytes: 2,
            last_saved_chunk_index: None,
            received_chunks: BTreeSet::new(),
        }
    }

    fn test_config(dir: &TempDir) -> UploaderConfig {
        UploaderConfig::new(4, dir.path().join("tmp"), dir.path().join("end"))
    }

    #[tokio::test]
    async fn accepts_regular_and_last_chunk() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let session = sample(&config, ChunkTotal::Bounded(3));

        validate_chunk(&config, 4, 0, "s1", &session).await.unwrap();
        validate_chunk(&config, 3, 1, "s1", &session).await.unwrap();
        validate_chunk(&config, 2, 2, "s1", &session).await.unwrap();
    }

    #[tokio::test]
    async fn creates_session_temp_dir() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let session = sample(&config, ChunkTotal::Bounded(3));
        assert!(!config.session_temp_dir("s1").exists());

        validate_chunk(&config, 4, 0, "s1", &session).await.unwrap();
        assert!(config.session_temp_dir("s1").is_dir());
    }

    #[tokio::test]
    async fn rejects_oversized_chunk() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let session = sample(&config, ChunkTotal::Bounded(3));

        let result = validate_chunk(&config, 5, 0, "s1", &session).await;
        assert!(matches!(
            result,
            Err(UploadError::ChunkTooLarge { size: 5, max: 4 })
        ));
    }

    #[tokio::test]
    async fn rejects_index_one_past_the_end() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let session = sample(&config, ChunkTotal::Bounded(3));

        let result = validate_chunk(&config, 2, 3, "s1", &session).await;
        assert!(matches!(
            result,
            Err(UploadError::ChunkIndexOutOfRange { index: 3, total: 3 })
        ));
    }

    #[tokio::test]
    async fn rejects_foreign_session_id() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let session = sample(&config, ChunkTotal::Bounded(3));

        let result = validate_chunk(&config, 4, 0, "other", &session).await;
        assert!(matches!(result, Err(UploadError::SessionMismatch { .. })));
    }

    #[tokio::test]
    async fn rejects_wrong_last_chunk_size() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let session = sample(&config, ChunkTotal::Bounded(3));

        let result = validate_chunk(&config, 4, 2, "s1", &session).await;
        assert!(matches!(
            result,
            Err(UploadError::LastChunkSizeMismatch { size: 4, expected: 2 })
        ));
    }

    #[tokio::test]
    async fn size_checked_before_index() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let session = sample(&config, ChunkTotal::Bounded(3));

        let result = validate_chunk(&config, 9, 99, "other", &session).await;
        assert!(matches!(result, Err(UploadError::ChunkTooLarge { .. })));
    }

    #[tokio::test]
    async fn unbounded_skips_range_and_last_size() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let session = sample(&config, ChunkTotal::Unbounded);

        validate_chunk(&config, 1, 1_000, "s1", &session).await.unwrap();
        validate_chunk(&config, 4, 2, "s1", &session).await.unwrap();
        assert!(validate_chunk(&config, 5, 0, "s1", &session).await.is_err());
    }

    #[tokio::test]
    async fn directory_failure_reported() {
        let dir = TempDir::new().unwrap();
        // A regular file where the temp root should be.
        let blocker = dir.path().join("tmp");
        std::fs::write(&blocker, b"x").unwrap();
        let config = test_config(&dir);
        let session = sample(&config, ChunkTotal::Bounded(3));

        let result = validate_chunk(&config, 4, 0, "s1", &session).await;
        assert!(matches!(
            result,
            Err(UploadError::DirectoryCreateFailed { .. })
        ));
    }

    #[test]
    fn payload_len_must_match_declaration() {
        assert!(validate_payload_len(4, 4).is_ok());
        assert!(matches!(
            validate_payload_len(4, 3),
            Err(UploadError::ChunkSizeMismatch { declared: 4, actual: 3 })
        ));
    }

    #[test]
    fn rejects_empty_component() {
        assert!(validate_path_component("").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_path_component("..").is_err());
        assert!(validate_path_component("../etc").is_err());
    }

    #[test]
    fn rejects_nested_paths() {
        assert!(validate_path_component("a/b").is_err());
        assert!(validate_path_component("a/").is_err());
        assert!(validate_path_component(".").is_err());
    }

    #[test]
    fn rejects_absolute_unix_path() {
        assert!(validate_path_component("/tmp/malicious").is_err());
    }

    #[test]
    fn accepts_plain_names() {
        assert!(validate_path_component("3f2c9a0e8b7d4c1fa2b3c4d5e6f70812").is_ok());
        assert!(validate_path_component("movie.final.mkv").is_ok());
        assert!(validate_path_component(".hidden").is_ok());
    }
}
