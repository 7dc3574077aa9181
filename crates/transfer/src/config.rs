//! Uploader configuration.
//!
//! Fixed at construction. Can be built in code or read from a JSON file:
//!
//! ```json
//! {
//!   "maxChunkSize": 4194304,
//!   "tempDirPath": "/var/lib/uploads/tmp",
//!   "endDirPath": "/var/lib/uploads/done",
//!   "assembleChunksAfterLast": true
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::UploadError;

/// Options for a [`ChunkedUploader`](crate::ChunkedUploader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploaderConfig {
    /// Largest chunk accepted, in bytes.
    pub max_chunk_size: u64,
    /// Root directory for per-session temporary chunks.
    pub temp_dir_path: PathBuf,
    /// Root directory for assembled files.
    pub end_dir_path: PathBuf,
    /// Assemble as soon as the last missing chunk arrives.
    #[serde(default)]
    pub assemble_chunks_after_last: bool,
    /// Remove each temp chunk once it has been copied into the output.
    #[serde(default)]
    pub delete_chunks_after_assemble: bool,
    /// Disable chunk-count bookkeeping: every accepted chunk completes its
    /// session. Auto-assembly is not triggered in this mode.
    #[serde(default)]
    pub ignore_chunk_total: bool,
}

impl UploaderConfig {
    pub fn new(
        max_chunk_size: u64,
        temp_dir_path: impl Into<PathBuf>,
        end_dir_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            max_chunk_size,
            temp_dir_path: temp_dir_path.into(),
            end_dir_path: end_dir_path.into(),
            assemble_chunks_after_last: false,
            delete_chunks_after_assemble: false,
            ignore_chunk_total: false,
        }
    }

    pub fn with_assemble_after_last(mut self, enabled: bool) -> Self {
        self.assemble_chunks_after_last = enabled;
        self
    }

    pub fn with_delete_after_assemble(mut self, enabled: bool) -> Self {
        self.delete_chunks_after_assemble = enabled;
        self
    }

    pub fn with_ignore_chunk_total(mut self, enabled: bool) -> Self {
        self.ignore_chunk_total = enabled;
        self
    }

    /// Parses a configuration from JSON and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, UploadError> {
        let config: UploaderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self, UploadError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UploadError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!(path = %path.display(), "uploader configuration loaded");
        Ok(config)
    }

    /// Checks the invariants the uploader relies on.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.max_chunk_size == 0 {
            return Err(UploadError::InvalidConfig(
                "maxChunkSize must be greater than zero".into(),
            ));
        }
        if self.temp_dir_path.as_os_str().is_empty() {
            return Err(UploadError::InvalidConfig("tempDirPath is required".into()));
        }
        if self.end_dir_path.as_os_str().is_empty() {
            return Err(UploadError::InvalidConfig("endDirPath is required".into()));
        }
        Ok(())
    }

    /// Directory holding the temp chunks of one session.
    pub fn session_temp_dir(&self, session_id: &str) -> PathBuf {
        self.temp_dir_path.join(session_id)
    }

    /// Directory receiving the assembled file of one session.
    pub fn session_end_dir(&self, session_id: &str) -> PathBuf {
        self.end_dir_path.join(session_id)
    }
}
