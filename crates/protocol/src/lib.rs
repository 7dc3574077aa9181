//! Data model for chunked uploads.
//!
//! These types are what an upload session store persists and what the
//! transport layer hands back to clients. Everything serializes as
//! camelCase JSON so custom stores can keep records in any document
//! database.

pub mod session;
pub mod types;

pub use session::UploadSession;
pub use types::{ChunkTotal, FileMeta, UploadProgress, UploadStatus};
