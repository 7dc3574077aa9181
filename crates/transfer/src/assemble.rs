use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::validation::{ensure_dir, validate_path_component};
use crate::{ChunkWriter, UploadError, UploaderConfig};

/// Output buffer size used while concatenating chunks.
const ASSEMBLY_BUFFER_SIZE: usize = 256 * 1024;

/// Suffix of the in-progress output file.
const PART_SUFFIX: &str = ".part";

/// Concatenates the temp chunks of a session into `<end>/<id>/<file_name>`.
///
/// Chunks are appended in ascending index order regardless of the order
/// they were written in. The output is built in a sibling part file and
/// renamed into place once flushed, so a failed or empty assembly never
/// touches an existing output. With `delete_chunks_after_assemble` the
/// chunk files are removed after the rename. Returns the path of the
/// assembled file.
pub async fn assemble_chunks(
    config: &UploaderConfig,
    session_id: &str,
    file_name: &str,
) -> Result<PathBuf, UploadError> {
    assemble(config, session_id, file_name, None).await
}

/// Like [`assemble_chunks`], but first checks that the chunk files
/// `0..chunk_total` are all on disk and fails with
/// [`UploadError::MissingChunks`] otherwise.
pub async fn assemble_complete(
    config: &UploaderConfig,
    session_id: &str,
    file_name: &str,
    chunk_total: u64,
) -> Result<PathBuf, UploadError> {
    assemble(config, session_id, file_name, Some(chunk_total)).await
}

async fn assemble(
    config: &UploaderConfig,
    session_id: &str,
    file_name: &str,
    chunk_total: Option<u64>,
) -> Result<PathBuf, UploadError> {
    validate_path_component(session_id)?;
    validate_path_component(file_name)?;

    let writer = ChunkWriter::new(&config.temp_dir_path);
    let chunks = writer
        .list_chunks(session_id)
        .await
        .map_err(UploadError::AssemblyIo)?;
    if chunks.is_empty() {
        return Err(UploadError::NoChunks(session_id.to_string()));
    }
    if let Some(total) = chunk_total {
        let present: BTreeSet<u64> = chunks.iter().map(|(index, _)| *index).collect();
        let missing: Vec<u64> = (0..total).filter(|i| !present.contains(i)).collect();
        if !missing.is_empty() {
            return Err(UploadError::MissingChunks {
                session_id: session_id.to_string(),
                missing,
            });
        }
    }

    let end_dir = config.session_end_dir(session_id);
    ensure_dir(&end_dir).await?;
    let output_path = end_dir.join(file_name);
    let part_path = end_dir.join(format!(".{file_name}{PART_SUFFIX}"));

    let written = match concat_chunks(&chunks, &part_path).await {
        Ok(n) => tokio::fs::rename(&part_path, &output_path).await.map(|()| n),
        Err(e) => Err(e),
    };
    let total_bytes = match written {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(UploadError::AssemblyIo(e));
        }
    };

    if config.delete_chunks_after_assemble {
        for (_, path) in &chunks {
            tokio::fs::remove_file(path)
                .await
                .map_err(UploadError::AssemblyIo)?;
        }
    }

    info!(
        session_id,
        path = %output_path.display(),
        chunks = chunks.len(),
        total_bytes,
        "upload assembled"
    );
    Ok(output_path)
}

/// Streams `chunks` in order into a fresh file at `path`.
async fn concat_chunks(chunks: &[(u64, PathBuf)], path: &Path) -> std::io::Result<u64> {
    let file = tokio::fs::File::create(path).await?;
    let mut output = BufWriter::with_capacity(ASSEMBLY_BUFFER_SIZE, file);

    let mut total_bytes: u64 = 0;
    for (index, chunk_path) in chunks {
        let mut chunk = tokio::fs::File::open(chunk_path).await?;
        total_bytes += tokio::io::copy(&mut chunk, &mut output).await?;
        debug!(chunk_index = *index, "chunk appended");
    }

    output.flush().await?;
    output.into_inner().sync_all().await?;
    Ok(total_bytes)
}

/// Deletes the temp chunks of a session without assembling them.
///
/// Returns the number of chunk files removed.
pub async fn clear_chunks(
    config: &UploaderConfig,
    session_id: &str,
) -> Result<usize, UploadError> {
    validate_path_component(session_id)?;

    let removed = ChunkWriter::new(&config.temp_dir_path)
        .remove_chunks(session_id)
        .await
        .map_err(UploadError::ChunkIo)?;

    info!(session_id, removed, "temp chunks cleared");
    Ok(removed)
}
