//! Line-delimited JSON chunk file.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::memory::core::chunk::Chunk;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::storage::chunk_store::{ChunkStore, StoreFuture};

/// Chunk store backed by one JSON record per line.
///
/// Writes go to `<path>.tmp`, are synced, then renamed over `<path>`.
pub struct JsonlChunkStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlChunkStore {
    /// Create a store for `path`; the file does not need to exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the chunk file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

/// Parse chunk records, skipping blank and malformed lines.
#[must_use]
pub fn parse_lines(bytes: &[u8]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for (line_no, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<Chunk>(line) {
            Ok(chunk) => chunks.push(chunk),
            Err(err) => debug!(line = line_no + 1, %err, "Skipping malformed chunk record"),
        }
    }
    chunks
}

fn write_atomically(path: &Path, tmp: &Path, chunks: &[Chunk]) -> MemoryResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(tmp)?;
    let mut writer = BufWriter::new(file);
    for chunk in chunks {
        serde_json::to_writer(&mut writer, chunk)?;
        writer.write_all(b"\n")?;
    }
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

impl ChunkStore for JsonlChunkStore {
    fn read_all(&self) -> StoreFuture<'_, MemoryResult<Option<Vec<Chunk>>>> {
        Box::pin(async move {
            match tokio::fs::read(&self.path).await {
                Ok(bytes) => Ok(Some(parse_lines(&bytes))),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(MemoryError::Io(err)),
            }
        })
    }

    fn replace_all(&self, chunks: Vec<Chunk>) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let path = self.path.clone();
            let tmp = self.temp_path();
            let count = chunks.len();
            tokio::task::spawn_blocking(move || write_atomically(&path, &tmp, &chunks))
                .await
                .map_err(|err| MemoryError::Io(std::io::Error::other(err)))??;
            info!(path = %self.path.display(), chunks = count, "Replaced chunk file");
            Ok(())
        })
    }
}
