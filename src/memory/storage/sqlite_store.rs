//! Vector-capable chunk store on `SQLite` + sqlite-vec.
//!
//! Vectors are stored as little-endian `f32` blobs, the layout sqlite-vec
//! reads natively. When the extension is not loaded the same rows can still
//! be scanned and scored client-side.

use chrono::Utc;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::memory::core::chunk::{Candidate, Chunk};
use crate::memory::core::config::StorageConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::storage::chunk_store::{ChunkStore, StoreFuture};

/// Similarity support exposed by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorCapability {
    /// sqlite-vec functions are available for in-database ranking.
    Native,
    /// Only raw vector columns; similarity must be computed by the caller.
    Array,
}

/// A stored chunk together with its raw vector.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorRow {
    /// Stored chunk.
    pub chunk: Chunk,
    /// Decoded embedding.
    pub vector: Vec<f64>,
}

/// `SQLite` chunk table with vectors.
pub struct SqliteChunkStore {
    conn: Connection,
    table: String,
}

impl SqliteChunkStore {
    /// Open the database and ensure the chunk table exists.
    ///
    /// # Errors
    /// Returns an error if the table name is invalid or the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> MemoryResult<Self> {
        validate_table_name(&config.chunk_table)?;
        let conn = Connection::open(&config.sqlite_path).await?;
        let table = config.chunk_table.clone();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    chunk_id TEXT PRIMARY KEY,
                    doc_id TEXT,
                    text TEXT,
                    vector BLOB,
                    importance REAL DEFAULT 0.0,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_updated
                    ON {table_name} (updated_at);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }

    /// Insert or update chunks with their vectors.
    ///
    /// Existing rows keep their stored importance.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn upsert_chunks(&self, rows: Vec<(Chunk, Vec<f64>)>) -> MemoryResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let table = self.table.clone();
        let count = rows.len();
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(&format!(
                        "INSERT INTO {table} (chunk_id, doc_id, text, vector, importance, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(chunk_id) DO UPDATE SET
                            doc_id = excluded.doc_id,
                            text = excluded.text,
                            vector = excluded.vector,
                            updated_at = excluded.updated_at"
                    ))?;
                    for (chunk, vector) in rows {
                        stmt.execute(rusqlite::params![
                            chunk.chunk_id,
                            chunk.doc_id,
                            chunk.text,
                            encode_vector(&vector),
                            chunk.importance,
                            now
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        debug!(rows = count, "Upserted chunks");
        Ok(())
    }

    /// Probe whether sqlite-vec similarity functions are callable.
    pub async fn detect_vector_capability(&self) -> VectorCapability {
        let probe = self
            .conn
            .call(|conn| {
                let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
                Ok(version)
            })
            .await;

        match probe {
            Ok(version) => {
                debug!(%version, "sqlite-vec available");
                VectorCapability::Native
            }
            Err(err) => {
                warn!(%err, "sqlite-vec not available, using raw vector scans");
                VectorCapability::Array
            }
        }
    }

    /// Rank stored chunks by cosine similarity inside the database.
    ///
    /// # Errors
    /// Returns an error if sqlite-vec is missing or the query fails.
    pub async fn native_top_n(&self, query: &[f64], pool: usize) -> MemoryResult<Vec<Candidate>> {
        let table = self.table.clone();
        let blob = encode_vector(query);
        let limit = i64::try_from(pool).unwrap_or(i64::MAX);
        let candidates = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT chunk_id, text, COALESCE(importance, 0.0),
                            1.0 - vec_distance_cosine(vector, ?1) AS similarity
                     FROM {table}
                     WHERE vector IS NOT NULL
                     ORDER BY similarity DESC
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![blob, limit], |row| {
                        Ok(Candidate {
                            chunk_id: row.get(0)?,
                            text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                            importance: row.get(2)?,
                            similarity: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                        })
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        Ok(candidates)
    }

    /// Fetch up to `limit` most recently updated rows that carry a vector.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn scan_recent(&self, limit: usize) -> MemoryResult<Vec<VectorRow>> {
        let table = self.table.clone();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT chunk_id, doc_id, text, COALESCE(importance, 0.0), vector
                     FROM {table}
                     WHERE vector IS NOT NULL
                     ORDER BY updated_at DESC, rowid ASC
                     LIMIT ?1"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![limit], |row| {
                        let blob: Vec<u8> = row.get(4)?;
                        Ok(VectorRow {
                            chunk: Chunk {
                                chunk_id: row.get(0)?,
                                doc_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                                text: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                                importance: row.get(3)?,
                            },
                            vector: decode_vector(&blob),
                        })
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
impl SqliteChunkStore {
    /// Keep the connection thread busy for `duration`.
    pub(crate) async fn occupy(&self, duration: std::time::Duration) {
        let _ = self
            .conn
            .call(move |_| {
                std::thread::sleep(duration);
                Ok(())
            })
            .await;
    }
}

impl ChunkStore for SqliteChunkStore {
    fn read_all(&self) -> StoreFuture<'_, MemoryResult<Option<Vec<Chunk>>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let chunks = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT chunk_id, doc_id, text, COALESCE(importance, 0.0)
                         FROM {table} ORDER BY rowid ASC"
                    ))?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok(Chunk {
                                chunk_id: row.get(0)?,
                                doc_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                                text: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                                importance: row.get(3)?,
                            })
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;
            Ok(Some(chunks))
        })
    }

    /// Only the `importance` column of listed rows is written. Rows that are
    /// not listed, including ones upserted after `chunks` was read, are left
    /// untouched, as are text and vectors.
    fn replace_all(&self, chunks: Vec<Chunk>) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let count = chunks.len();
            let updated = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let mut updated = 0;
                    {
                        let mut stmt = tx.prepare(&format!(
                            "UPDATE {table} SET importance = ?2 WHERE chunk_id = ?1"
                        ))?;
                        for chunk in &chunks {
                            updated +=
                                stmt.execute(rusqlite::params![chunk.chunk_id, chunk.importance])?;
                        }
                    }
                    tx.commit()?;
                    Ok(updated)
                })
                .await?;

            info!(table = %self.table, chunks = count, updated, "Updated chunk importance");
            Ok(())
        })
    }
}

fn validate_table_name(name: &str) -> MemoryResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(MemoryError::InvalidConfig(format!(
            "invalid chunk table name: {name}"
        )))
    }
}

/// Encode a vector as little-endian `f32` bytes.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // stored precision is f32 by design of sqlite-vec
pub fn encode_vector(vector: &[f64]) -> Vec<u8> {
    vector
        .iter()
        .flat_map(|v| (*v as f32).to_le_bytes())
        .collect()
}

/// Decode little-endian `f32` bytes; a trailing partial value is ignored.
#[must_use]
pub fn decode_vector(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(4)
        .map(|b| f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])))
        .collect()
}

#[cfg(test)]
mod tests {
    use rusqlite::OptionalExtension;

    use super::*;
    use crate::memory::storage::sqlite_vec_loader::init_sqlite_vec_extension;

    async fn importance_of(store: &SqliteChunkStore, chunk_id: &str) -> Option<f64> {
        let table = store.table.clone();
        let chunk_id = chunk_id.to_string();
        store
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        &format!("SELECT importance FROM {table} WHERE chunk_id = ?1"),
                        rusqlite::params![chunk_id],
                        |row| row.get::<_, f64>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
            .unwrap()
    }

    async fn open(dir: &tempfile::TempDir) -> SqliteChunkStore {
        let config = StorageConfig {
            sqlite_path: dir.path().join("chunks.sqlite"),
            ..StorageConfig::default()
        };
        SqliteChunkStore::new(&config).await.unwrap()
    }

    fn seed() -> Vec<(Chunk, Vec<f64>)> {
        vec![
            (Chunk::with_id("t5", "doc1", "T5 is a text-to-text model"), vec![1.0, 0.0, 0.0]),
            (
                Chunk::with_id("lora", "doc2", "LoRA adds low-rank adapters").with_importance(0.8),
                vec![0.0, 1.0, 0.0],
            ),
        ]
    }

    #[test]
    fn test_vector_codec() {
        let v = vec![0.5, -1.25, 3.0];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
        assert_eq!(decode_vector(&[0, 0, 128]), Vec::<f64>::new());
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("chunks_v2").is_ok());
        assert!(validate_table_name("_x").is_ok());
        assert!(validate_table_name("1chunks").is_err());
        assert!(validate_table_name("chunks; DROP TABLE x").is_err());
        assert!(validate_table_name("").is_err());
    }

    #[tokio::test]
    async fn test_scan_recent_decodes_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store.upsert_chunks(seed()).await.unwrap();

        let rows = store.scan_recent(10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].chunk.chunk_id, "t5");
        assert_eq!(rows[0].vector, vec![1.0, 0.0, 0.0]);
        assert!((rows[1].chunk.importance - 0.8).abs() < 1e-12);

        assert_eq!(store.scan_recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_native_top_n_ranks_by_similarity() {
        init_sqlite_vec_extension();
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store.upsert_chunks(seed()).await.unwrap();

        assert_eq!(store.detect_vector_capability().await, VectorCapability::Native);
        let ranked = store.native_top_n(&[0.9, 0.1, 0.0], 5).await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk_id, "t5");
        assert!(ranked[0].similarity > ranked[1].similarity);
        assert!((ranked[1].importance - 0.8).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_replace_all_updates_importance_and_keeps_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store.upsert_chunks(seed()).await.unwrap();

        let mut chunks = store.read_all().await.unwrap().unwrap();
        assert_eq!(chunks.len(), 2);
        for chunk in &mut chunks {
            chunk.importance = if chunk.chunk_id == "t5" { 1.0 } else { 0.0 };
        }
        store.replace_all(chunks).await.unwrap();

        assert_eq!(importance_of(&store, "t5").await, Some(1.0));
        assert_eq!(importance_of(&store, "lora").await, Some(0.0));
        assert_eq!(store.scan_recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_all_leaves_rows_written_during_recompute() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store.upsert_chunks(seed()).await.unwrap();

        let mut chunks = store.read_all().await.unwrap().unwrap();
        store
            .upsert_chunks(vec![
                (
                    Chunk::with_id("lora", "doc2", "LoRA adds low-rank adapters, revised"),
                    vec![0.0, 0.5, 0.5],
                ),
                (
                    Chunk::with_id("bert", "doc3", "BERT is an encoder").with_importance(0.3),
                    vec![0.0, 0.0, 1.0],
                ),
            ])
            .await
            .unwrap();

        for chunk in &mut chunks {
            chunk.importance = 0.5;
        }
        store.replace_all(chunks).await.unwrap();

        let stored = store.read_all().await.unwrap().unwrap();
        assert_eq!(stored.len(), 3);
        let lora = stored.iter().find(|c| c.chunk_id == "lora").unwrap();
        assert_eq!(lora.text, "LoRA adds low-rank adapters, revised");
        assert!((lora.importance - 0.5).abs() < 1e-12);
        let bert = stored.iter().find(|c| c.chunk_id == "bert").unwrap();
        assert_eq!(bert.text, "BERT is an encoder");
        assert_eq!(importance_of(&store, "bert").await, Some(0.3));
        assert_eq!(store.scan_recent(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_replace_all_ignores_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store.upsert_chunks(seed()).await.unwrap();

        store
            .replace_all(vec![Chunk::with_id("gone", "doc9", "never stored").with_importance(1.0)])
            .await
            .unwrap();
        assert_eq!(store.read_all().await.unwrap().unwrap().len(), 2);
        assert_eq!(importance_of(&store, "gone").await, None);
    }

    #[tokio::test]
    async fn test_upsert_keeps_existing_importance() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store.upsert_chunks(seed()).await.unwrap();
        store
            .upsert_chunks(vec![(
                Chunk::with_id("lora", "doc2", "LoRA adds low-rank adapters, revised"),
                vec![0.0, 0.5, 0.5],
            )])
            .await
            .unwrap();
        assert_eq!(importance_of(&store, "lora").await, Some(0.8));
    }
}
