//! Persistent storage modules for chunk data.

pub mod chunk_store;
pub mod jsonl_store;
pub mod sqlite_store;
pub mod sqlite_vec_loader;

pub use chunk_store::{ChunkStore, StoreFuture};
pub use jsonl_store::JsonlChunkStore;
pub use sqlite_store::{SqliteChunkStore, VectorCapability, VectorRow};
pub use sqlite_vec_loader::init_sqlite_vec_extension;
