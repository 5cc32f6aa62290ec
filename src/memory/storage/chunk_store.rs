//! Chunk persistence abstraction.

use std::future::Future;
use std::pin::Pin;

use crate::memory::core::chunk::Chunk;
use crate::memory::core::errors::MemoryResult;

/// Boxed future type for chunk store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable chunk storage with whole-collection reads and atomic bulk write-back.
pub trait ChunkStore: Send + Sync {
    /// Read every stored chunk in storage order.
    ///
    /// Returns `None` when the store has never been written.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn read_all(&self) -> StoreFuture<'_, MemoryResult<Option<Vec<Chunk>>>>;
    /// Write back `chunks` after an importance recompute.
    ///
    /// File stores replace the whole collection. Row stores only update the
    /// importance of listed rows and leave every other row alone. Concurrent
    /// readers observe either the previous or the new state.
    ///
    /// # Errors
    /// Returns an error if storage access fails; the previous state is kept.
    fn replace_all(&self, chunks: Vec<Chunk>) -> StoreFuture<'_, MemoryResult<()>>;
}
