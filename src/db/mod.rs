//! Storage contract for tree nodes and roots

mod memory;

pub use memory::{MemoryDb, MemoryDbError};

use crate::TreeError;

/// Thread safety marker trait
#[cfg(feature = "multi-thread")]
pub trait ThreadSafe: Send + Sync {}
#[cfg(feature = "multi-thread")]
impl<T: Send + Sync> ThreadSafe for T {}

#[cfg(not(feature = "multi-thread"))]
pub trait ThreadSafe {}
#[cfg(not(feature = "multi-thread"))]
impl<T> ThreadSafe for T {}

/// Store for the tree nodes and the chain of committed roots
///
/// This trait must be implemented by any storage backend used with the tree. Nodes are
/// content-addressed: a node is stored under the hash of its bytes and never changes afterwards.
/// All methods take `&self`, so reads may run while a single writer commits.
pub trait StorageEngine<const HASH_SIZE: usize>: ThreadSafe {
    /// The error type for database operations
    type DbError;
    /// Opaque context handed through to `commit_root`, e.g. a database transaction
    type TxInfo;

    /// Persist `bytes` under `hash`. Storing the same node twice is not an error.
    fn store_node(
        &self,
        hash: [u8; HASH_SIZE],
        bytes: Vec<u8>,
    ) -> Result<(), TreeError<Self::DbError>>;

    /// Bytes stored under `hash`, or `TreeError::NodeNotFound`.
    fn lookup_node(&self, hash: &[u8; HASH_SIZE]) -> Result<Vec<u8>, TreeError<Self::DbError>>;

    /// Make `curr` the latest root, provided the latest root is still `prev`.
    ///
    /// Fails with `TreeError::StaleRoot` when another root was committed in between.
    fn commit_root(
        &self,
        prev: Option<&[u8; HASH_SIZE]>,
        curr: &[u8; HASH_SIZE],
        tx_info: Self::TxInfo,
    ) -> Result<(), TreeError<Self::DbError>>;

    /// Latest committed root, `None` before the first commit.
    fn lookup_root(&self) -> Result<Option<[u8; HASH_SIZE]>, TreeError<Self::DbError>>;
}
