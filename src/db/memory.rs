use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::{trace, warn};
use thiserror::Error;

use crate::{db::StorageEngine, TreeError};

const LOG_TARGET: &str = "merkle_kv_tree::db::memory";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryDbError {
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

/// A simple in-memory database implementation, mostly for testing
#[derive(Debug, Default)]
pub struct MemoryDb<const HASH_SIZE: usize> {
    nodes: RwLock<HashMap<[u8; HASH_SIZE], Vec<u8>>>,
    // Every committed root, oldest first.
    roots: RwLock<Vec<[u8; HASH_SIZE]>>,
}

impl<const HASH_SIZE: usize> MemoryDb<HASH_SIZE> {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            roots: RwLock::new(Vec::new()),
        }
    }

    pub fn node_count(&self) -> Result<usize, TreeError<MemoryDbError>> {
        Ok(self.read_nodes()?.len())
    }

    pub fn root_history(&self) -> Result<Vec<[u8; HASH_SIZE]>, TreeError<MemoryDbError>> {
        Ok(self.read_roots()?.clone())
    }

    fn read_nodes(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<[u8; HASH_SIZE], Vec<u8>>>, TreeError<MemoryDbError>>
    {
        self.nodes
            .read()
            .map_err(|_| TreeError::DbError(MemoryDbError::LockPoisoned("nodes")))
    }

    fn write_nodes(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<[u8; HASH_SIZE], Vec<u8>>>, TreeError<MemoryDbError>>
    {
        self.nodes
            .write()
            .map_err(|_| TreeError::DbError(MemoryDbError::LockPoisoned("nodes")))
    }

    fn read_roots(
        &self,
    ) -> Result<RwLockReadGuard<'_, Vec<[u8; HASH_SIZE]>>, TreeError<MemoryDbError>> {
        self.roots
            .read()
            .map_err(|_| TreeError::DbError(MemoryDbError::LockPoisoned("roots")))
    }

    fn write_roots(
        &self,
    ) -> Result<RwLockWriteGuard<'_, Vec<[u8; HASH_SIZE]>>, TreeError<MemoryDbError>> {
        self.roots
            .write()
            .map_err(|_| TreeError::DbError(MemoryDbError::LockPoisoned("roots")))
    }
}

impl<const HASH_SIZE: usize> StorageEngine<HASH_SIZE> for MemoryDb<HASH_SIZE> {
    type DbError = MemoryDbError;
    type TxInfo = ();

    fn store_node(
        &self,
        hash: [u8; HASH_SIZE],
        bytes: Vec<u8>,
    ) -> Result<(), TreeError<Self::DbError>> {
        trace!(target: LOG_TARGET, "store node {} ({} bytes)", hex::encode(hash), bytes.len());
        self.write_nodes()?.entry(hash).or_insert(bytes);
        Ok(())
    }

    fn lookup_node(&self, hash: &[u8; HASH_SIZE]) -> Result<Vec<u8>, TreeError<Self::DbError>> {
        self.read_nodes()?
            .get(hash)
            .cloned()
            .ok_or_else(|| TreeError::NodeNotFound(hash.to_vec()))
    }

    fn commit_root(
        &self,
        prev: Option<&[u8; HASH_SIZE]>,
        curr: &[u8; HASH_SIZE],
        _tx_info: Self::TxInfo,
    ) -> Result<(), TreeError<Self::DbError>> {
        let mut roots = self.write_roots()?;
        let latest = roots.last();
        if latest != prev {
            warn!(
                target: LOG_TARGET,
                "rejecting root {}: latest root moved",
                hex::encode(curr)
            );
            return Err(TreeError::StaleRoot {
                expected: prev.map(|hash| hash.to_vec()),
                found: latest.map(|hash| hash.to_vec()),
            });
        }
        roots.push(*curr);
        Ok(())
    }

    fn lookup_root(&self) -> Result<Option<[u8; HASH_SIZE]>, TreeError<Self::DbError>> {
        Ok(self.read_roots()?.last().copied())
    }
}

#[cfg(test)]
mod test {
    use super::{MemoryDb, StorageEngine};
    use crate::TreeError;

    #[test]
    fn test_memory_db_new() {
        let db = MemoryDb::<4>::new();
        assert_eq!(db.node_count().unwrap(), 0);
        assert_eq!(db.lookup_root().unwrap(), None);
        assert!(db.root_history().unwrap().is_empty());
    }

    #[test]
    fn test_memory_db_store_and_lookup() {
        let db = MemoryDb::<4>::new();
        db.store_node([1; 4], vec![1, 2, 3]).unwrap();
        db.store_node([1; 4], vec![1, 2, 3]).unwrap();
        assert_eq!(db.node_count().unwrap(), 1);
        assert_eq!(db.lookup_node(&[1; 4]).unwrap(), vec![1, 2, 3]);
        assert_eq!(
            db.lookup_node(&[2; 4]).unwrap_err(),
            TreeError::NodeNotFound(vec![2; 4])
        );
    }

    #[test]
    fn test_memory_db_commit_root() {
        let db = MemoryDb::<4>::new();
        db.commit_root(None, &[1; 4], ()).unwrap();
        db.commit_root(Some(&[1; 4]), &[2; 4], ()).unwrap();
        assert_eq!(db.lookup_root().unwrap(), Some([2; 4]));
        assert_eq!(db.root_history().unwrap(), vec![[1; 4], [2; 4]]);
    }

    #[test]
    fn test_memory_db_rejects_stale_root() {
        let db = MemoryDb::<4>::new();
        db.commit_root(None, &[1; 4], ()).unwrap();
        assert_eq!(
            db.commit_root(None, &[3; 4], ()).unwrap_err(),
            TreeError::StaleRoot {
                expected: None,
                found: Some(vec![1; 4]),
            }
        );
        db.commit_root(Some(&[1; 4]), &[2; 4], ()).unwrap();
        assert_eq!(
            db.commit_root(Some(&[1; 4]), &[3; 4], ()).unwrap_err(),
            TreeError::StaleRoot {
                expected: Some(vec![1; 4]),
                found: Some(vec![2; 4]),
            }
        );
        assert_eq!(db.lookup_root().unwrap(), Some([2; 4]));
    }
}
