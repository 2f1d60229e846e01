//! Versioned Merkle key/value tree
//!
//! Every write produces a new root node linked to the root it replaced, and nodes are never
//! overwritten, so any past root can still be read and proven against.

mod insert;

use std::{marker::PhantomData, sync::Mutex};

use log::{debug, trace, warn};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    codec,
    config::Config,
    db::StorageEngine,
    node::{Hasher, Node},
    proof::Proof,
    MerkleError, MerkleResult, TreeError,
};

const LOG_TARGET: &str = "merkle_kv_tree::tree";

/// Merkle key/value tree.
/// * `HASH_SIZE` - size of the hash digest in bytes.
/// * `H` - Hasher that will be used to hash nodes.
/// * `S` - Storage engine holding the nodes and the root chain.
/// * `V` - Type of the stored values.
pub struct Tree<const HASH_SIZE: usize, H: Hasher<HASH_SIZE> + Clone, S, V> {
    config: Config<HASH_SIZE, H>,
    storage: S,
    writer: Mutex<()>,
    _phantom: PhantomData<fn() -> V>,
}

impl<const HASH_SIZE: usize, H, S, V> Tree<HASH_SIZE, H, S, V>
where
    H: Hasher<HASH_SIZE> + Clone,
    S: StorageEngine<HASH_SIZE>,
    V: Serialize + DeserializeOwned,
{
    pub fn new(config: Config<HASH_SIZE, H>, storage: S) -> Self {
        Self {
            config,
            storage,
            writer: Mutex::new(()),
            _phantom: PhantomData,
        }
    }

    pub fn config(&self) -> &Config<HASH_SIZE, H> {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Hash of the latest committed root, `None` for a tree that was never written.
    pub fn latest_root(&self) -> Result<Option<[u8; HASH_SIZE]>, TreeError<S::DbError>> {
        self.storage.lookup_root()
    }

    /// Value stored under `key` in the latest version of the tree.
    pub fn get(&self, key: &[u8]) -> Result<Option<V>, TreeError<S::DbError>> {
        match self.latest_root()? {
            Some(root) => self.get_at(&root, key),
            None => {
                self.config.check_key(key)?;
                Ok(None)
            }
        }
    }

    /// Value stored under `key` in the version of the tree rooted at `root`.
    pub fn get_at(
        &self,
        root: &[u8; HASH_SIZE],
        key: &[u8],
    ) -> Result<Option<V>, TreeError<S::DbError>> {
        self.config.check_key(key)?;
        let path = self.walk_down(root, key)?;
        Ok(Self::value_at_end(&path, key)?)
    }

    /// Value stored under `key` in the latest version, with a proof of that answer.
    pub fn get_with_proof(
        &self,
        key: &[u8],
    ) -> Result<(Option<V>, Proof<HASH_SIZE>), TreeError<S::DbError>> {
        let root = self.latest_root()?.ok_or(TreeError::NoLatestRoot)?;
        self.get_with_proof_at(&root, key)
    }

    /// Value stored under `key` in the version rooted at `root`, with a proof of that answer.
    ///
    /// The proof covers both outcomes: when the key is absent it shows that the path to the key
    /// ends on a leaf without it or on an empty child slot.
    pub fn get_with_proof_at(
        &self,
        root: &[u8; HASH_SIZE],
        key: &[u8],
    ) -> Result<(Option<V>, Proof<HASH_SIZE>), TreeError<S::DbError>> {
        self.config.check_key(key)?;
        let path = self.walk_down(root, key)?;
        let value = Self::value_at_end(&path, key)?;

        // Only hashes of the other values in the leaf go into the proof.
        let leaf = match path.last() {
            Some(node) if node.is_leaf() => Some(
                node.leaf_hashes::<H>()?
                    .into_iter()
                    .filter(|pair| pair.key != key)
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        };
        let depth = if leaf.is_some() {
            path.len() - 1
        } else {
            path.len()
        };
        let bits_per_index = self.config.bits_per_index();
        let empty_hash = self.config.empty_hash();
        let siblings = path
            .iter()
            .zip(self.config.get_sibling_positions_on_path_to_key(key)?)
            .take(depth)
            .map(|(parent, positions)| {
                positions
                    .iter()
                    .map(|position| {
                        let index = position.deepest_child_index(bits_per_index);
                        Ok(parent.find_child_by_index(index)?.unwrap_or(empty_hash))
                    })
                    .collect::<MerkleResult<Vec<_>>>()
            })
            .collect::<MerkleResult<Vec<_>>>()?;
        let prev_root = path.first().and_then(|node| node.prev_root().copied());

        debug!(
            target: LOG_TARGET,
            "proof for key {} at root {}: depth {}, {}",
            hex::encode(key),
            hex::encode(root),
            depth,
            if value.is_some() { "present" } else { "absent" }
        );
        Ok((value, Proof::new(siblings, leaf, prev_root)))
    }

    /// Roots of every version up to the one rooted at `root`, oldest first, found by following
    /// the `prev_root` links. The root of version `n` sits at index `n - 1`.
    pub fn root_chain(
        &self,
        root: &[u8; HASH_SIZE],
    ) -> Result<Vec<[u8; HASH_SIZE]>, TreeError<S::DbError>> {
        let mut chain = vec![*root];
        let mut next = self.fetch_node(root)?.prev_root().copied();
        while let Some(prev) = next {
            chain.push(prev);
            next = self.fetch_node(&prev)?.prev_root().copied();
        }
        chain.reverse();
        Ok(chain)
    }

    /// Number of committed versions, which is also the sequence number of the latest one.
    pub fn version_count(&self) -> Result<u64, TreeError<S::DbError>> {
        match self.latest_root()? {
            Some(root) => Ok(self.root_chain(&root)?.len() as u64),
            None => Ok(0),
        }
    }

    /// Root of the version with sequence number `seqno`, counting the first commit as 1.
    pub fn root_at_seqno(
        &self,
        seqno: u64,
    ) -> Result<Option<[u8; HASH_SIZE]>, TreeError<S::DbError>> {
        let Some(latest) = self.latest_root()? else {
            return Ok(None);
        };
        let chain = self.root_chain(&latest)?;
        let index = usize::try_from(seqno).ok().and_then(|seqno| seqno.checked_sub(1));
        Ok(index.and_then(|index| chain.get(index).copied()))
    }

    /// Value stored under `key` in the version with sequence number `seqno`, `None` when either
    /// is missing.
    pub fn get_at_seqno(
        &self,
        seqno: u64,
        key: &[u8],
    ) -> Result<Option<V>, TreeError<S::DbError>> {
        self.config.check_key(key)?;
        match self.root_at_seqno(seqno)? {
            Some(root) => self.get_at(&root, key),
            None => Ok(None),
        }
    }

    /// Nodes on the path from `root` towards `key`.
    ///
    /// The path ends on the leaf covering `key`, or on the interior node whose child slot for
    /// `key` is empty.
    fn walk_down(
        &self,
        root: &[u8; HASH_SIZE],
        key: &[u8],
    ) -> Result<Vec<Node<HASH_SIZE>>, TreeError<S::DbError>> {
        let mut path = Vec::new();
        let mut node = self.fetch_node(root)?;
        let mut level = 0;
        loop {
            if node.is_leaf() {
                path.push(node);
                return Ok(path);
            }
            self.check_interior(&node, level)?;
            let index = self.config.child_index_for_key(key, level);
            let child = node.find_child_by_index(index)?;
            path.push(node);
            match child {
                Some(hash) => {
                    trace!(
                        target: LOG_TARGET,
                        "level {}: child {} -> {}",
                        level,
                        index,
                        hex::encode(hash)
                    );
                    node = self.fetch_node(&hash)?;
                }
                None => return Ok(path),
            }
            level += 1;
        }
    }

    /// Interior nodes must have one slot per child index, and none may sit at the deepest level
    /// since keys have no bits left to route on there.
    fn check_interior(&self, node: &Node<HASH_SIZE>, level: usize) -> MerkleResult<()> {
        if node.arity() != Some(self.config.children_per_node()) || level >= self.config.max_depth()
        {
            return Err(MerkleError::BadINode);
        }
        Ok(())
    }

    /// Loads the node stored under `hash`, checking that its bytes are the canonical encoding of a
    /// node hashing back to `hash`.
    fn fetch_node(&self, hash: &[u8; HASH_SIZE]) -> Result<Node<HASH_SIZE>, TreeError<S::DbError>> {
        let bytes = self.storage.lookup_node(hash)?;
        let node = match Node::decode(&bytes) {
            Ok(node) if node.encode()? == bytes && node.hash::<H>()? == *hash => node,
            _ => {
                warn!(
                    target: LOG_TARGET,
                    "node {} does not match its stored bytes",
                    hex::encode(hash)
                );
                return Err(TreeError::HashMismatch(hash.to_vec()));
            }
        };
        Ok(node)
    }

    fn value_at_end(path: &[Node<HASH_SIZE>], key: &[u8]) -> MerkleResult<Option<V>> {
        match path.last() {
            Some(node) if node.is_leaf() => node
                .find_value_in_leaf(key)?
                .map(codec::decode)
                .transpose(),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod test {
    use sha2::Sha256;

    use super::Tree;
    use crate::{Config, MemoryDb, MerkleError, Proof, StorageEngine, TreeError};

    type TestTree = Tree<32, Sha256, MemoryDb<32>, String>;

    fn tree(children: usize, values_per_leaf: usize) -> TestTree {
        Tree::new(
            Config::new(children, values_per_leaf, 2).unwrap(),
            MemoryDb::new(),
        )
    }

    #[test]
    fn test_empty_tree() {
        let tree = tree(4, 2);
        assert_eq!(tree.latest_root().unwrap(), None);
        assert_eq!(tree.get(&[0, 0]).unwrap(), None);
        assert_eq!(
            tree.get_with_proof(&[0, 0]).unwrap_err(),
            TreeError::NoLatestRoot
        );
    }

    #[test]
    fn test_walk_down_stops_on_empty_slot() {
        let tree = tree(4, 1);
        tree.put(&[0x00, 0x00], &"a".to_string(), ()).unwrap();
        let root = tree.put(&[0x40, 0x00], &"b".to_string(), ()).unwrap();
        // Both keys live under different children of the root, so 0xc0.. reaches an empty slot.
        let path = tree.walk_down(&root, &[0xc0, 0x00]).unwrap();
        assert_eq!(path.len(), 1);
        assert!(!path[0].is_leaf());
        let path = tree.walk_down(&root, &[0x40, 0x00]).unwrap();
        assert_eq!(path.len(), 2);
        assert!(path[1].is_leaf());
    }

    #[test]
    fn test_fetch_node_checks_hash() {
        let tree = tree(4, 2);
        let root = tree.put(&[1, 2], &"a".to_string(), ()).unwrap();
        let bogus = [7u8; 32];
        tree.storage()
            .store_node(bogus, tree.storage().lookup_node(&root).unwrap())
            .unwrap();
        assert_eq!(
            tree.fetch_node(&bogus).unwrap_err(),
            TreeError::HashMismatch(bogus.to_vec())
        );
        assert_eq!(
            tree.get_at(&[8u8; 32], &[1, 2]).unwrap_err(),
            TreeError::NodeNotFound(vec![8u8; 32])
        );
    }

    #[test]
    fn test_fetch_node_rejects_non_canonical_bytes() {
        let tree = tree(4, 2);
        let root = tree.put(&[1, 2], &"a".to_string(), ()).unwrap();
        let mut bytes = tree.storage().lookup_node(&root).unwrap();
        bytes.push(0);
        let padded = [6u8; 32];
        tree.storage().store_node(padded, bytes).unwrap();
        assert_eq!(
            tree.fetch_node(&padded).unwrap_err(),
            TreeError::HashMismatch(padded.to_vec())
        );
    }

    #[test]
    fn test_get_with_proof_at_returns_single_hash_proof() {
        let tree = tree(4, 2);
        let root = tree.put(&[1, 2], &"a".to_string(), ()).unwrap();
        let (value, proof): (Option<String>, Proof<32>) =
            tree.get_with_proof_at(&root, &[1, 2]).unwrap();
        assert_eq!(value.as_deref(), Some("a"));
        assert_eq!(proof.depth(), 0);
        proof
            .verify_merkle_proof(tree.config(), &[1, 2], value.as_ref(), &root)
            .unwrap();
    }

    #[test]
    fn test_versions_are_numbered_from_one() {
        let tree = tree(4, 2);
        assert_eq!(tree.version_count().unwrap(), 0);
        assert_eq!(tree.root_at_seqno(1).unwrap(), None);
        assert_eq!(tree.get_at_seqno(1, &[1, 2]).unwrap(), None);

        let r1 = tree.put(&[1, 2], &"a".to_string(), ()).unwrap();
        let r2 = tree.put(&[1, 2], &"b".to_string(), ()).unwrap();
        let r3 = tree.put(&[3, 4], &"c".to_string(), ()).unwrap();
        assert_eq!(tree.version_count().unwrap(), 3);
        assert_eq!(tree.root_chain(&r3).unwrap(), vec![r1, r2, r3]);
        assert_eq!(tree.root_chain(&r2).unwrap(), vec![r1, r2]);
        assert_eq!(
            tree.root_chain(&r3).unwrap(),
            tree.storage().root_history().unwrap()
        );

        assert_eq!(tree.root_at_seqno(0).unwrap(), None);
        assert_eq!(tree.root_at_seqno(1).unwrap(), Some(r1));
        assert_eq!(tree.root_at_seqno(3).unwrap(), Some(r3));
        assert_eq!(tree.root_at_seqno(4).unwrap(), None);
        assert_eq!(tree.get_at_seqno(1, &[1, 2]).unwrap().as_deref(), Some("a"));
        assert_eq!(tree.get_at_seqno(2, &[1, 2]).unwrap().as_deref(), Some("b"));
        assert_eq!(tree.get_at_seqno(2, &[3, 4]).unwrap(), None);
        assert_eq!(tree.get_at_seqno(3, &[3, 4]).unwrap().as_deref(), Some("c"));
        assert!(matches!(
            tree.get_at_seqno(9, &[1]).unwrap_err(),
            TreeError::Merkle(MerkleError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn test_rejects_interior_with_wrong_arity() {
        let tree = tree(4, 1);
        let (hash, _, bytes) = crate::Node::<32>::new_interior(2)
            .export::<Sha256>(None, 0)
            .unwrap();
        tree.storage().store_node(hash, bytes).unwrap();
        assert_eq!(
            tree.get_at(&hash, &[0, 0]).unwrap_err(),
            TreeError::Merkle(MerkleError::BadINode)
        );
    }

    #[test]
    fn test_get_rejects_bad_key() {
        let tree = tree(4, 2);
        assert_eq!(
            tree.get(&[1, 2, 3]).unwrap_err(),
            TreeError::Merkle(MerkleError::InvalidKeyLength {
                expected: 2,
                got: 3
            })
        );
    }
}
