//! Write path: leaves absorb new pairs and split once they overflow, then every node on the
//! touched paths is re-exported bottom-up and the new root is committed.

use std::sync::PoisonError;

use log::debug;
use serde::{de::DeserializeOwned, Serialize};

use super::{Tree, LOG_TARGET};
use crate::{
    codec,
    db::StorageEngine,
    node::{Hasher, KeyValuePair, Node, NodeBody, SortedMap},
    TreeError,
};

impl<const HASH_SIZE: usize, H, S, V> Tree<HASH_SIZE, H, S, V>
where
    H: Hasher<HASH_SIZE> + Clone,
    S: StorageEngine<HASH_SIZE>,
    V: Serialize + DeserializeOwned,
{
    /// Stores `value` under `key` and commits the result as the new latest root.
    pub fn put(
        &self,
        key: &[u8],
        value: &V,
        tx_info: S::TxInfo,
    ) -> Result<[u8; HASH_SIZE], TreeError<S::DbError>> {
        self.config.check_key(key)?;
        let pair = KeyValuePair::new(key.to_vec(), codec::encode(value)?);
        self.commit(vec![pair], tx_info)
    }

    /// Applies every pair in order and commits a single new root.
    ///
    /// A later pair wins over an earlier one with the same key. An empty batch still commits a
    /// new version chained to the previous root.
    pub fn put_batch<K: AsRef<[u8]>>(
        &self,
        pairs: &[(K, V)],
        tx_info: S::TxInfo,
    ) -> Result<[u8; HASH_SIZE], TreeError<S::DbError>> {
        let pairs = pairs
            .iter()
            .map(|(key, value)| {
                let key = key.as_ref();
                self.config.check_key(key)?;
                Ok(KeyValuePair::new(key.to_vec(), codec::encode(value)?))
            })
            .collect::<Result<Vec<_>, TreeError<S::DbError>>>()?;
        self.commit(pairs, tx_info)
    }

    fn commit(
        &self,
        pairs: Vec<KeyValuePair>,
        tx_info: S::TxInfo,
    ) -> Result<[u8; HASH_SIZE], TreeError<S::DbError>> {
        // Nothing guarded: the lock only serializes writers.
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let prev_root = self.storage.lookup_root()?;
        let mut root = match &prev_root {
            Some(hash) => self.fetch_node(hash)?,
            None => Node::new_leaf(SortedMap::new()),
        };
        let count = pairs.len();
        for pair in pairs {
            root = self.insert_into(root, 0, pair)?;
        }

        let (root_hash, _, bytes) = root.export::<H>(prev_root, 0)?;
        self.storage.store_node(root_hash, bytes)?;
        self.storage
            .commit_root(prev_root.as_ref(), &root_hash, tx_info)?;
        debug!(
            target: LOG_TARGET,
            "committed root {} ({} pairs, previous {})",
            hex::encode(root_hash),
            count,
            prev_root.map_or_else(|| "none".to_string(), hex::encode)
        );
        Ok(root_hash)
    }

    /// Inserts `pair` below `node`, which sits at `level`, and returns the updated node.
    ///
    /// Children that change are stored right away; the returned node itself is not.
    fn insert_into(
        &self,
        node: Node<HASH_SIZE>,
        level: usize,
        pair: KeyValuePair,
    ) -> Result<Node<HASH_SIZE>, TreeError<S::DbError>> {
        match node.into_body() {
            NodeBody::Leaf(mut pairs) => {
                pairs.replace(pair);
                self.split(pairs, level)
            }
            body @ NodeBody::Interior(_) => {
                let mut node = Node::from(body);
                self.check_interior(&node, level)?;
                let index = self.config.child_index_for_key(&pair.key, level);
                let child = match node.find_child_by_index(index)? {
                    Some(hash) => self.fetch_node(&hash)?,
                    None => Node::new_leaf(SortedMap::new()),
                };
                let child = self.insert_into(child, level + 1, pair)?;
                node.set_child(index, Some(self.store(child, level + 1)?))?;
                Ok(node)
            }
        }
    }

    /// Turns `pairs` into a leaf, or into a subtree if they do not fit in one leaf.
    fn split(
        &self,
        pairs: SortedMap,
        level: usize,
    ) -> Result<Node<HASH_SIZE>, TreeError<S::DbError>> {
        if pairs.len() <= self.config.values_per_leaf() || level >= self.config.max_depth() {
            return Ok(Node::new_leaf(pairs));
        }
        debug!(
            target: LOG_TARGET,
            "splitting leaf of {} pairs at level {}",
            pairs.len(),
            level
        );
        // Pairs are sorted and share the key prefix leading here, so each child's pairs are
        // a contiguous run.
        let mut node = Node::new_interior(self.config.children_per_node());
        let mut begin = 0;
        for index in 0..self.config.children_per_node() {
            let end = pairs
                .partition_point(|pair| self.config.child_index_for_key(&pair.key, level) <= index);
            if end > begin {
                let child = self.split(pairs.slice(begin, end), level + 1)?;
                node.set_child(index, Some(self.store(child, level + 1)?))?;
            }
            begin = end;
        }
        Ok(node)
    }

    fn store(
        &self,
        node: Node<HASH_SIZE>,
        level: usize,
    ) -> Result<[u8; HASH_SIZE], TreeError<S::DbError>> {
        let (hash, _, bytes) = node.export::<H>(None, level)?;
        self.storage.store_node(hash, bytes)?;
        Ok(hash)
    }
}
