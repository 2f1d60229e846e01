//! Proofs are used to check a lookup against a root hash without access to the tree.
//!
//! A proof holds, for every level between the root and the end of the path to a key, the hashes of
//! the siblings of the node on the path, plus the other entries of the leaf the path ends on, if
//! any. Those entries are key/hash pairs, so a proof never reveals the values stored next to the
//! proven key. Empty siblings are recorded as the config's `empty_hash()`.
//!
//! A proof can be compressed by dropping the empty siblings and recording their slots in a
//! bitvector. A compressed proof can be decompressed into a proof.

use bitvec::{order::Lsb0, vec::BitVec};
use serde::{Deserialize, Serialize};

use crate::{
    codec,
    config::Config,
    node::{self, Hasher, KeyHashPair, Node},
    serde_support, MerkleError, MerkleResult,
};

fn invalid(reason: impl Into<String>) -> MerkleError {
    MerkleError::InvalidMerkleProof(reason.into())
}

/// A merkle proof for a given key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof<const HASH_SIZE: usize> {
    /// Sibling hashes per level, root first, `children_per_node - 1` per level in index order.
    #[serde(with = "serde_support::hash_levels")]
    siblings: Vec<Vec<[u8; HASH_SIZE]>>,
    /// Entries of the leaf the path ends on other than the proven key, in key order. `None` when
    /// the path ends on an empty child slot.
    leaf: Option<Vec<KeyHashPair<HASH_SIZE>>>,
    /// Root the proven version replaced.
    #[serde(with = "serde_support::opt_hash")]
    prev_root: Option<[u8; HASH_SIZE]>,
}

impl<const HASH_SIZE: usize> Proof<HASH_SIZE> {
    pub fn new(
        siblings: Vec<Vec<[u8; HASH_SIZE]>>,
        leaf: Option<Vec<KeyHashPair<HASH_SIZE>>>,
        prev_root: Option<[u8; HASH_SIZE]>,
    ) -> Self {
        Self {
            siblings,
            leaf,
            prev_root,
        }
    }

    pub fn siblings(&self) -> &[Vec<[u8; HASH_SIZE]>] {
        &self.siblings
    }

    /// Other entries of the terminal leaf, `None` when the path ends on an empty slot.
    pub fn leaf_pairs(&self) -> Option<&[KeyHashPair<HASH_SIZE>]> {
        self.leaf.as_deref()
    }

    pub fn prev_root(&self) -> Option<&[u8; HASH_SIZE]> {
        self.prev_root.as_ref()
    }

    /// Number of interior nodes crossed from the root to the end of the path.
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Compresses the proof into a compressed proof.
    pub fn compress<H: Hasher<HASH_SIZE> + Clone>(
        &self,
        config: &Config<HASH_SIZE, H>,
    ) -> CompressedProof<HASH_SIZE> {
        let empty_hash = config.empty_hash();
        let mut empty = BitVec::with_capacity(self.siblings.iter().map(Vec::len).sum());
        let mut hashes = Vec::new();
        for hash in self.siblings.iter().flatten() {
            if *hash == empty_hash {
                empty.push(true);
            } else {
                empty.push(false);
                hashes.push(*hash);
            }
        }
        CompressedProof {
            hashes,
            empty,
            leaf: self.leaf.clone(),
            prev_root: self.prev_root,
        }
    }

    /// Verify a merkle proof for a given key.
    ///
    /// # Arguments
    ///
    /// * `config` - Parameters of the tree the proof was taken from
    /// * `key` - The key the proof is about
    /// * `value` - The value expected under `key`, `None` to check that `key` is absent
    /// * `root_hash` - The expected root of the tree
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` if the proof is valid, otherwise returns an error.
    pub fn verify_merkle_proof<H: Hasher<HASH_SIZE> + Clone, V: Serialize>(
        &self,
        config: &Config<HASH_SIZE, H>,
        key: &[u8],
        value: Option<&V>,
        root_hash: &[u8; HASH_SIZE],
    ) -> MerkleResult<()> {
        config.check_key(key)?;
        let depth = self.depth();
        if depth > config.max_depth() {
            return Err(invalid(format!(
                "{depth} levels for a tree of depth {}",
                config.max_depth()
            )));
        }
        if self
            .siblings
            .iter()
            .any(|level| level.len() != config.children_per_node() - 1)
        {
            return Err(invalid("wrong number of siblings"));
        }

        // Hash of the node at the end of the path, `None` for an empty slot.
        let mut current = match &self.leaf {
            Some(others) => {
                let terminal = config.get_position_on_path_to_key_at_level(key, depth)?;
                if let Some(stray) = others.iter().find(|pair| {
                    pair.key.len() != config.keys_byte_length()
                        || !config.is_position_on_path_to_key(&terminal, &pair.key)
                }) {
                    return Err(invalid(format!(
                        "leaf holds key {} which does not belong at {}",
                        hex::encode(&stray.key),
                        terminal
                    )));
                }
                if others.windows(2).any(|window| window[0].key >= window[1].key) {
                    return Err(invalid("leaf entries are not in key order"));
                }
                if others.iter().any(|pair| pair.key == key) {
                    return Err(invalid("proven key is listed among the other entries"));
                }
                let mut pairs = others.clone();
                if let Some(value) = value {
                    let at = pairs.partition_point(|pair| pair.key.as_slice() < key);
                    pairs.insert(
                        at,
                        KeyHashPair {
                            key: key.to_vec(),
                            hash: H::hash(&codec::encode(value)?),
                        },
                    );
                }
                let prev_root = if depth == 0 { self.prev_root } else { None };
                Some(node::hash_leaf::<HASH_SIZE, H>(pairs, prev_root)?)
            }
            None => {
                if value.is_some() {
                    return Err(invalid("no leaf to hold the value"));
                }
                if depth == 0 {
                    return Err(invalid("empty path"));
                }
                None
            }
        };

        let empty_hash = config.empty_hash();
        for (level, hashes) in self.siblings.iter().enumerate().rev() {
            let on_path = config.child_index_for_key(key, level);
            let mut siblings = hashes.iter().copied();
            let mut node = Node::new_interior(config.children_per_node());
            for index in 0..config.children_per_node() {
                let slot = if index == on_path {
                    current
                } else {
                    siblings.next().filter(|hash| *hash != empty_hash)
                };
                node.set_child(index, slot)?;
            }
            let (hash, _, _) = node.export::<H>(self.prev_root, level)?;
            current = Some(hash);
        }

        if current.as_ref() != Some(root_hash) {
            return Err(invalid("root mismatch"));
        }
        Ok(())
    }
}

/// A compressed merkle proof for a given key.
/// We don't store the sibling hashes that stand for empty subtrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedProof<const HASH_SIZE: usize> {
    #[serde(with = "serde_support::hash_vec")]
    hashes: Vec<[u8; HASH_SIZE]>,
    /// One bit per sibling slot, root first; set when the sibling is empty.
    empty: BitVec<u8, Lsb0>,
    leaf: Option<Vec<KeyHashPair<HASH_SIZE>>>,
    #[serde(with = "serde_support::opt_hash")]
    prev_root: Option<[u8; HASH_SIZE]>,
}

impl<const HASH_SIZE: usize> CompressedProof<HASH_SIZE> {
    /// Number of non-empty sibling hashes kept.
    pub fn hash_count(&self) -> usize {
        self.hashes.len()
    }

    /// Decompresses the proof into a proof.
    pub fn decompress<H: Hasher<HASH_SIZE> + Clone>(
        &self,
        config: &Config<HASH_SIZE, H>,
    ) -> MerkleResult<Proof<HASH_SIZE>> {
        let per_level = config.children_per_node() - 1;
        if self.empty.len() % per_level != 0 {
            return Err(invalid(format!(
                "{} sibling slots do not fill levels of {per_level}",
                self.empty.len()
            )));
        }
        if self.hashes.len() != self.empty.count_zeros() {
            return Err(invalid(format!(
                "{} hashes for {} non-empty siblings",
                self.hashes.len(),
                self.empty.count_zeros()
            )));
        }
        let empty_hash = config.empty_hash();
        let mut hashes = self.hashes.iter().copied();
        let mut siblings = Vec::with_capacity(self.empty.len() / per_level);
        for chunk in self.empty.chunks(per_level) {
            siblings.push(
                chunk
                    .iter()
                    .by_vals()
                    .map(|is_empty| {
                        if is_empty {
                            Some(empty_hash)
                        } else {
                            hashes.next()
                        }
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| invalid("ran out of hashes"))?,
            );
        }
        Ok(Proof::new(siblings, self.leaf.clone(), self.prev_root))
    }

    /// Encodes the proof into a byte vector.
    pub fn encode(&self) -> MerkleResult<Vec<u8>> {
        codec::encode(self)
    }

    /// Decodes a proof from a byte vector.
    pub fn decode(data: &[u8]) -> MerkleResult<Self> {
        codec::decode(data)
    }
}
