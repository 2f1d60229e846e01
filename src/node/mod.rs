mod sorted_map;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt::Display;

pub use sorted_map::{KeyValuePair, SortedMap};

use crate::{codec, serde_support, MerkleError, MerkleResult};

/// Identifies one of an interior node's children.
pub type ChildIndex = usize;

/// Simple hash trait required to hash the nodes in the tree
///
/// # Type Parameters
/// * `HASH_SIZE` - The size of the hash digest in bytes
pub trait Hasher<const HASH_SIZE: usize> {
    fn hash(data: &[u8]) -> [u8; HASH_SIZE];
}

impl Hasher<32> for Sha256 {
    fn hash(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}

impl Hasher<64> for Sha512 {
    fn hash(data: &[u8]) -> [u8; 64] {
        let mut hasher = Sha512::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}

/// A leaf entry as it is hashed and proven: the key with the hash of its encoded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHashPair<const HASH_SIZE: usize> {
    pub key: Vec<u8>,
    #[serde(with = "serde_support::hash")]
    pub hash: [u8; HASH_SIZE],
}

/// What a node hash commits to. Leaf values only enter through their hashes, so a proof can
/// show a leaf without revealing the values of the other keys in it.
#[derive(Serialize)]
enum HashedBody<const HASH_SIZE: usize> {
    Interior(#[serde(with = "serde_support::hash_slots")] Vec<Option<[u8; HASH_SIZE]>>),
    Leaf(Vec<KeyHashPair<HASH_SIZE>>),
}

#[derive(Serialize)]
struct HashedNode<const HASH_SIZE: usize> {
    #[serde(with = "serde_support::opt_hash")]
    prev_root: Option<[u8; HASH_SIZE]>,
    body: HashedBody<HASH_SIZE>,
}

impl<const HASH_SIZE: usize> HashedNode<HASH_SIZE> {
    fn hash<H: Hasher<HASH_SIZE>>(&self) -> MerkleResult<[u8; HASH_SIZE]> {
        Ok(H::hash(&codec::encode(self)?))
    }
}

/// Hash of a leaf given as key/hash pairs in key order.
pub(crate) fn hash_leaf<const HASH_SIZE: usize, H: Hasher<HASH_SIZE>>(
    pairs: Vec<KeyHashPair<HASH_SIZE>>,
    prev_root: Option<[u8; HASH_SIZE]>,
) -> MerkleResult<[u8; HASH_SIZE]> {
    HashedNode {
        prev_root,
        body: HashedBody::Leaf(pairs),
    }
    .hash::<H>()
}

/// Contents of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeBody<const HASH_SIZE: usize> {
    /// One slot per child index; `None` when that subtree does not exist.
    Interior(#[serde(with = "serde_support::hash_slots")] Vec<Option<[u8; HASH_SIZE]>>),
    /// The key/value pairs living at this position.
    Leaf(SortedMap),
}

/// The unit the tree stores and hashes.
///
/// A node is identified by [`Node::hash`] and stored as its canonical encoding. Only a root node carries
/// `prev_root`, linking a tree version to the one it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node<const HASH_SIZE: usize> {
    #[serde(with = "serde_support::opt_hash")]
    prev_root: Option<[u8; HASH_SIZE]>,
    body: NodeBody<HASH_SIZE>,
}

impl<const HASH_SIZE: usize> Node<HASH_SIZE> {
    /// Creates an interior node with `children_per_node` empty slots.
    pub fn new_interior(children_per_node: usize) -> Self {
        Self {
            prev_root: None,
            body: NodeBody::Interior(vec![None; children_per_node]),
        }
    }

    pub fn new_leaf(pairs: SortedMap) -> Self {
        Self {
            prev_root: None,
            body: NodeBody::Leaf(pairs),
        }
    }

    pub fn prev_root(&self) -> Option<&[u8; HASH_SIZE]> {
        self.prev_root.as_ref()
    }

    pub fn body(&self) -> &NodeBody<HASH_SIZE> {
        &self.body
    }

    pub fn into_body(self) -> NodeBody<HASH_SIZE> {
        self.body
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    /// Number of child slots, `None` for a leaf.
    pub fn arity(&self) -> Option<usize> {
        match &self.body {
            NodeBody::Interior(children) => Some(children.len()),
            NodeBody::Leaf(_) => None,
        }
    }

    /// Hash stored in the child slot `index`, `None` if that subtree is absent.
    pub fn find_child_by_index(&self, index: ChildIndex) -> MerkleResult<Option<[u8; HASH_SIZE]>> {
        match &self.body {
            NodeBody::Interior(children) if !children.is_empty() => {
                children
                    .get(index)
                    .copied()
                    .ok_or(MerkleError::BadChildPointer {
                        index,
                        arity: children.len(),
                    })
            }
            _ => Err(MerkleError::BadINode),
        }
    }

    pub fn set_child(
        &mut self,
        index: ChildIndex,
        hash: Option<[u8; HASH_SIZE]>,
    ) -> MerkleResult<()> {
        match &mut self.body {
            NodeBody::Interior(children) => {
                let arity = children.len();
                let slot = children
                    .get_mut(index)
                    .ok_or(MerkleError::BadChildPointer { index, arity })?;
                *slot = hash;
                Ok(())
            }
            NodeBody::Leaf(_) => Err(MerkleError::BadINode),
        }
    }

    /// Encoded value stored under `key` in this leaf.
    pub fn find_value_in_leaf(&self, key: &[u8]) -> MerkleResult<Option<&[u8]>> {
        match &self.body {
            NodeBody::Leaf(pairs) => Ok(pairs.find(key).map(|kvp| kvp.value.as_slice())),
            NodeBody::Interior(_) => Err(MerkleError::ExpectedLeaf),
        }
    }

    /// Entries of this leaf with their values replaced by value hashes.
    pub fn leaf_hashes<H: Hasher<HASH_SIZE>>(&self) -> MerkleResult<Vec<KeyHashPair<HASH_SIZE>>> {
        match &self.body {
            NodeBody::Leaf(pairs) => Ok(pairs
                .iter()
                .map(|pair| KeyHashPair {
                    key: pair.key.clone(),
                    hash: H::hash(&pair.value),
                })
                .collect()),
            NodeBody::Interior(_) => Err(MerkleError::ExpectedLeaf),
        }
    }

    /// Hash identifying the node.
    ///
    /// Interior nodes hash their child slots, leaves hash their keys with the hashes of their
    /// values. Both forms start with `prev_root`.
    pub fn hash<H: Hasher<HASH_SIZE>>(&self) -> MerkleResult<[u8; HASH_SIZE]> {
        match &self.body {
            NodeBody::Interior(children) => HashedNode {
                prev_root: self.prev_root,
                body: HashedBody::Interior(children.clone()),
            }
            .hash::<H>(),
            NodeBody::Leaf(_) => {
                hash_leaf::<HASH_SIZE, H>(self.leaf_hashes::<H>()?, self.prev_root)
            }
        }
    }

    /// Canonical bytes of the node, as stored.
    pub fn encode(&self) -> MerkleResult<Vec<u8>> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> MerkleResult<Self> {
        codec::decode(bytes)
    }

    /// Serializes and hashes the node for storage at `level`.
    ///
    /// A root (`level == 0`) is chained to `prev_root` when one is given. Returns the node's hash,
    /// the node itself and the bytes to persist under that hash.
    pub fn export<H: Hasher<HASH_SIZE>>(
        mut self,
        prev_root: Option<[u8; HASH_SIZE]>,
        level: usize,
    ) -> MerkleResult<([u8; HASH_SIZE], Self, Vec<u8>)> {
        if level == 0 && prev_root.is_some() {
            self.prev_root = prev_root;
        }
        let bytes = self.encode()?;
        Ok((self.hash::<H>()?, self, bytes))
    }
}

impl<const HASH_SIZE: usize> From<NodeBody<HASH_SIZE>> for Node<HASH_SIZE> {
    fn from(body: NodeBody<HASH_SIZE>) -> Self {
        Self {
            prev_root: None,
            body,
        }
    }
}

impl<const HASH_SIZE: usize> Display for Node<HASH_SIZE> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.body {
            NodeBody::Interior(children) => {
                write!(f, "Interior {{ children: [")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match child {
                        Some(hash) => write!(f, "{}", hex::encode(hash))?,
                        None => write!(f, "_")?,
                    }
                }
                write!(f, "]")?;
            }
            NodeBody::Leaf(pairs) => write!(f, "Leaf {{ pairs: {}", pairs)?,
        }
        if let Some(prev) = &self.prev_root {
            write!(f, ", prev_root: {}", hex::encode(prev))?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;
    use sha2::{Sha256, Sha512};

    use super::{Hasher, KeyHashPair, KeyValuePair, Node, NodeBody, SortedMap};
    use crate::MerkleError;

    fn leaf(pairs: &[(&str, &str)]) -> Node<32> {
        let mut map = SortedMap::new();
        for (key, value) in pairs {
            map.replace(KeyValuePair::new(key.as_bytes().to_vec(), value.as_bytes().to_vec()));
        }
        Node::new_leaf(map)
    }

    #[test]
    fn test_sha_hashers() {
        assert_eq!(
            <Sha256 as Hasher<32>>::hash(b""),
            hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
        assert_eq!(
            <Sha512 as Hasher<64>>::hash(b"")[..8],
            hex!("cf83e1357eefb8bd")
        );
    }

    #[test]
    fn test_export_chains_only_the_root() {
        let prev = [7u8; 32];
        let (root_hash, root, root_bytes) =
            leaf(&[("k", "v")]).export::<Sha256>(Some(prev), 0).unwrap();
        assert_eq!(root.prev_root(), Some(&prev));
        assert_eq!(Node::<32>::decode(&root_bytes).unwrap(), root);
        assert_eq!(root.hash::<Sha256>().unwrap(), root_hash);

        let (child_hash, child, _) =
            leaf(&[("k", "v")]).export::<Sha256>(Some(prev), 1).unwrap();
        assert_eq!(child.prev_root(), None);
        assert_ne!(child_hash, root_hash);

        let (unchained, _, _) = leaf(&[("k", "v")]).export::<Sha256>(None, 0).unwrap();
        assert_eq!(unchained, child_hash);
    }

    #[test]
    fn test_leaf_hash_commits_to_value_hashes() {
        let node = leaf(&[("a", "1"), ("b", "2")]);
        let pairs = node.leaf_hashes::<Sha256>().unwrap();
        assert_eq!(
            pairs,
            vec![
                KeyHashPair {
                    key: b"a".to_vec(),
                    hash: <Sha256 as Hasher<32>>::hash(b"1"),
                },
                KeyHashPair {
                    key: b"b".to_vec(),
                    hash: <Sha256 as Hasher<32>>::hash(b"2"),
                },
            ]
        );
        // Anyone holding only the key/hash pairs gets the same node hash.
        assert_eq!(
            super::hash_leaf::<32, Sha256>(pairs, None).unwrap(),
            node.hash::<Sha256>().unwrap()
        );
        assert_ne!(
            leaf(&[("a", "1"), ("b", "3")]).hash::<Sha256>().unwrap(),
            node.hash::<Sha256>().unwrap()
        );
        assert_eq!(
            Node::<32>::new_interior(2).leaf_hashes::<Sha256>(),
            Err(MerkleError::ExpectedLeaf)
        );
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let mut interior = Node::<32>::new_interior(4);
        interior.set_child(1, Some([1; 32])).unwrap();
        interior.set_child(3, Some([3; 32])).unwrap();
        let (_, interior, _) = interior.export::<Sha256>(Some([9; 32]), 0).unwrap();
        for node in [interior, leaf(&[("a", "1"), ("b", "2")])] {
            let bytes = node.encode().unwrap();
            let decoded = Node::<32>::decode(&bytes).unwrap();
            assert_eq!(decoded, node);
            assert_eq!(decoded.encode().unwrap(), bytes);
        }
    }

    #[test]
    fn test_find_child_by_index() {
        let mut node = Node::<32>::new_interior(4);
        node.set_child(2, Some([2; 32])).unwrap();
        assert_eq!(node.find_child_by_index(2), Ok(Some([2; 32])));
        assert_eq!(node.find_child_by_index(0), Ok(None));
        assert_eq!(
            node.find_child_by_index(4),
            Err(MerkleError::BadChildPointer { index: 4, arity: 4 })
        );
        assert_eq!(
            leaf(&[]).find_child_by_index(0),
            Err(MerkleError::BadINode)
        );
        assert_eq!(
            Node::<32>::new_interior(0).find_child_by_index(0),
            Err(MerkleError::BadINode)
        );
    }

    #[test]
    fn test_find_value_in_leaf() {
        let node = leaf(&[("a", "1"), ("c", "3")]);
        assert_eq!(node.find_value_in_leaf(b"c"), Ok(Some(&b"3"[..])));
        assert_eq!(node.find_value_in_leaf(b"b"), Ok(None));
        assert_eq!(
            Node::<32>::new_interior(2).find_value_in_leaf(b"a"),
            Err(MerkleError::ExpectedLeaf)
        );
    }

    #[test]
    fn test_interior_and_leaf_never_share_bytes() {
        let interior = Node::<32>::new_interior(2).encode().unwrap();
        let empty_leaf = leaf(&[]).encode().unwrap();
        assert_ne!(interior, empty_leaf);
        assert!(matches!(
            Node::<32>::decode(&interior).unwrap().body(),
            NodeBody::Interior(_)
        ));
    }

    #[test]
    fn test_node_display() {
        let mut node = Node::<4>::new_interior(2);
        node.set_child(1, Some([0xaa; 4])).unwrap();
        assert_eq!(format!("{}", node), "Interior { children: [_, aaaaaaaa] }");
        let (_, node, _) = node.export::<Trunc>(Some([1, 2, 3, 4]), 0).unwrap();
        assert_eq!(
            format!("{}", node),
            "Interior { children: [_, aaaaaaaa], prev_root: 01020304 }"
        );
    }

    #[derive(Clone)]
    struct Trunc;

    impl Hasher<4> for Trunc {
        fn hash(data: &[u8]) -> [u8; 4] {
            let digest = <Sha256 as Hasher<32>>::hash(data);
            [digest[0], digest[1], digest[2], digest[3]]
        }
    }
}
