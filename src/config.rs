//! Tree parameters.

use std::{fmt::Debug, marker::PhantomData};

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    node::{ChildIndex, Hasher},
    MerkleError, MerkleResult,
};

const MAX_BITS_PER_INDEX: usize = 16;

/// Immutable parameters of a tree.
///
/// # Type Parameters
/// * `HASH_SIZE` - The size of the hash digest in bytes
/// * `H` - The hasher used for every node of the tree
pub struct Config<const HASH_SIZE: usize, H: Hasher<HASH_SIZE> + Clone> {
    children_per_node: usize,
    bits_per_index: usize,
    values_per_leaf: usize,
    keys_byte_length: usize,
    max_depth: usize,
    _phantom: PhantomData<H>,
}

/// Plain tree parameters, e.g. as read from a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigParams {
    pub children_per_node: usize,
    pub values_per_leaf: usize,
    pub keys_byte_length: usize,
}

impl<const HASH_SIZE: usize, H: Hasher<HASH_SIZE> + Clone> Config<HASH_SIZE, H> {
    pub fn new(
        children_per_node: usize,
        values_per_leaf: usize,
        keys_byte_length: usize,
    ) -> MerkleResult<Self> {
        if children_per_node < 2 || !children_per_node.is_power_of_two() {
            return Err(MerkleError::InvalidConfig(format!(
                "children per node must be a power of two >= 2, got {children_per_node}"
            )));
        }
        let bits_per_index = children_per_node.trailing_zeros() as usize;
        if bits_per_index > MAX_BITS_PER_INDEX {
            return Err(MerkleError::InvalidConfig(format!(
                "at most {} children per node are supported, got {children_per_node}",
                1usize << MAX_BITS_PER_INDEX
            )));
        }
        if values_per_leaf == 0 {
            return Err(MerkleError::InvalidConfig(
                "values per leaf must be at least 1".to_string(),
            ));
        }
        if keys_byte_length == 0 || (keys_byte_length * 8) % bits_per_index != 0 {
            return Err(MerkleError::InvalidConfig(format!(
                "a {keys_byte_length}-byte key cannot be split into {bits_per_index}-bit child indices"
            )));
        }
        Ok(Self {
            children_per_node,
            bits_per_index,
            values_per_leaf,
            keys_byte_length,
            max_depth: keys_byte_length * 8 / bits_per_index,
            _phantom: PhantomData,
        })
    }

    pub fn children_per_node(&self) -> usize {
        self.children_per_node
    }

    pub fn bits_per_index(&self) -> usize {
        self.bits_per_index
    }

    pub fn values_per_leaf(&self) -> usize {
        self.values_per_leaf
    }

    pub fn keys_byte_length(&self) -> usize {
        self.keys_byte_length
    }

    /// Number of levels below the root in a maximally split tree.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Hash standing in for an absent subtree in proofs. A node is never hashed from zero bytes,
    /// so this does not collide with the hash of a stored node.
    pub fn empty_hash(&self) -> [u8; HASH_SIZE] {
        H::hash(&[])
    }

    pub fn check_key(&self, key: &[u8]) -> MerkleResult<()> {
        if key.len() != self.keys_byte_length {
            return Err(MerkleError::InvalidKeyLength {
                expected: self.keys_byte_length,
                got: key.len(),
            });
        }
        Ok(())
    }

    /// Child slot followed by `key` when leaving a node at `level`.
    pub fn child_index_for_key(&self, key: &[u8], level: usize) -> ChildIndex {
        let start = level * self.bits_per_index;
        key.view_bits::<Msb0>()[start..start + self.bits_per_index].load_be::<ChildIndex>()
    }

    pub fn params(&self) -> ConfigParams {
        ConfigParams {
            children_per_node: self.children_per_node,
            values_per_leaf: self.values_per_leaf,
            keys_byte_length: self.keys_byte_length,
        }
    }
}

impl<const HASH_SIZE: usize, H: Hasher<HASH_SIZE> + Clone> TryFrom<ConfigParams>
    for Config<HASH_SIZE, H>
{
    type Error = MerkleError;

    fn try_from(params: ConfigParams) -> Result<Self, Self::Error> {
        Self::new(
            params.children_per_node,
            params.values_per_leaf,
            params.keys_byte_length,
        )
    }
}

impl<const HASH_SIZE: usize, H: Hasher<HASH_SIZE> + Clone> Clone for Config<HASH_SIZE, H> {
    fn clone(&self) -> Self {
        Self {
            _phantom: PhantomData,
            ..*self
        }
    }
}

impl<const HASH_SIZE: usize, H: Hasher<HASH_SIZE> + Clone> Debug for Config<HASH_SIZE, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("hash_size", &HASH_SIZE)
            .field("children_per_node", &self.children_per_node)
            .field("bits_per_index", &self.bits_per_index)
            .field("values_per_leaf", &self.values_per_leaf)
            .field("keys_byte_length", &self.keys_byte_length)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use sha2::Sha256;

    use super::{Config, ConfigParams};
    use crate::MerkleError;

    #[test]
    fn test_children_must_be_power_of_two() {
        for children in [0, 1, 3, 6, 12] {
            assert!(matches!(
                Config::<32, Sha256>::new(children, 4, 4),
                Err(MerkleError::InvalidConfig(_))
            ));
        }
        for children in [2, 4, 8, 16, 256] {
            assert!(Config::<32, Sha256>::new(children, 4, 3).is_ok());
        }
    }

    #[test]
    fn test_derived_fields() {
        let config = Config::<32, Sha256>::new(16, 4, 5).unwrap();
        assert_eq!(config.bits_per_index(), 4);
        assert_eq!(config.max_depth(), 10);
        let config = Config::<32, Sha256>::new(8, 2, 3).unwrap();
        assert_eq!(config.bits_per_index(), 3);
        assert_eq!(config.max_depth(), 8);
    }

    #[test]
    fn test_rejects_unusable_leaves_and_keys() {
        assert!(Config::<32, Sha256>::new(4, 0, 4).is_err());
        assert!(Config::<32, Sha256>::new(4, 4, 0).is_err());
        // 8 bits do not split into 3-bit indices
        assert!(Config::<32, Sha256>::new(8, 4, 1).is_err());
    }

    #[test]
    fn test_child_index_for_key() {
        let config = Config::<32, Sha256>::new(16, 4, 2).unwrap();
        let key = [0xab, 0xcd];
        let indices: Vec<_> = (0..config.max_depth())
            .map(|level| config.child_index_for_key(&key, level))
            .collect();
        assert_eq!(indices, vec![0xa, 0xb, 0xc, 0xd]);

        let config = Config::<32, Sha256>::new(2, 4, 1).unwrap();
        let indices: Vec<_> = (0..8)
            .map(|level| config.child_index_for_key(&[0b1000_0001], level))
            .collect();
        assert_eq!(indices, vec![1, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_check_key() {
        let config = Config::<32, Sha256>::new(4, 4, 4).unwrap();
        assert!(config.check_key(&[0; 4]).is_ok());
        assert_eq!(
            config.check_key(&[0; 5]),
            Err(MerkleError::InvalidKeyLength {
                expected: 4,
                got: 5
            })
        );
    }

    #[test]
    fn test_params_from_json() {
        let params: ConfigParams = serde_json::from_str(
            r#"{"children_per_node": 4, "values_per_leaf": 3, "keys_byte_length": 8}"#,
        )
        .unwrap();
        let config = Config::<32, Sha256>::try_from(params).unwrap();
        assert_eq!(config.params(), params);
        assert_eq!(config.max_depth(), 32);

        let params = ConfigParams {
            children_per_node: 5,
            ..params
        };
        assert!(Config::<32, Sha256>::try_from(params).is_err());
    }
}
