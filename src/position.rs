//! Positions of nodes in the tree and the arithmetic over them.
//!
//! A position is the bit string `1 i_1 i_2 ... i_n` where the leading `1` is a sentinel and each
//! `i_k` is the `bits_per_index`-wide child index chosen at level `k - 1`, read from the root
//! down. Read as an unsigned integer the root is `1`, and the child `i` of `p` is
//! `(p << bits_per_index) | i`. The bits are kept in a [`BitVec`] so positions are exact at any
//! depth.
//!
//! Keys are read the same way: the deepest position for a key is the sentinel followed by every
//! bit of the key, most significant bit of the first byte first.

use std::{cmp::Ordering, fmt::Display};

use bitvec::prelude::*;

use crate::{
    config::Config,
    node::{ChildIndex, Hasher},
    MerkleError, MerkleResult,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position(BitVec<u8, Msb0>);

impl Position {
    pub fn root() -> Self {
        Self(bitvec![u8, Msb0; 1])
    }

    /// Position of the node at `level` on the path to `key`, in a tree with `bits_per_index`-wide
    /// indices. `level` is clamped to the key's length.
    pub fn on_path_to_key(key: &[u8], level: usize, bits_per_index: usize) -> Self {
        let bits = key.view_bits::<Msb0>();
        let len = (level * bits_per_index).min(bits.len());
        let mut position = Self::root();
        position.0.extend_from_bitslice(&bits[..len]);
        position
    }

    /// Number of significant bits, including the sentinel.
    pub fn bit_len(&self) -> usize {
        self.0.len()
    }

    /// Distance from the root, counted in tree levels.
    pub fn level(&self, bits_per_index: usize) -> usize {
        (self.0.len() - 1) / bits_per_index
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Child `index` of this position. An index wider than `bits_per_index` names no child and
    /// fails with `BadChildPointer`.
    pub fn child(&self, index: ChildIndex, bits_per_index: usize) -> MerkleResult<Self> {
        if index >> bits_per_index != 0 {
            return Err(MerkleError::BadChildPointer {
                index,
                arity: 1 << bits_per_index,
            });
        }
        let mut bits = self.0.clone();
        for shift in (0..bits_per_index).rev() {
            bits.push((index >> shift) & 1 == 1);
        }
        Ok(Self(bits))
    }

    pub fn father(&self, bits_per_index: usize) -> MerkleResult<Self> {
        if self.0.len() < 2 || self.0.len() <= bits_per_index {
            return Err(MerkleError::RootHasNoFather);
        }
        let mut bits = self.0.clone();
        bits.truncate(self.0.len() - bits_per_index);
        Ok(Self(bits))
    }

    /// Index of this position among its father's children.
    pub fn deepest_child_index(&self, bits_per_index: usize) -> ChildIndex {
        let len = self.0.len();
        if len <= bits_per_index {
            return 0;
        }
        self.0[len - bits_per_index..].load_be::<ChildIndex>()
    }

    /// `true` when `self` is a prefix of `other`, i.e. `self` is `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &Position) -> bool {
        self.0.len() <= other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Integer value of the position, if it fits in 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        (self.0.len() <= 64).then(|| self.0.load_be::<u64>())
    }
}

impl TryFrom<u64> for Position {
    type Error = MerkleError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(MerkleError::InvalidPosition(
                "0 has no sentinel bit".to_string(),
            ));
        }
        let width = 64 - value.leading_zeros() as usize;
        let mut bits = BitVec::with_capacity(width);
        for shift in (0..width).rev() {
            bits.push((value >> shift) & 1 == 1);
        }
        Ok(Self(bits))
    }
}

impl Ord for Position {
    /// Shallower positions first, then by integer value within a level.
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0b")?;
        for bit in self.0.iter().by_vals() {
            write!(f, "{}", if bit { '1' } else { '0' })?;
        }
        Ok(())
    }
}

impl<const HASH_SIZE: usize, H: Hasher<HASH_SIZE> + Clone> Config<HASH_SIZE, H> {
    pub fn get_root_position(&self) -> Position {
        Position::root()
    }

    pub fn get_child_position(
        &self,
        position: &Position,
        index: ChildIndex,
    ) -> MerkleResult<Position> {
        position.child(index, self.bits_per_index())
    }

    pub fn get_father(&self, position: &Position) -> MerkleResult<Position> {
        position.father(self.bits_per_index())
    }

    /// All other children of `position`'s father, in ascending index order, and the father itself.
    pub fn get_all_siblings(&self, position: &Position) -> MerkleResult<(Vec<Position>, Position)> {
        let father = self.get_father(position)?;
        let siblings = (0..self.children_per_node())
            .map(|index| self.get_child_position(&father, index))
            .filter(|sibling| sibling.as_ref() != Ok(position))
            .collect::<MerkleResult<Vec<_>>>()?;
        Ok((siblings, father))
    }

    /// `true` when the node at `position` lies on the path from the root to `key`.
    pub fn is_position_on_path_to_key(&self, position: &Position, key: &[u8]) -> bool {
        position.is_prefix_of(&Position::on_path_to_key(key, usize::MAX, 1))
    }

    /// Position `key` would occupy in a tree split down to one key per leaf.
    pub fn get_deepest_position_for_key(&self, key: &[u8]) -> MerkleResult<Position> {
        self.check_key(key)?;
        Ok(Position::on_path_to_key(key, self.max_depth(), self.bits_per_index()))
    }

    pub fn get_position_on_path_to_key_at_level(
        &self,
        key: &[u8],
        level: usize,
    ) -> MerkleResult<Position> {
        self.check_key(key)?;
        Ok(Position::on_path_to_key(
            key,
            level.min(self.max_depth()),
            self.bits_per_index(),
        ))
    }

    /// Sibling sets along the path to `key`, one per level from the root's children down to the
    /// deepest level. Together with a leaf's content, the hashes at these positions are enough to
    /// recompute the root hash.
    pub fn get_sibling_positions_on_path_to_key(
        &self,
        key: &[u8],
    ) -> MerkleResult<Vec<Vec<Position>>> {
        let mut position = self.get_deepest_position_for_key(key)?;
        let mut levels = Vec::with_capacity(self.max_depth());
        while !position.is_root() {
            let (siblings, father) = self.get_all_siblings(&position)?;
            levels.push(siblings);
            position = father;
        }
        levels.reverse();
        Ok(levels)
    }
}
