//! Merkle key/value tree implementation
//!
//! This crate provides a configurable Merkle tree that maps fixed-length keys to values and serves
//! as a tamper-evident directory: every lookup can come with a proof checked against a root hash,
//! and every committed root links to the root it replaced.
//!
//! The tree supports:
//! - Any power-of-two number of children per node
//! - Leaves holding several key/value pairs, split once they overflow
//! - Inclusion and exclusion proofs, with a compressed form
//! - Reads against any past root
//! - Flexible storage backend through the `StorageEngine` trait

mod codec;
mod config;
mod db;
mod error;
mod node;
mod position;
mod proof;
mod serde_support;
mod tree;

pub use config::{Config, ConfigParams};
pub use db::{MemoryDb, MemoryDbError, StorageEngine, ThreadSafe};
pub use error::{MerkleError, MerkleResult, TreeError};
pub use node::{ChildIndex, Hasher, KeyHashPair, KeyValuePair, Node, NodeBody, SortedMap};
pub use position::Position;
pub use proof::{CompressedProof, Proof};
pub use tree::Tree;
