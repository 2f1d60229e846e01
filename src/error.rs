//! Error types for the Merkle key/value tree

use thiserror::Error;

/// Result type for operations that never touch a storage backend
pub type MerkleResult<T> = Result<T, MerkleError>;

/// Errors raised by configuration, position arithmetic, node handling and proof checking.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// The tree parameters are unusable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// An integer that does not encode a position
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
    /// The root position was asked for its father
    #[error("The root position has no father")]
    RootHasNoFather,
    /// A key does not have the configured length
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    /// An interior node was expected but the node has no child slots, or the wrong number of them
    #[error("Node is not a well formed interior node")]
    BadINode,
    /// A child index does not address a slot of the interior node
    #[error("Bad child pointer: index {index} for a node with {arity} children")]
    BadChildPointer { index: usize, arity: usize },
    /// Node is not a leaf node
    #[error("Node is not a leaf node")]
    ExpectedLeaf,
    /// Encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(String),
    /// Invalid merkle proof
    #[error("Invalid merkle proof: {0}")]
    InvalidMerkleProof(String),
}

/// Error type for tree operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError<DbError> {
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    /// Node was not found in the storage engine
    #[error("Node {} not found", hex::encode(.0))]
    NodeNotFound(Vec<u8>),
    /// The bytes stored under a hash are not a canonical node hashing back to it
    #[error("Hash mismatch for node {}", hex::encode(.0))]
    HashMismatch(Vec<u8>),
    /// The latest root moved between read and commit
    #[error("Stale root: expected {}, found {}", fmt_root(.expected), fmt_root(.found))]
    StaleRoot {
        expected: Option<Vec<u8>>,
        found: Option<Vec<u8>>,
    },
    /// Nothing was committed yet
    #[error("No root has been committed")]
    NoLatestRoot,
    /// Database error
    #[error("Database error: {0}")]
    DbError(DbError),
}

fn fmt_root(root: &Option<Vec<u8>>) -> String {
    match root {
        Some(hash) => hex::encode(hash),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::{MerkleError, TreeError};

    #[test]
    fn test_display() {
        let err = TreeError::<std::convert::Infallible>::NodeNotFound(vec![0xab, 0xcd]);
        assert_eq!(err.to_string(), "Node abcd not found");
        let err = TreeError::<std::convert::Infallible>::StaleRoot {
            expected: None,
            found: Some(vec![1]),
        };
        assert_eq!(err.to_string(), "Stale root: expected none, found 01");
    }

    #[test]
    fn test_merkle_error_is_transparent() {
        let err: TreeError<std::convert::Infallible> = MerkleError::RootHasNoFather.into();
        assert_eq!(err.to_string(), "The root position has no father");
        assert_eq!(err, TreeError::Merkle(MerkleError::RootHasNoFather));
    }
}
