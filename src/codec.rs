//! Canonical byte encoding shared by nodes and stored values.
//!
//! Everything goes through bincode's default configuration: fixed-width little endian integers,
//! length-prefixed sequences and explicit enum tags. Given the serde shapes used in this crate the
//! output has no padding and no map ordering, so equal values always encode to equal bytes.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{MerkleError, MerkleResult};

pub fn encode<T: Serialize + ?Sized>(value: &T) -> MerkleResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| MerkleError::Codec(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> MerkleResult<T> {
    bincode::deserialize(bytes).map_err(|e| MerkleError::Codec(e.to_string()))
}
