//! Basic example of using the Merkle key/value tree
//!
//! This example demonstrates:
//! - Creating a new tree
//! - Writing single values and batches
//! - Reading the latest and a past version, by root or by sequence number
//! - Verifying inclusion and exclusion proofs

use merkle_kv_tree::{Config, MemoryDb, Tree};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    name: String,
    public_key: Vec<u8>,
}

fn entry(name: &str, public_key: u8) -> Entry {
    Entry {
        name: name.to_string(),
        public_key: vec![public_key; 4],
    }
}

fn main() {
    // 16 children per node, up to 4 pairs per leaf, 8-byte keys
    let config = Config::<32, Sha256>::new(16, 4, 8).unwrap();
    let tree = Tree::<32, Sha256, MemoryDb<32>, Entry>::new(config, MemoryDb::new());

    let alice = 1u64.to_be_bytes();
    let bob = 2u64.to_be_bytes();
    let carol = 3u64.to_be_bytes();

    let first = tree.put(&alice, &entry("alice", 0xaa), ()).unwrap();
    println!("First root: {}", hex::encode(first));

    let second = tree
        .put_batch(&[(bob, entry("bob", 0xbb)), (alice, entry("alice", 0xa1))], ())
        .unwrap();
    println!("Second root: {}", hex::encode(second));

    // The first version is still there
    println!("alice then: {:?}", tree.get_at(&first, &alice).unwrap());
    println!("alice now: {:?}", tree.get(&alice).unwrap());
    println!(
        "{} versions, alice in version 1: {:?}",
        tree.version_count().unwrap(),
        tree.get_at_seqno(1, &alice).unwrap()
    );

    // Inclusion proof for bob
    let (value, proof) = tree.get_with_proof(&bob).unwrap();
    let included = proof.verify_merkle_proof(tree.config(), &bob, value.as_ref(), &second);
    println!("bob is {:?}, proof verification: {}", value, included.is_ok());
    println!(
        "Proof chained to previous root: {}",
        proof.prev_root() == Some(&first)
    );

    // Exclusion proof for carol
    let (value, proof) = tree.get_with_proof(&carol).unwrap();
    let excluded = proof.verify_merkle_proof(tree.config(), &carol, value.as_ref(), &second);
    println!("carol is {:?}, proof verification: {}", value, excluded.is_ok());

    let compressed = proof.compress(tree.config());
    println!(
        "Compressed proof: {} bytes, {} sibling hashes",
        compressed.encode().unwrap().len(),
        compressed.hash_count()
    );
}
