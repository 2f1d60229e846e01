use criterion::{black_box, criterion_group, criterion_main, Criterion};
use merkle_kv_tree::{Config, MemoryDb, Tree};
use sha2::Sha256;

type BenchTree = Tree<32, Sha256, MemoryDb<32>, Vec<u8>>;

pub fn generate_random_key() -> [u8; 32] {
    rand::random()
}

pub fn generate_random_value() -> Vec<u8> {
    let mut value = Vec::with_capacity(32);
    for _ in 0..32 {
        value.push(rand::random());
    }
    value
}

fn setup_tree(children: usize, num_pairs: usize) -> (BenchTree, Vec<[u8; 32]>) {
    let tree = Tree::new(Config::new(children, 4, 32).unwrap(), MemoryDb::new());
    let pairs: Vec<_> = (0..num_pairs)
        .map(|_| (generate_random_key(), generate_random_value()))
        .collect();
    tree.put_batch(&pairs, ()).unwrap();
    let keys = pairs.into_iter().map(|(key, _)| key).collect();
    (tree, keys)
}

fn bench_proof_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tree Proof Generation");

    for children in [2, 16, 256] {
        let (tree, keys) = setup_tree(children, 1000);
        group.bench_function(format!("{children} children"), |b| {
            b.iter(|| {
                for key in &keys {
                    black_box(tree.get_with_proof(key)).unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_proof_verification(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tree Proof Verification");

    for children in [2, 16, 256] {
        let (tree, keys) = setup_tree(children, 1000);
        let root = tree.latest_root().unwrap().unwrap();
        let proofs: Vec<_> = keys
            .iter()
            .map(|key| tree.get_with_proof(key).unwrap())
            .collect();
        group.bench_function(format!("{children} children"), |b| {
            b.iter(|| {
                for (key, (value, proof)) in keys.iter().zip(proofs.iter()) {
                    black_box(proof.verify_merkle_proof(
                        tree.config(),
                        key,
                        value.as_ref(),
                        &root,
                    ))
                    .unwrap();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_proof_generation, bench_proof_verification);
criterion_main!(benches);
