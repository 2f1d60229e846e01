use criterion::{criterion_group, criterion_main, Criterion};
use merkle_kv_tree::{Config, MemoryDb, Tree};
use sha2::Sha256;

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

fn new_tree(children: usize) -> Tree<32, Sha256, MemoryDb<32>, Vec<u8>> {
    Tree::new(Config::new(children, 4, 32).unwrap(), MemoryDb::new())
}

fn bench_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tree Insertion");

    for children in [2, 16, 256] {
        group.bench_function(format!("{children} children, one put per pair"), |b| {
            b.iter(|| {
                let tree = new_tree(children);
                for _ in 0..100 {
                    let key = generate_random_key();
                    let value = generate_random_value();
                    tree.put(&key, &value, ()).unwrap();
                }
            })
        });
    }

    group.bench_function("16 children, one batch", |b| {
        b.iter(|| {
            let tree = new_tree(16);
            let pairs: Vec<_> = (0..100)
                .map(|_| (generate_random_key(), generate_random_value()))
                .collect();
            tree.put_batch(&pairs, ()).unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_insertion);
criterion_main!(benches);
