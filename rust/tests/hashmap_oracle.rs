use phtree::{PhTree, PhTreeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Draw a key whose coordinates come from a small pool, so that random
/// operations hit existing keys often and keys share long prefixes.
fn random_key(rng: &mut StdRng, dims: usize, pool: &[u64]) -> Vec<u64> {
    (0..dims).map(|_| pool[rng.gen_range(0..pool.len())]).collect()
}

fn coordinate_pool(rng: &mut StdRng) -> Vec<u64> {
    let mut pool = vec![0, 1, 2, 3, u64::MAX, u64::MAX - 1, 1 << 63, (1 << 63) - 1];
    pool.extend((0..8).map(|_| rng.gen::<u64>()));
    pool.extend((0..8).map(|_| rng.gen_range(0..1024u64)));
    pool
}

fn assert_same_content(tree: &PhTree<u64>, oracle: &HashMap<Vec<u64>, u64>) {
    assert_eq!(tree.len(), oracle.len());
    let mut seen = HashMap::new();
    for (key, value) in tree.iter() {
        assert!(seen.insert(key, *value).is_none(), "key yielded twice");
    }
    assert_eq!(&seen, oracle);
}

/// Random put/remove/update sequence checked against a `HashMap` after every
/// operation.
fn run_oracle(config: PhTreeConfig, seed: u64, operations: usize) {
    let dims = config.dims;
    let mut rng = StdRng::seed_from_u64(seed);
    let pool = coordinate_pool(&mut rng);
    let mut tree = PhTree::with_config(config).unwrap();
    let mut oracle: HashMap<Vec<u64>, u64> = HashMap::new();

    for step in 0..operations {
        let key = random_key(&mut rng, dims, &pool);
        match rng.gen_range(0..10) {
            0..=4 => {
                let value = step as u64;
                assert_eq!(tree.put(&key, value), oracle.insert(key.clone(), value));
            }
            5..=7 => {
                assert_eq!(tree.remove(&key), oracle.remove(&key));
            }
            _ => {
                let target = random_key(&mut rng, dims, &pool);
                let expected = match (oracle.contains_key(&key), oracle.contains_key(&target)) {
                    (true, _) if key == target => oracle.get(&key).copied(),
                    (true, false) => {
                        let value = oracle.remove(&key).unwrap();
                        oracle.insert(target.clone(), value);
                        Some(value)
                    }
                    _ => None,
                };
                assert_eq!(tree.update(&key, &target).copied(), expected);
            }
        }

        assert_eq!(tree.get(&key), oracle.get(&key));
        assert_eq!(tree.contains(&key), oracle.contains_key(&key));
        assert_eq!(tree.len(), oracle.len());
        if step % 97 == 0 {
            assert_same_content(&tree, &oracle);
            tree.check_invariants_detailed().unwrap();
        }
    }

    assert_same_content(&tree, &oracle);
    tree.check_invariants_detailed().unwrap();

    // Drain everything.
    let keys: Vec<_> = oracle.keys().cloned().collect();
    for key in keys {
        assert_eq!(tree.remove(&key), oracle.remove(&key));
    }
    assert!(tree.is_empty());
    assert_eq!(tree.node_count(), 0);
}

macro_rules! oracle_tests {
    ($($dims:literal),*) => {
        paste::paste! {
            $(
                #[test]
                fn [<test_oracle_default_config_ $dims d>]() {
                    run_oracle(PhTreeConfig::new($dims), 0x5eed + $dims, 2_000);
                }

                #[test]
                fn [<test_oracle_small_ni_thresholds_ $dims d>]() {
                    let config = PhTreeConfig::new($dims)
                        .with_ni_thresholds(2, 2)
                        .with_ni_page_capacity(4);
                    run_oracle(config, 0xbeef + $dims, 2_000);
                }

                #[test]
                fn [<test_oracle_without_ahc_ $dims d>]() {
                    let config = PhTreeConfig::new($dims)
                        .with_ahc(false)
                        .with_ni_thresholds(usize::MAX, usize::MAX);
                    run_oracle(config, 0xcafe + $dims, 2_000);
                }
            )*
        }
    };
}

oracle_tests!(1, 2, 8, 20, 60);

#[test]
fn test_insertion_order_does_not_matter() {
    let mut rng = StdRng::seed_from_u64(17);
    let keys: Vec<Vec<u64>> = (0..500)
        .map(|_| (0..3).map(|_| rng.gen_range(0..4096u64)).collect())
        .collect();

    let mut forward = PhTree::new(3).unwrap();
    for (i, key) in keys.iter().enumerate() {
        forward.put(key, i);
    }
    let mut backward = PhTree::new(3).unwrap();
    for (i, key) in keys.iter().enumerate().rev() {
        // Later duplicates must win in both trees.
        if backward.get(key).is_none() {
            backward.put(key, i);
        }
    }
    let mut backward_fixed = PhTree::new(3).unwrap();
    for (key, value) in forward.iter() {
        backward_fixed.put(&key, *value);
    }

    for key in &keys {
        assert_eq!(forward.get(key), backward.get(key));
    }
    assert_eq!(forward.len(), backward.len());
    assert_eq!(forward.stats(), backward.stats());
    assert_eq!(forward.stats(), backward_fixed.stats());
}
