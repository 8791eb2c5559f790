use phtree::{PhTree, PhTreeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

fn brute_force(points: &HashMap<Vec<u64>, usize>, min: &[u64], max: &[u64]) -> Vec<usize> {
    let mut hits: Vec<usize> = points
        .iter()
        .filter(|(key, _)| {
            key.iter()
                .zip(min.iter().zip(max.iter()))
                .all(|(k, (lo, hi))| k >= lo && k <= hi)
        })
        .map(|(_, v)| *v)
        .collect();
    hits.sort();
    hits
}

fn random_box(rng: &mut StdRng, dims: usize, extent: u64) -> (Vec<u64>, Vec<u64>) {
    let mut min = Vec::with_capacity(dims);
    let mut max = Vec::with_capacity(dims);
    for _ in 0..dims {
        let a = rng.gen_range(0..extent);
        let b = rng.gen_range(0..extent);
        min.push(a.min(b));
        max.push(a.max(b));
    }
    (min, max)
}

fn check_random_queries(config: PhTreeConfig, extent: u64, seed: u64) {
    let dims = config.dims;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tree = PhTree::with_config(config).unwrap();
    let mut points = HashMap::new();
    for i in 0..3_000 {
        let key: Vec<u64> = (0..dims).map(|_| rng.gen_range(0..extent)).collect();
        tree.put(&key, i);
        points.insert(key, i);
    }

    for _ in 0..200 {
        let (min, max) = random_box(&mut rng, dims, extent);
        let mut hits: Vec<usize> = tree.query(&min, &max).map(|(key, v)| {
            assert_eq!(points.get(&key), Some(v));
            *v
        }).collect();
        let count = hits.len();
        hits.sort();
        hits.dedup();
        assert_eq!(hits.len(), count, "an entry was reported twice");
        assert_eq!(hits, brute_force(&points, &min, &max));
    }
}

#[test]
fn test_range_queries_match_brute_force_2d() {
    check_random_queries(PhTreeConfig::new(2), 1 << 12, 1);
}

#[test]
fn test_range_queries_match_brute_force_3d_wide_keys() {
    check_random_queries(PhTreeConfig::new(3), u64::MAX, 2);
}

#[test]
fn test_range_queries_match_brute_force_nested_index() {
    check_random_queries(PhTreeConfig::new(4).with_ni_thresholds(3, 3), 1 << 6, 3);
}

#[test]
fn test_range_queries_match_brute_force_10d() {
    check_random_queries(PhTreeConfig::new(10), 1 << 4, 4);
}

#[test]
fn test_full_extent_query_equals_iter() {
    let mut tree = PhTree::new(2).unwrap();
    for i in 0..1000u64 {
        tree.put(&[i.wrapping_mul(0x9e37_79b9_7f4a_7c15), i], i);
    }
    let mut queried: Vec<u64> = tree.query(&[0, 0], &[u64::MAX, u64::MAX]).map(|(_, v)| *v).collect();
    let mut iterated: Vec<u64> = tree.values().copied().collect();
    queried.sort();
    iterated.sort();
    assert_eq!(queried, iterated);
    assert_eq!(queried.len(), 1000);
}

#[test]
fn test_query_collect_filters_and_maps() {
    let mut tree = PhTree::new(2).unwrap();
    for x in 0..50u64 {
        for y in 0..50u64 {
            tree.put(&[x, y], x + y);
        }
    }
    let mut sums = tree.query_collect(&[10, 10], &[12, 12], |key, _| key[0] == key[1], |key, sum| (key[0], *sum));
    sums.sort();
    assert_eq!(sums, vec![(10, 20), (11, 22), (12, 24)]);
}

#[test]
fn test_inverted_box_is_empty() {
    let mut tree = PhTree::new(2).unwrap();
    tree.put(&[5, 5], ());
    assert_eq!(tree.query(&[6, 0], &[4, 10]).count(), 0);
    assert_eq!(tree.query(&[5, 5], &[5, 5]).count(), 1);
}
