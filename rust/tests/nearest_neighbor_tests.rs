use phtree::{Distance, Euclidean, PhTree, PhTreeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn brute_force_distances<D: Distance>(points: &[Vec<u64>], center: &[u64], n: usize, distance: &D) -> Vec<f64> {
    let mut distances: Vec<f64> = points.iter().map(|p| distance.dist(center, p)).collect();
    distances.sort_by(f64::total_cmp);
    distances.truncate(n);
    distances
}

fn check_knn(config: PhTreeConfig, extent: u64, seed: u64) {
    let dims = config.dims;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tree = PhTree::with_config(config).unwrap();
    for i in 0..2_000usize {
        let key: Vec<u64> = (0..dims).map(|_| rng.gen_range(0..extent)).collect();
        tree.put(&key, i);
    }
    let points: Vec<Vec<u64>> = tree.keys().collect();

    for n in [1usize, 5, 37] {
        for _ in 0..30 {
            let center: Vec<u64> = (0..dims).map(|_| rng.gen_range(0..extent)).collect();
            let found: Vec<_> = tree.nearest_neighbor(n, &center, Euclidean::Unsigned).collect();
            let expected = brute_force_distances(&points, &center, n, &Euclidean::Unsigned);
            assert_eq!(found.len(), expected.len());
            for ((key, value, dist), want) in found.iter().zip(expected.iter()) {
                assert_eq!(dist, want);
                assert_eq!(tree.get(key), Some(*value));
                assert_eq!(Euclidean::Unsigned.dist(&center, key), *dist);
            }
        }
    }
}

#[test]
fn test_knn_matches_brute_force_2d() {
    check_knn(PhTreeConfig::new(2), 1 << 16, 11);
}

#[test]
fn test_knn_matches_brute_force_5d_nested_index() {
    check_knn(PhTreeConfig::new(5).with_ni_thresholds(4, 4), 1 << 5, 12);
}

#[test]
fn test_knn_matches_brute_force_full_width_keys() {
    check_knn(PhTreeConfig::new(3), u64::MAX, 13);
}

#[test]
fn test_knn_with_custom_distance() {
    let mut tree = PhTree::new(2).unwrap();
    for x in 0..20u64 {
        for y in 0..20u64 {
            tree.put(&[x, y], (x, y));
        }
    }
    // Chebyshev distance.
    let chebyshev = |a: &[u64], b: &[u64]| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.abs_diff(*y) as f64)
            .fold(0.0, f64::max)
    };
    let found: Vec<_> = tree.nearest_neighbor(9, &[10, 10], chebyshev).collect();
    assert_eq!(found.len(), 9);
    assert!(found.iter().all(|(_, _, d)| *d <= 1.0));
    let next = tree.nearest_neighbor(10, &[10, 10], chebyshev).last().unwrap();
    assert_eq!(next.2, 2.0);
}

#[test]
fn test_knn_is_lazy_and_ordered() {
    let mut tree = PhTree::new(1).unwrap();
    for v in (0..1000u64).step_by(10) {
        tree.put(&[v], v);
    }
    let mut search = tree.nearest_neighbor(usize::MAX, &[503], Euclidean::Unsigned);
    assert_eq!(search.next().map(|(_, v, _)| *v), Some(500));
    assert_eq!(search.next().map(|(_, v, _)| *v), Some(510));
    assert_eq!(search.count(), 98);
}
