use phtree::{f64_to_sortable, sortable_to_f64, Euclidean, KeyEncoding, PhTree, PhTreeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn signed(key: &[i64]) -> Vec<u64> {
    key.iter().map(|&v| v as u64).collect()
}

fn floats(key: &[f64]) -> Vec<u64> {
    key.iter().map(|&v| f64_to_sortable(v) as u64).collect()
}

#[test]
fn test_signed_round_trip_and_range() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut tree = PhTree::with_config(PhTreeConfig::new(2).with_key_encoding(KeyEncoding::Signed)).unwrap();
    let mut points = Vec::new();
    for i in 0..2_000 {
        let key = [rng.gen_range(-1000i64..1000), rng.gen::<i64>() >> rng.gen_range(0..64u32)];
        tree.put(&signed(&key), i);
        points.push(key);
    }
    for key in &points {
        assert!(tree.contains(&signed(key)));
    }

    let (min, max) = ([-250i64, -1 << 40], [300i64, 1 << 40]);
    let mut hits: Vec<Vec<u64>> = tree.query(&signed(&min), &signed(&max)).map(|(k, _)| k).collect();
    hits.sort();
    let mut expected: Vec<Vec<u64>> = points
        .iter()
        .filter(|p| p[0] >= min[0] && p[0] <= max[0] && p[1] >= min[1] && p[1] <= max[1])
        .map(|p| signed(p))
        .collect();
    expected.sort();
    expected.dedup();
    assert_eq!(hits, expected);
    tree.check_invariants_detailed().unwrap();
}

#[test]
fn test_sortable_float_order() {
    let values = [f64::NEG_INFINITY, -1e300, -2.5, -0.0, 0.0, 1e-300, 3.75, f64::INFINITY];
    for pair in values.windows(2) {
        assert!(f64_to_sortable(pair[0]) <= f64_to_sortable(pair[1]), "{:?}", pair);
    }
    for &v in &values {
        assert_eq!(sortable_to_f64(f64_to_sortable(v)).to_bits(), v.to_bits());
    }
}

#[test]
fn test_float_points_query_and_knn() {
    let mut tree = PhTree::new_signed(2).unwrap();
    for x in -10..=10 {
        for y in -10..=10 {
            let point = [x as f64 * 0.5, y as f64 * 0.25];
            tree.put(&floats(&point), point);
        }
    }

    let hits: Vec<[f64; 2]> = tree
        .query(&floats(&[-0.6, -0.3]), &floats(&[0.6, 0.3]))
        .map(|(_, p)| *p)
        .collect();
    assert_eq!(hits.len(), 3 * 3);
    assert!(hits.iter().all(|p| p[0].abs() <= 0.6 && p[1].abs() <= 0.3));

    let nearest: Vec<[f64; 2]> = tree
        .nearest_neighbor(1, &floats(&[1.2, -0.9]), Euclidean::SortableF64)
        .map(|(key, p, _)| {
            assert_eq!(key, floats(p));
            *p
        })
        .collect();
    assert_eq!(nearest, vec![[1.0, -1.0]]);
}
