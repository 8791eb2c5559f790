//! k-nearest-neighbor search for PhTree.
//!
//! Best-first search: a priority queue holds values keyed by their distance
//! to the center and nodes keyed by the distance from the center to the
//! closest point of the node's region. Popping a value means no unexplored
//! region can hold anything closer, so results come out in ascending order
//! and the search can stop after any number of them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::bit_codec::low_mask;
use crate::distance::{Distance, Euclidean};
use crate::key_bits::{apply_address, KeyEncoding};
use crate::types::{Node, PhTree, Slot, NULL_NODE};

/// Iterator over the entries closest to a point, nearest first.
///
/// Yields `(key, &value, distance)`.
pub struct NearestNeighbors<'a, V, D> {
    tree: &'a PhTree<V>,
    /// Center in encoded form, for clamping into node regions.
    center: Vec<u64>,
    /// Center as the caller passed it, for the distance function.
    center_key: Vec<u64>,
    distance: D,
    queue: BinaryHeap<Candidate<'a, V>>,
    remaining: usize,
}

struct Candidate<'a, V> {
    dist: f64,
    kind: CandidateKind<'a, V>,
}

enum CandidateKind<'a, V> {
    /// A node and its prefix, as in the query iterator.
    Node { node: &'a Node<V>, prefix: Vec<u64> },
    /// A stored entry, key already decoded.
    Value { key: Vec<u64>, value: &'a V },
}

impl<V> Candidate<'_, V> {
    fn is_value(&self) -> bool {
        matches!(self.kind, CandidateKind::Value { .. })
    }
}

impl<V> PartialEq for Candidate<'_, V> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<V> Eq for Candidate<'_, V> {}

impl<V> PartialOrd for Candidate<'_, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V> Ord for Candidate<'_, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; on ties values come out before nodes.
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| self.is_value().cmp(&other.is_value()))
    }
}

impl<V> PhTree<V> {
    /// Find the `n` entries closest to `center` under `distance`.
    ///
    /// The search is lazy: entries are produced one at a time in ascending
    /// distance, and dropping the iterator early skips the remaining work.
    /// Ties are returned in no particular order.
    ///
    /// # Panics
    ///
    /// Panics if `center` does not have exactly `dims()` coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::{Euclidean, PhTree};
    ///
    /// let mut tree = PhTree::new(2).unwrap();
    /// tree.put(&[0, 0], "origin");
    /// tree.put(&[10, 10], "far");
    /// tree.put(&[2, 1], "near");
    ///
    /// let found: Vec<_> = tree
    ///     .nearest_neighbor(2, &[1, 1], Euclidean::Unsigned)
    ///     .map(|(_, v, _)| *v)
    ///     .collect();
    /// assert_eq!(found, vec!["near", "origin"]);
    /// ```
    pub fn nearest_neighbor<D: Distance>(&self, n: usize, center: &[u64], distance: D) -> NearestNeighbors<'_, V, D> {
        self.assert_dims(center);
        let encoded = self.encode_key(center).into_owned();
        NearestNeighbors::new(self, n, encoded, center.to_vec(), distance)
    }

    /// [`nearest_neighbor`](Self::nearest_neighbor) with the Euclidean
    /// distance matching the tree's key encoding.
    pub fn nearest_neighbor_euclidean(&self, n: usize, center: &[u64]) -> NearestNeighbors<'_, V, Euclidean> {
        let distance = match self.config.key_encoding {
            KeyEncoding::Unsigned => Euclidean::Unsigned,
            KeyEncoding::Signed => Euclidean::Signed,
        };
        self.nearest_neighbor(n, center, distance)
    }
}

impl<'a, V, D: Distance> NearestNeighbors<'a, V, D> {
    fn new(tree: &'a PhTree<V>, n: usize, center: Vec<u64>, center_key: Vec<u64>, distance: D) -> Self {
        let mut search = Self {
            tree,
            center,
            center_key,
            distance,
            queue: BinaryHeap::new(),
            remaining: n,
        };
        if n > 0 && tree.root != NULL_NODE {
            if let Some(root) = tree.nodes.get(tree.root) {
                search.queue.push(Candidate {
                    dist: 0.0,
                    kind: CandidateKind::Node {
                        node: root,
                        prefix: vec![0; tree.config.dims],
                    },
                });
            }
        }
        search
    }

    fn encoding(&self) -> KeyEncoding {
        self.tree.config.key_encoding
    }

    /// Queue every entry of `node`.
    fn expand(&mut self, node: &'a Node<V>, prefix: &[u64]) {
        for entry in node.entries() {
            let mut key = prefix.to_vec();
            apply_address(entry.addr, node.post_len, &mut key);
            entry.fragment.load_into(node.post_len, &mut key);

            let candidate = match entry.slot {
                Slot::Value(value) => {
                    self.encoding().decode_in_place(&mut key);
                    Candidate {
                        dist: self.distance.dist(&self.center_key, &key),
                        kind: CandidateKind::Value { key, value },
                    }
                }
                Slot::Child(child) => {
                    let Some(child) = self.tree.nodes.get(*child) else {
                        continue;
                    };
                    Candidate {
                        dist: self.region_distance(&key, child.post_len),
                        kind: CandidateKind::Node { node: child, prefix: key },
                    }
                }
                Slot::Empty => continue,
            };
            self.queue.push(candidate);
        }
    }

    /// Distance from the center to the closest point of the region of a
    /// node with the given prefix and post length.
    fn region_distance(&self, prefix: &[u64], post_len: u8) -> f64 {
        let free = low_mask(post_len as usize + 1);
        let mut closest: Vec<u64> = prefix
            .iter()
            .zip(self.center.iter())
            .map(|(&lo, &c)| c.clamp(lo, lo | free))
            .collect();
        self.encoding().decode_in_place(&mut closest);
        self.distance.dist(&self.center_key, &closest)
    }
}

impl<'a, V, D: Distance> Iterator for NearestNeighbors<'a, V, D> {
    type Item = (Vec<u64>, &'a V, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        while let Some(candidate) = self.queue.pop() {
            match candidate.kind {
                CandidateKind::Value { key, value } => {
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.queue.clear();
                    }
                    return Some((key, value, candidate.dist));
                }
                CandidateKind::Node { node, prefix } => self.expand(node, &prefix),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::{Euclidean, PhTree};

    #[test]
    fn test_knn_on_empty_tree_and_zero_n() {
        let mut tree = PhTree::<u8>::new(2).unwrap();
        assert_eq!(tree.nearest_neighbor(3, &[0, 0], Euclidean::Unsigned).count(), 0);
        tree.put(&[1, 1], 1);
        assert_eq!(tree.nearest_neighbor(0, &[0, 0], Euclidean::Unsigned).count(), 0);
        assert_eq!(tree.nearest_neighbor(5, &[0, 0], Euclidean::Unsigned).count(), 1);
    }

    #[test]
    fn test_knn_distances_ascend() {
        let mut tree = PhTree::new(2).unwrap();
        for x in 0..30u64 {
            for y in 0..30u64 {
                tree.put(&[x * 3, y * 5], (x, y));
            }
        }
        let found: Vec<_> = tree.nearest_neighbor(25, &[44, 71], Euclidean::Unsigned).collect();
        assert_eq!(found.len(), 25);
        assert!(found.windows(2).all(|pair| pair[0].2 <= pair[1].2));
        assert_eq!(found[0].0, vec![45, 70]);
    }

    #[test]
    fn test_knn_signed_keys() {
        let mut tree = PhTree::new_signed(1).unwrap();
        for v in [-100i64, -7, -2, 3, 50] {
            tree.put(&[v as u64], v);
        }
        let found: Vec<i64> = tree
            .nearest_neighbor_euclidean(3, &[0])
            .map(|(_, v, _)| *v)
            .collect();
        assert_eq!(found, vec![-2, 3, -7]);
    }
}
