//! PH-Tree implementation in Rust with a map-like API.
//!
//! A PH-tree indexes `k`-dimensional keys of `u64` coordinates. Each node
//! splits its region at one bit position across all dimensions, so a node
//! has up to `2^k` slots addressed by the bits of the key at that position.
//! Bits shared by a subtree are stored once, per node, and the remaining key
//! bits are bit-packed next to each entry. Nodes pick one of three content
//! layouts depending on how full they are: a dense array, sorted packed
//! records, or a paged nested index.
//!
//! The tree supports point operations, window queries over axis-aligned
//! boxes and k-nearest-neighbor search. Signed and `f64` coordinates are
//! supported through [`KeyEncoding::Signed`] and [`f64_to_sortable`].
//!
//! # Examples
//!
//! ```
//! use phtree::{Euclidean, PhTree};
//!
//! let mut tree = PhTree::new(3).unwrap();
//! tree.put(&[1, 2, 3], "a");
//! tree.put(&[4, 5, 6], "b");
//! tree.put(&[100, 100, 100], "c");
//!
//! assert_eq!(tree.get(&[4, 5, 6]), Some(&"b"));
//! assert_eq!(tree.query(&[0, 0, 0], &[10, 10, 10]).count(), 2);
//!
//! let (key, value, _) = tree.nearest_neighbor(1, &[90, 90, 90], Euclidean::Unsigned).next().unwrap();
//! assert_eq!((key, *value), (vec![100, 100, 100], "c"));
//!
//! assert_eq!(tree.remove(&[1, 2, 3]), Some("a"));
//! assert_eq!(tree.len(), 2);
//! ```

mod bit_codec;
mod compact_arena;
mod construction;
mod delete_operations;
mod distance;
mod error;
mod get_operations;
mod insert_operations;
mod iteration;
mod key_bits;
mod nearest_neighbor;
mod nested_index;
mod node;
mod range_queries;
mod tree_structure;
mod types;
mod update_operations;
mod validation;

pub use compact_arena::{CompactArena, CompactArenaStats};
pub use construction::{PhTreeConfig, DEFAULT_NI_SUB_THRESHOLD, DEFAULT_NI_VALUE_THRESHOLD};
pub use distance::{Distance, Euclidean};
pub use error::{
    InitResult, KeyResult, ModifyResult, PhTreeError, PhTreeResult, PhTreeResultExt,
};
pub use iteration::{Keys, QueryIter, Values};
pub use key_bits::{f64_to_sortable, sortable_to_f64, KeyEncoding};
pub use nearest_neighbor::NearestNeighbors;
pub use nested_index::{NestedIndex, DEFAULT_PAGE_CAPACITY, MIN_PAGE_CAPACITY};
pub use types::{
    PhTree, PhTreeStats, Representation, Slot, AHC_MAX_DIMENSIONS, MAX_DIMENSIONS,
};

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[test]
    fn test_split_and_merge_scenario() {
        let mut tree = PhTree::new(2).unwrap();
        tree.put(&[0b0000_0011, 0b0000_0101], "a");
        tree.put(&[0b0000_0011, 0b0000_0110], "b");
        tree.put(&[0b1111_1111, 0b1111_1111], "c");
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.node_count(), 3);

        let mut hits: Vec<_> = tree.query(&[0, 0], &[10, 10]).map(|(_, v)| *v).collect();
        hits.sort();
        assert_eq!(hits, vec!["a", "b"]);
        assert_eq!(tree.get(&[3, 5]), Some(&"a"));

        assert_eq!(tree.remove(&[3, 5]), Some("a"));
        assert_eq!(tree.get(&[3, 5]), None);
        assert_eq!(tree.get(&[3, 6]), Some(&"b"));
        assert_eq!(tree.node_count(), 2);
        assert!(tree.check_invariants());

        assert_eq!(tree.remove(&[3, 6]), Some("b"));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.get(&[255, 255]), Some(&"c"));
        assert!(tree.check_invariants());

        assert_eq!(tree.remove(&[255, 255]), Some("c"));
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 0);
    }
}
