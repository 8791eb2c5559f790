//! Core types and data structures for PhTree.
//!
//! This module contains the tree, node and slot definitions plus the
//! constants shared by the operation modules. Node behavior lives in
//! `node.rs`, the public operations in the `*_operations` modules.

use crate::compact_arena::CompactArena;
use crate::construction::PhTreeConfig;
use crate::nested_index::NestedIndex;

pub use crate::compact_arena::{NodeId, NULL_NODE};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Largest supported dimensionality.
///
/// Hypercube addresses are single `u64` words, and the dense representation
/// sizes (`2^k`) must stay representable.
pub const MAX_DIMENSIONS: usize = 62;

/// Largest dimensionality for which the dense (AHC) representation is used.
pub const AHC_MAX_DIMENSIONS: usize = 16;

/// Bits charged per slot reference when comparing representation sizes.
pub(crate) const REF_BITS: usize = 64;

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// A PH-tree: a multi-dimensional index mapping `k`-dimensional `u64` keys
/// to values.
///
/// Each node splits its region along every dimension at one bit position,
/// giving up to `2^k` children addressed by the `k` bits of the key at that
/// position. Bits shared by a whole subtree are stored once per node, so the
/// shape of the tree depends only on the stored keys, never on insertion
/// order.
///
/// # Examples
///
/// ```
/// use phtree::PhTree;
///
/// let mut tree = PhTree::new(2).unwrap();
/// tree.put(&[3, 5], "a");
/// tree.put(&[3, 6], "b");
/// tree.put(&[255, 255], "c");
///
/// assert_eq!(tree.get(&[3, 5]), Some(&"a"));
/// assert_eq!(tree.len(), 3);
///
/// let mut hits: Vec<_> = tree.query(&[0, 0], &[10, 10]).map(|(_, v)| *v).collect();
/// hits.sort();
/// assert_eq!(hits, ["a", "b"]);
/// ```
///
/// # Performance Characteristics
///
/// - **Insertion / lookup / deletion**: O(w) node visits for `w`-bit keys,
///   independent of the number of entries
/// - **Range queries**: visit only nodes whose region intersects the box
/// - **Nearest neighbor**: best-first over node bounding boxes
#[derive(Debug)]
pub struct PhTree<V> {
    /// Validated configuration, including the dimensionality.
    pub(crate) config: PhTreeConfig,
    /// Root node, or `NULL_NODE` while the tree is empty.
    pub(crate) root: NodeId,
    /// Arena holding every node of the tree.
    pub(crate) nodes: CompactArena<Node<V>>,
    /// Number of stored values.
    pub(crate) len: usize,
}

/// Content of one hypercube address of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<V> {
    Empty,
    Value(V),
    Child(NodeId),
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Slot::Empty
    }
}

impl<V> Slot<V> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    pub fn is_child(&self) -> bool {
        matches!(self, Slot::Child(_))
    }
}

/// One level of the recursive hypercube subdivision.
///
/// Every entry carries a key fragment of `post_len` bits per dimension: the
/// postfix for values, and for children the child's infix bits with all
/// bits at or below the child's `post_len` cleared.
#[derive(Debug, Clone)]
pub struct Node<V> {
    pub(crate) dims: u8,
    /// Bits between this node and its parent shared by the whole subtree.
    pub(crate) infix_len: u8,
    /// Bit position this node splits on; the bits below it are undecided.
    pub(crate) post_len: u8,
    pub(crate) value_count: u32,
    pub(crate) sub_count: u32,
    pub(crate) content: Content<V>,
}

/// The active content representation of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Representation {
    /// Array hypercube: `2^k` slots indexed by address.
    Ahc,
    /// Linearized hypercube: bit-packed `(address, fragment)` records sorted
    /// by address.
    Lhc,
    /// Nested index: a paged B+ tree keyed by address.
    Ni,
}

#[derive(Debug, Clone)]
pub(crate) enum Content<V> {
    Ahc(HcArray<V>),
    Lhc(LinearHc<V>),
    Ni(NestedIndex<NiEntry<V>>),
}

/// Dense storage: slot `a` and its fragment at bit `a * k * post_len`.
#[derive(Debug, Clone)]
pub(crate) struct HcArray<V> {
    pub(crate) fragments: Vec<u64>,
    pub(crate) slots: Vec<Slot<V>>,
}

/// Sparse storage: records of `k` address bits followed by the fragment,
/// with a parallel vector of slots.
#[derive(Debug, Clone)]
pub(crate) struct LinearHc<V> {
    pub(crate) records: Vec<u64>,
    pub(crate) slots: Vec<Slot<V>>,
}

#[derive(Debug, Clone)]
pub(crate) struct NiEntry<V> {
    pub(crate) fragment: Box<[u64]>,
    pub(crate) slot: Slot<V>,
}

impl<V> Default for Content<V> {
    fn default() -> Self {
        Content::Lhc(LinearHc {
            records: Vec::new(),
            slots: Vec::new(),
        })
    }
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            dims: 0,
            infix_len: 0,
            post_len: 0,
            value_count: 0,
            sub_count: 0,
            content: Content::default(),
        }
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Shape summary of a tree, see [`PhTree::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhTreeStats {
    pub node_count: usize,
    pub ahc_nodes: usize,
    pub lhc_nodes: usize,
    pub ni_nodes: usize,
    pub value_count: usize,
    pub max_depth: usize,
    /// Sum of `infix_len` over all nodes.
    pub total_infix_len: usize,
}
