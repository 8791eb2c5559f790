//! Tree structure management operations for PhTree.
//!
//! This module contains all tree-level operations that manage the overall structure,
//! including size queries, clearing, node counting, and tree statistics.

use tracing::debug;

use crate::compact_arena::CompactArenaStats;
use crate::types::{NodeId, PhTree, PhTreeStats, Representation, NULL_NODE};

// ============================================================================
// TREE STRUCTURE OPERATIONS
// ============================================================================

impl<V> PhTree<V> {
    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of coordinates per key.
    pub fn dims(&self) -> usize {
        self.config.dims
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        let removed = self.len;
        self.nodes.clear();
        self.root = NULL_NODE;
        self.len = 0;
        debug!(removed, "cleared tree");
    }

    /// Number of nodes on the longest root-to-leaf path, `0` when empty.
    ///
    /// The depth is bounded by the key width, not by the number of entries.
    pub fn depth(&self) -> usize {
        self.stats().max_depth
    }

    /// Number of allocated nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Allocation statistics of the node arena.
    pub fn arena_stats(&self) -> CompactArenaStats {
        self.nodes.stats()
    }

    /// Walk the tree and summarize its shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::{PhTree, PhTreeConfig};
    ///
    /// let config = PhTreeConfig::new(2).with_ni_thresholds(4, 4);
    /// let mut tree = PhTree::with_config(config).unwrap();
    /// for i in 0..100u64 {
    ///     tree.put(&[i, i], i);
    /// }
    /// let stats = tree.stats();
    /// assert_eq!(stats.value_count, 100);
    /// assert_eq!(stats.node_count, tree.node_count());
    /// ```
    pub fn stats(&self) -> PhTreeStats {
        let mut stats = PhTreeStats::default();
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        if self.root != NULL_NODE {
            stack.push((self.root, 1));
        }
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            stats.node_count += 1;
            stats.value_count += node.value_count();
            stats.total_infix_len += node.infix_len() as usize;
            stats.max_depth = stats.max_depth.max(depth);
            match node.representation() {
                Representation::Ahc => stats.ahc_nodes += 1,
                Representation::Lhc => stats.lhc_nodes += 1,
                Representation::Ni => stats.ni_nodes += 1,
            }
            stack.extend(node.children().map(|child| (child, depth + 1)));
        }
        stats
    }
}
