//! Validation and debugging utilities for PhTree.
//!
//! This module contains the invariant checks used by the tests. They walk the
//! whole tree and are far too slow for anything else.

use crate::bit_codec::low_mask;
use crate::error::{PhTreeError, PhTreeResult};
use crate::key_bits::ROOT_POST_LEN;
use crate::types::{Content, Node, NodeId, PhTree, Slot, NULL_NODE};

// ============================================================================
// VALIDATION METHODS
// ============================================================================

impl<V> PhTree<V> {
    /// Check if the tree maintains its structural invariants.
    /// Returns true if all invariants are satisfied.
    pub fn check_invariants(&self) -> bool {
        self.check_invariants_detailed().is_ok()
    }

    /// Check invariants with detailed error reporting.
    pub fn check_invariants_detailed(&self) -> Result<(), String> {
        if self.root == NULL_NODE {
            if self.len != 0 || !self.nodes.is_empty() {
                return Err(format!(
                    "Tree without root has {} entries and {} nodes",
                    self.len,
                    self.nodes.len()
                ));
            }
            return Ok(());
        }

        let root = self
            .nodes
            .get(self.root)
            .ok_or_else(|| format!("Root node {} is not allocated", self.root))?;
        if root.post_len != ROOT_POST_LEN || root.infix_len != 0 {
            return Err(format!(
                "Root has post_len {} and infix_len {}",
                root.post_len, root.infix_len
            ));
        }

        let mut values = 0;
        let mut reached = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| format!("Node {} is referenced but not allocated", id))?;
            reached += 1;
            values += node.value_count();
            self.check_node(id, node)?;
            stack.extend(node.children());
        }

        if values != self.len {
            return Err(format!("Nodes hold {} values but len is {}", values, self.len));
        }
        self.check_arena_tree_consistency(reached).map_err(|e| e.to_string())?;
        self.check_lookup_consistency()
    }

    /// Every allocated node must be reachable from the root.
    fn check_arena_tree_consistency(&self, reached: usize) -> PhTreeResult<()> {
        let stats = self.nodes.stats();
        if reached != stats.allocated_count {
            return Err(PhTreeError::arena_error(
                "Node consistency check",
                &format!("{} in tree vs {} in arena", reached, stats.allocated_count),
            ));
        }
        Ok(())
    }

    /// Check one node and the links to its children.
    fn check_node(&self, id: NodeId, node: &Node<V>) -> Result<(), String> {
        if node.dims() != self.config.dims {
            return Err(format!("Node {} has {} dims, tree has {}", id, node.dims(), self.config.dims));
        }
        if id != self.root && node.entry_count() < 2 {
            return Err(format!("Node {} has only {} entries", id, node.entry_count()));
        }

        match &node.content {
            Content::Ahc(hc) => {
                if hc.slots.len() != 1usize << node.dims() {
                    return Err(format!("AHC node {} has {} slots", id, hc.slots.len()));
                }
            }
            Content::Lhc(_) => {}
            Content::Ni(ni) => {
                ni.check_invariants_detailed()
                    .map_err(|e| format!("Nested index of node {}: {}", id, e))?;
            }
        }

        let mut values = 0;
        let mut subs = 0;
        let mut last_addr = None;
        for entry in node.entries() {
            if last_addr.is_some_and(|last| last >= entry.addr) {
                return Err(format!("Node {} yields address {} out of order", id, entry.addr));
            }
            last_addr = Some(entry.addr);
            match entry.slot {
                Slot::Value(_) => values += 1,
                Slot::Child(child_id) => {
                    subs += 1;
                    let child = self
                        .nodes
                        .get(*child_id)
                        .ok_or_else(|| format!("Node {} links to missing node {}", id, child_id))?;
                    if child.post_len >= node.post_len
                        || node.post_len - child.post_len != child.infix_len + 1
                    {
                        return Err(format!(
                            "Node {} (post_len {}) has child {} with post_len {} and infix_len {}",
                            id, node.post_len, child_id, child.post_len, child.infix_len
                        ));
                    }
                    let zeros = vec![0u64; node.dims()];
                    let below = low_mask(child.post_len as usize + 1);
                    if entry.fragment.diff(node.post_len, &zeros, below) != 0 {
                        return Err(format!(
                            "Node {} stores bits below the split of child {}",
                            id, child_id
                        ));
                    }
                }
                Slot::Empty => return Err(format!("Node {} yields an empty slot", id)),
            }
        }
        if values != node.value_count() || subs != node.sub_count() {
            return Err(format!(
                "Node {} counts {} values and {} children but holds {} and {}",
                id,
                node.value_count(),
                node.sub_count(),
                values,
                subs
            ));
        }
        Ok(())
    }

    /// Every key produced by iteration must be found again by lookup.
    fn check_lookup_consistency(&self) -> Result<(), String> {
        let mut count = 0;
        for (key, _) in self.iter() {
            count += 1;
            let encoded = self.encode_key(&key);
            if self.locate(&encoded).is_none() {
                return Err(format!("Iterated key {:?} cannot be looked up", key));
            }
        }
        if count != self.len {
            return Err(format!("Iteration yields {} entries but len is {}", count, self.len));
        }
        Ok(())
    }

    // ============================================================================
    // VALIDATION HELPERS FOR OPERATIONS
    // ============================================================================

    /// Check if the tree is in a valid state, reporting failures as
    /// `DataIntegrityError` for `operation`.
    pub fn validate_for_operation(&self, operation: &str) -> PhTreeResult<()> {
        self.check_invariants_detailed()
            .map_err(|e| PhTreeError::data_integrity(operation, &e))
    }
}
