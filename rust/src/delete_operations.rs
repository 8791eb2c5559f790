//! DELETE operations for PhTree.
//!
//! Removing a value can leave its node with a single entry. Such a node is
//! merged away: the remaining value or child is moved into the parent's slot
//! and, for a child, the child's infix grows by the merged node's infix plus
//! the address bit. The root is kept until it is empty.

use tracing::{debug, trace};

use crate::error::{ModifyResult, PhTreeError};
use crate::key_bits::apply_address;
use crate::types::{NodeId, PhTree, Slot, NULL_NODE};

impl<V> PhTree<V> {
    // ============================================================================
    // PUBLIC DELETE OPERATIONS
    // ============================================================================

    /// Remove `key` from the tree, returning its value if it was present.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not have exactly `dims()` coordinates. Use
    /// [`try_remove`](Self::try_remove) for a checked variant.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let mut tree = PhTree::new(2).unwrap();
    /// tree.put(&[1, 2], "a");
    /// assert_eq!(tree.remove(&[1, 2]), Some("a"));
    /// assert_eq!(tree.remove(&[1, 2]), None);
    /// assert!(tree.is_empty());
    /// ```
    pub fn remove(&mut self, key: &[u64]) -> Option<V> {
        self.assert_dims(key);
        let key = self.encode_key(key);
        self.remove_encoded(&key)
    }

    /// Checked variant of [`remove`](Self::remove); a missing key is
    /// `Err(KeyNotFound)`.
    pub fn try_remove(&mut self, key: &[u64]) -> ModifyResult<V> {
        self.check_dims(key)?;
        let key = self.encode_key(key);
        self.remove_encoded(&key).ok_or(PhTreeError::KeyNotFound)
    }

    // ============================================================================
    // DELETE HELPERS
    // ============================================================================

    pub(crate) fn remove_encoded(&mut self, key: &[u64]) -> Option<V> {
        let mut path = Vec::new();
        let (id, addr) = self.locate_with_path(key, Some(&mut path))?;
        self.remove_located(id, addr, &path)
    }

    /// Remove the value at `addr` of node `id`, merging the node into its
    /// parent when it is left with one entry. `path` lists the ancestors of
    /// `id` as returned by `locate_with_path`.
    pub(crate) fn remove_located(&mut self, id: NodeId, addr: u64, path: &[(NodeId, u64)]) -> Option<V> {
        let node = self.nodes.get_mut(id)?;
        if !matches!(node.find(addr)?.slot, Slot::Value(_)) {
            return None;
        }
        let Slot::Value(value) = node.remove_entry(addr) else {
            return None;
        };
        self.len -= 1;

        let remaining = node.entry_count();
        if id == self.root {
            if remaining == 0 {
                self.nodes.deallocate(id);
                self.root = NULL_NODE;
                debug!("removed empty root node");
            } else {
                node.adjust_representation(&self.config);
            }
        } else if remaining == 1 {
            if let Some(&(parent, parent_addr)) = path.last() {
                self.merge_into_parent(id, parent, parent_addr);
            }
        } else {
            node.adjust_representation(&self.config);
        }
        Some(value)
    }

    /// Replace node `id`, found at `parent_addr` of `parent`, by its only
    /// remaining entry.
    pub(crate) fn merge_into_parent(&mut self, id: NodeId, parent: NodeId, parent_addr: u64) {
        let (remaining_addr, infix_len, key) = {
            let (Some(node), Some(parent_node)) = (self.nodes.get(id), self.nodes.get(parent)) else {
                return;
            };
            let Some(entry) = node.entries().next() else {
                return;
            };
            let Some(link) = parent_node.find(parent_addr) else {
                return;
            };
            // Parent fragment (the infix), the address bit, then the remaining
            // entry's own fragment.
            let mut key = vec![0u64; self.config.dims];
            link.fragment.load_into(parent_node.post_len, &mut key);
            apply_address(entry.addr, node.post_len, &mut key);
            entry.fragment.load_into(node.post_len, &mut key);
            (entry.addr, node.infix_len, key)
        };

        let Some(mut node) = self.nodes.deallocate(id) else {
            return;
        };
        let slot = node.remove_entry(remaining_addr);
        if let Slot::Child(grandchild) = slot {
            if let Some(grandchild) = self.nodes.get_mut(grandchild) {
                grandchild.infix_len += infix_len + 1;
            }
        }
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.replace_entry(parent_addr, Some(&key), slot);
            parent_node.adjust_representation(&self.config);
        }
        trace!(node = id, parent, "merged node into parent");
    }
}
