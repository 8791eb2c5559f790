//! INSERT operations for PhTree.
//!
//! Insertion walks down from the root until the key's address in some node
//! is free (store the value), holds the same key (replace), holds another
//! value (split: a new node below the conflicting bit takes both values), or
//! holds a child whose infix disagrees with the key (infix split: a new node
//! is placed between the current node and that child).

use tracing::{debug, trace};

use crate::bit_codec::low_mask;
use crate::error::ModifyResult;
use crate::key_bits::{hc_address, prefix_mask, ROOT_POST_LEN};
use crate::node::{bit_len, infix_mask};
use crate::types::{Node, NodeId, PhTree, Slot, NULL_NODE};

/// What to do at the current node while inserting.
enum PutStep {
    Insert,
    Replace,
    Descend(NodeId),
    /// Another value shares the address; `other` is its full key.
    SplitValue { conflict: u8, other: Vec<u64> },
    /// A child's infix disagrees with the key; `other` is the child's prefix.
    SplitInfix {
        child: NodeId,
        conflict: u8,
        other: Vec<u64>,
    },
}

impl<V> PhTree<V> {
    // ============================================================================
    // PUBLIC INSERT OPERATIONS
    // ============================================================================

    /// Store `value` at `key`, returning the previous value if there was one.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not have exactly `dims()` coordinates. Use
    /// [`try_put`](Self::try_put) for a checked variant.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let mut tree = PhTree::new(2).unwrap();
    /// assert_eq!(tree.put(&[1, 2], "a"), None);
    /// assert_eq!(tree.put(&[1, 2], "b"), Some("a"));
    /// assert_eq!(tree.len(), 1);
    /// ```
    pub fn put(&mut self, key: &[u64], value: V) -> Option<V> {
        self.assert_dims(key);
        let key = self.encode_key(key);
        self.put_encoded(&key, value)
    }

    /// Checked variant of [`put`](Self::put).
    pub fn try_put(&mut self, key: &[u64], value: V) -> ModifyResult<Option<V>> {
        self.check_dims(key)?;
        let key = self.encode_key(key);
        Ok(self.put_encoded(&key, value))
    }

    /// Store `value` only if `key` is absent.
    ///
    /// Returns the value already present, leaving the tree unchanged, or
    /// `None` after inserting.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let mut tree = PhTree::new(1).unwrap();
    /// assert_eq!(tree.put_if_absent(&[4], "a"), None);
    /// assert_eq!(tree.put_if_absent(&[4], "b"), Some(&"a"));
    /// ```
    pub fn put_if_absent(&mut self, key: &[u64], value: V) -> Option<&V> {
        self.assert_dims(key);
        let key = self.encode_key(key).into_owned();
        if self.locate(&key).is_some() {
            return self.get_encoded(&key);
        }
        self.put_encoded(&key, value);
        None
    }

    // ============================================================================
    // INSERT HELPERS
    // ============================================================================

    pub(crate) fn put_encoded(&mut self, key: &[u64], value: V) -> Option<V> {
        if self.root == NULL_NODE {
            let mut root = Node::new(self.config.dims, 0, ROOT_POST_LEN);
            root.insert_entry(hc_address(key, ROOT_POST_LEN), key, Slot::Value(value));
            root.adjust_representation(&self.config);
            self.root = self.nodes.allocate(root);
            self.len += 1;
            debug!(root = self.root, dims = self.config.dims, "created root node");
            return None;
        }
        self.put_from(self.root, key, value)
    }

    /// Insert starting at `start`, whose region must contain `key`.
    pub(crate) fn put_from(&mut self, start: NodeId, key: &[u64], value: V) -> Option<V> {
        let mut id = start;
        loop {
            let node = self.nodes.get(id)?;
            let post_len = node.post_len;
            let addr = hc_address(key, post_len);
            let step = match node.find(addr) {
                None => PutStep::Insert,
                Some(entry) => match entry.slot {
                    Slot::Empty => PutStep::Insert,
                    Slot::Value(_) => {
                        let diff = entry.fragment.diff(post_len, key, low_mask(post_len as usize));
                        if diff == 0 {
                            PutStep::Replace
                        } else {
                            let mut other = key.to_vec();
                            entry.fragment.load_into(post_len, &mut other);
                            PutStep::SplitValue {
                                conflict: bit_len(diff),
                                other,
                            }
                        }
                    }
                    Slot::Child(child) => {
                        let child_post_len = self.nodes.get(*child)?.post_len;
                        let mask = infix_mask(post_len, child_post_len);
                        let diff = entry.fragment.diff(post_len, key, mask);
                        if diff == 0 {
                            PutStep::Descend(*child)
                        } else {
                            let mut other = key.to_vec();
                            entry.fragment.load_into(post_len, &mut other);
                            PutStep::SplitInfix {
                                child: *child,
                                conflict: bit_len(diff),
                                other,
                            }
                        }
                    }
                },
            };

            match step {
                PutStep::Descend(child) => id = child,
                PutStep::Insert => {
                    let node = self.nodes.get_mut(id)?;
                    node.insert_entry(addr, key, Slot::Value(value));
                    node.adjust_representation(&self.config);
                    self.len += 1;
                    return None;
                }
                PutStep::Replace => {
                    let slot = self.nodes.get_mut(id)?.value_mut(addr)?;
                    return Some(std::mem::replace(slot, value));
                }
                PutStep::SplitValue { conflict, other } => {
                    let sub_post_len = conflict - 1;
                    let sub = self.insert_split_node(id, addr, key, &other, conflict)?;
                    let node = self.nodes.get_mut(sub)?;
                    node.insert_entry(hc_address(key, sub_post_len), key, Slot::Value(value));
                    node.adjust_representation(&self.config);
                    self.len += 1;
                    trace!(parent = id, node = sub, post_len = sub_post_len, "split value into new node");
                    return None;
                }
                PutStep::SplitInfix {
                    child,
                    conflict,
                    other,
                } => {
                    let mid_post_len = conflict - 1;
                    let mid = self.insert_split_node(id, addr, key, &other, conflict)?;
                    if let Some(child_node) = self.nodes.get_mut(child) {
                        child_node.infix_len = mid_post_len - child_node.post_len - 1;
                    }
                    let node = self.nodes.get_mut(mid)?;
                    node.insert_entry(hc_address(key, mid_post_len), key, Slot::Value(value));
                    node.adjust_representation(&self.config);
                    self.len += 1;
                    trace!(parent = id, node = mid, child, post_len = mid_post_len, "split infix with new node");
                    return None;
                }
            }
        }
    }

    /// Put a new node splitting on bit `conflict - 1` at `addr` of `parent`
    /// and move the entry that was there into it. `other` is the full key (or
    /// child prefix) of the moved entry. Returns the new node.
    fn insert_split_node(
        &mut self,
        parent: NodeId,
        addr: u64,
        key: &[u64],
        other: &[u64],
        conflict: u8,
    ) -> Option<NodeId> {
        let post_len = conflict - 1;
        let parent_post_len = self.nodes.get(parent)?.post_len;
        debug_assert!(conflict <= parent_post_len);
        let sub = self
            .nodes
            .allocate(Node::new(self.config.dims, parent_post_len - conflict, post_len));

        let mask = prefix_mask(post_len);
        let prefix: Vec<u64> = key.iter().map(|&v| v & mask).collect();
        let parent_node = self.nodes.get_mut(parent)?;
        let moved = parent_node.replace_entry(addr, Some(&prefix), Slot::Child(sub));
        parent_node.adjust_representation(&self.config);

        let node = self.nodes.get_mut(sub)?;
        node.insert_entry(hc_address(other, post_len), other, moved);
        Some(sub)
    }
}
