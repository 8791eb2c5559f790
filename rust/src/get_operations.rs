//! GET operations for PhTree.
//!
//! This module contains the point lookups plus the helpers shared by every
//! operation: key length checks, key encoding, and the descent from the root
//! to the node holding a key.

use std::borrow::Cow;

use crate::bit_codec::low_mask;
use crate::error::{KeyResult, PhTreeError};
use crate::key_bits::{hc_address, KeyEncoding};
use crate::node::infix_mask;
use crate::types::{NodeId, PhTree, Slot};

impl<V> PhTree<V> {
    // ============================================================================
    // PUBLIC GET OPERATIONS
    // ============================================================================

    /// Get a reference to the value stored at `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not have exactly `dims()` coordinates. Use
    /// [`try_get`](Self::try_get) for a checked variant.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let mut tree = PhTree::new(2).unwrap();
    /// tree.put(&[1, 2], "one");
    /// assert_eq!(tree.get(&[1, 2]), Some(&"one"));
    /// assert_eq!(tree.get(&[2, 1]), None);
    /// ```
    pub fn get(&self, key: &[u64]) -> Option<&V> {
        self.assert_dims(key);
        let key = self.encode_key(key);
        self.get_encoded(&key)
    }

    /// Check if `key` is present in the tree.
    pub fn contains(&self, key: &[u64]) -> bool {
        self.get(key).is_some()
    }

    /// Get a mutable reference to the value stored at `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let mut tree = PhTree::new(1).unwrap();
    /// tree.put(&[7], 1);
    /// if let Some(value) = tree.get_mut(&[7]) {
    ///     *value += 1;
    /// }
    /// assert_eq!(tree.get(&[7]), Some(&2));
    /// ```
    pub fn get_mut(&mut self, key: &[u64]) -> Option<&mut V> {
        self.assert_dims(key);
        let key = self.encode_key(key);
        let (id, addr) = self.locate(&key)?;
        self.nodes.get_mut(id)?.value_mut(addr)
    }

    /// Get a value, reporting a wrong key length or a missing key as an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::{PhTree, PhTreeError};
    ///
    /// let mut tree = PhTree::new(2).unwrap();
    /// tree.put(&[1, 2], "one");
    /// assert_eq!(tree.try_get(&[1, 2]), Ok(&"one"));
    /// assert_eq!(tree.try_get(&[2, 2]), Err(PhTreeError::KeyNotFound));
    /// assert!(tree.try_get(&[1]).is_err());
    /// ```
    pub fn try_get(&self, key: &[u64]) -> KeyResult<&V> {
        self.check_dims(key)?;
        let key = self.encode_key(key);
        self.get_encoded(&key).ok_or(PhTreeError::KeyNotFound)
    }

    // ============================================================================
    // KEY HANDLING
    // ============================================================================

    pub(crate) fn check_dims(&self, key: &[u64]) -> KeyResult<()> {
        if key.len() != self.config.dims {
            return Err(PhTreeError::dimension_mismatch(self.config.dims, key.len()));
        }
        Ok(())
    }

    pub(crate) fn assert_dims(&self, key: &[u64]) {
        if let Err(err) = self.check_dims(key) {
            panic!("{}", err);
        }
    }

    /// Map external coordinates to the internal unsigned order.
    pub(crate) fn encode_key<'k>(&self, key: &'k [u64]) -> Cow<'k, [u64]> {
        match self.config.key_encoding {
            KeyEncoding::Unsigned => Cow::Borrowed(key),
            encoding => Cow::Owned(key.iter().map(|&v| encoding.encode(v)).collect()),
        }
    }

    // ============================================================================
    // DESCENT HELPERS
    // ============================================================================

    pub(crate) fn get_encoded(&self, key: &[u64]) -> Option<&V> {
        let (id, addr) = self.locate(key)?;
        match self.nodes.get(id)?.find(addr)?.slot {
            Slot::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Node and address holding the value for `key`.
    pub(crate) fn locate(&self, key: &[u64]) -> Option<(NodeId, u64)> {
        self.locate_with_path(key, None)
    }

    /// Like [`locate`](Self::locate), recording every ancestor of the value's
    /// node together with the address taken in it, root first.
    pub(crate) fn locate_with_path(
        &self,
        key: &[u64],
        mut path: Option<&mut Vec<(NodeId, u64)>>,
    ) -> Option<(NodeId, u64)> {
        let mut id = self.root;
        loop {
            let node = self.nodes.get(id)?;
            let post_len = node.post_len;
            let addr = hc_address(key, post_len);
            let entry = node.find(addr)?;
            match entry.slot {
                Slot::Value(_) => {
                    let diff = entry.fragment.diff(post_len, key, low_mask(post_len as usize));
                    return (diff == 0).then_some((id, addr));
                }
                Slot::Child(child_id) => {
                    let child = self.nodes.get(*child_id)?;
                    if entry.fragment.diff(post_len, key, infix_mask(post_len, child.post_len)) != 0 {
                        return None;
                    }
                    if let Some(path) = path.as_deref_mut() {
                        path.push((id, addr));
                    }
                    id = *child_id;
                }
                Slot::Empty => return None,
            }
        }
    }
}
