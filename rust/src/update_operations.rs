//! UPDATE operations for PhTree.
//!
//! Moving a value to a new key. When the keys differ only below the split
//! bit of the node holding the value, the fragment is rewritten in place.
//! Otherwise the value is removed and re-inserted starting from the lowest
//! surviving ancestor whose region still contains the new key, instead of
//! from the root.

use crate::error::{ModifyResult, PhTreeError};
use crate::key_bits::{max_conflicting_bit, ROOT_POST_LEN};
use crate::types::PhTree;

impl<V> PhTree<V> {
    /// Move the value stored at `old_key` to `new_key`.
    ///
    /// Returns a reference to the moved value, or `None` (leaving the tree
    /// unchanged) when `old_key` is absent or `new_key` already holds another
    /// value.
    ///
    /// # Panics
    ///
    /// Panics if either key does not have exactly `dims()` coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let mut tree = PhTree::new(2).unwrap();
    /// tree.put(&[1, 1], "a");
    /// tree.put(&[9, 9], "b");
    ///
    /// assert_eq!(tree.update(&[1, 1], &[2, 3]), Some(&"a"));
    /// assert_eq!(tree.get(&[1, 1]), None);
    /// assert_eq!(tree.get(&[2, 3]), Some(&"a"));
    ///
    /// // The target is occupied: nothing moves.
    /// assert_eq!(tree.update(&[2, 3], &[9, 9]), None);
    /// assert_eq!(tree.len(), 2);
    /// ```
    pub fn update(&mut self, old_key: &[u64], new_key: &[u64]) -> Option<&V> {
        self.assert_dims(old_key);
        self.assert_dims(new_key);
        let old_key = self.encode_key(old_key).into_owned();
        let new_key = self.encode_key(new_key).into_owned();
        self.update_encoded(&old_key, &new_key).ok()
    }

    /// Checked variant of [`update`](Self::update).
    ///
    /// Fails with `KeyNotFound` when `old_key` is absent and with
    /// `KeyCollision` when `new_key` is occupied.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::{PhTree, PhTreeError};
    ///
    /// let mut tree = PhTree::new(1).unwrap();
    /// tree.put(&[1], 'x');
    /// tree.put(&[2], 'y');
    /// assert_eq!(tree.try_update(&[5], &[6]), Err(PhTreeError::KeyNotFound));
    /// assert_eq!(tree.try_update(&[1], &[2]), Err(PhTreeError::KeyCollision));
    /// assert_eq!(tree.try_update(&[1], &[3]), Ok(&'x'));
    /// ```
    pub fn try_update(&mut self, old_key: &[u64], new_key: &[u64]) -> ModifyResult<&V> {
        self.check_dims(old_key)?;
        self.check_dims(new_key)?;
        let old_key = self.encode_key(old_key).into_owned();
        let new_key = self.encode_key(new_key).into_owned();
        self.update_encoded(&old_key, &new_key)
    }

    pub(crate) fn update_encoded(&mut self, old_key: &[u64], new_key: &[u64]) -> ModifyResult<&V> {
        let mut path = Vec::new();
        let (id, addr) = self
            .locate_with_path(old_key, Some(&mut path))
            .ok_or(PhTreeError::KeyNotFound)?;
        if old_key != new_key {
            if self.locate(new_key).is_some() {
                return Err(PhTreeError::KeyCollision);
            }

            let conflict = max_conflicting_bit(old_key, new_key, ROOT_POST_LEN);
            let node = self
                .nodes
                .get_mut(id)
                .ok_or_else(|| PhTreeError::arena_error("update", "located node is not allocated"))?;
            if conflict <= node.post_len {
                // Same address, only the postfix changes.
                node.set_fragment(addr, new_key);
            } else {
                let value = self
                    .remove_located(id, addr, &path)
                    .ok_or_else(|| PhTreeError::data_integrity("update", "located value vanished"))?;
                let start = std::iter::once(id)
                    .chain(path.iter().rev().map(|&(ancestor, _)| ancestor))
                    .find(|&candidate| {
                        self.nodes
                            .get(candidate)
                            .is_some_and(|node| node.post_len + 1 >= conflict)
                    });
                match start {
                    Some(start) => self.put_from(start, new_key, value),
                    None => self.put_encoded(new_key, value),
                };
            }
        }
        self.get_encoded(new_key)
            .ok_or_else(|| PhTreeError::data_integrity("update", "value not found at its new key"))
    }
}
