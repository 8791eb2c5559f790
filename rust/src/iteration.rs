//! Iterator implementations for PhTree.
//!
//! Every traversal, full or windowed, is a [`QueryIter`]: a depth-first walk
//! with an explicit stack of nodes. For each node on the stack the window is
//! turned into a pair of address masks once, and only addresses satisfying
//! both masks are visited. Subtrees whose prefix falls outside the window are
//! never pushed.

use std::iter::FusedIterator;

use crate::key_bits::{
    apply_address, infix_matches, key_in_range, range_mask_lower_upper, KeyEncoding,
};
use crate::types::{Node, PhTree, Slot, NULL_NODE};

// ============================================================================
// ITERATOR STRUCTS
// ============================================================================

/// Iterator over the entries inside an axis-aligned box.
///
/// Yields `(key, &value)` with the key decoded to the tree's external form.
/// Entries come in z-order of their encoded keys.
pub struct QueryIter<'a, V> {
    tree: &'a PhTree<V>,
    /// Encoded lower corner.
    min: Vec<u64>,
    /// Encoded upper corner.
    max: Vec<u64>,
    stack: Vec<Frame<'a, V>>,
}

/// A node being scanned.
struct Frame<'a, V> {
    node: &'a Node<V>,
    /// Key bits above the node's split bit; lower bits are zero.
    prefix: Vec<u64>,
    lower: u64,
    upper: u64,
    /// Next address to look at, `None` once the node is exhausted.
    next_from: Option<u64>,
}

/// Iterator over the keys of a tree.
pub struct Keys<'a, V> {
    items: QueryIter<'a, V>,
}

/// Iterator over the values of a tree.
pub struct Values<'a, V> {
    items: QueryIter<'a, V>,
}

// ============================================================================
// PHTREE ITERATOR METHODS
// ============================================================================

impl<V> PhTree<V> {
    /// Iterate over every `(key, &value)` pair.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let mut tree = PhTree::new(2).unwrap();
    /// tree.put(&[1, 2], 'a');
    /// tree.put(&[5, 0], 'b');
    ///
    /// let mut entries: Vec<_> = tree.iter().collect();
    /// entries.sort();
    /// assert_eq!(entries, vec![(vec![1, 2], &'a'), (vec![5, 0], &'b')]);
    /// ```
    pub fn iter(&self) -> QueryIter<'_, V> {
        let dims = self.config.dims;
        QueryIter::new(self, vec![0; dims], vec![u64::MAX; dims])
    }

    /// Iterate over every key.
    pub fn keys(&self) -> Keys<'_, V> {
        Keys { items: self.iter() }
    }

    /// Iterate over every value.
    pub fn values(&self) -> Values<'_, V> {
        Values { items: self.iter() }
    }
}

impl<'a, V> IntoIterator for &'a PhTree<V> {
    type Item = (Vec<u64>, &'a V);
    type IntoIter = QueryIter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
// QUERYITER IMPLEMENTATION
// ============================================================================

impl<'a, V> QueryIter<'a, V> {
    /// Start a walk over the box `[min, max]` given in encoded form.
    pub(crate) fn new(tree: &'a PhTree<V>, min: Vec<u64>, max: Vec<u64>) -> Self {
        let mut iter = Self {
            tree,
            min,
            max,
            stack: Vec::new(),
        };
        let empty_box = iter.min.iter().zip(iter.max.iter()).any(|(lo, hi)| lo > hi);
        if !empty_box && tree.root != NULL_NODE {
            if let Some(root) = tree.nodes.get(tree.root) {
                let prefix = vec![0; tree.config.dims];
                iter.push_node(root, prefix);
            }
        }
        iter
    }

    /// Schedule `node` if its region intersects the box.
    fn push_node(&mut self, node: &'a Node<V>, prefix: Vec<u64>) {
        if !infix_matches(&prefix, &self.min, &self.max, node.post_len) {
            return;
        }
        let (lower, upper) = range_mask_lower_upper(node.post_len, &prefix, &self.min, &self.max);
        self.stack.push(Frame {
            node,
            prefix,
            lower,
            upper,
            next_from: Some(0),
        });
    }

    fn encoding(&self) -> KeyEncoding {
        self.tree.config.key_encoding
    }
}

impl<'a, V> Iterator for QueryIter<'a, V> {
    type Item = (Vec<u64>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let node = frame.node;
            let entry = match frame.next_from {
                Some(from) => node.next_entry(from, frame.lower, frame.upper),
                None => None,
            };
            let Some(entry) = entry else {
                self.stack.pop();
                continue;
            };
            frame.next_from = entry.addr.checked_add(1);

            let mut key = frame.prefix.clone();
            apply_address(entry.addr, node.post_len, &mut key);
            entry.fragment.load_into(node.post_len, &mut key);

            match entry.slot {
                Slot::Value(value) => {
                    if key_in_range(&key, &self.min, &self.max) {
                        self.encoding().decode_in_place(&mut key);
                        return Some((key, value));
                    }
                }
                Slot::Child(child) => {
                    if let Some(child) = self.tree.nodes.get(*child) {
                        self.push_node(child, key);
                    }
                }
                Slot::Empty => {}
            }
        }
    }
}

impl<V> FusedIterator for QueryIter<'_, V> {}

impl<'a, V> Iterator for Keys<'a, V> {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next().map(|(key, _)| key)
    }
}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next().map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use crate::{PhTree, PhTreeConfig};
    use std::collections::BTreeSet;

    #[test]
    fn test_iter_empty_tree() {
        let tree = PhTree::<i32>::new(3).unwrap();
        assert_eq!(tree.iter().count(), 0);
        assert_eq!(tree.keys().count(), 0);
    }

    #[test]
    fn test_iter_yields_each_entry_once() {
        let mut tree = PhTree::new(2).unwrap();
        let mut expected = BTreeSet::new();
        for x in 0..20u64 {
            for y in 0..20u64 {
                let key = vec![x * 7919 % 1000, y << 40];
                tree.put(&key, x * 100 + y);
                expected.insert(key);
            }
        }
        let seen: Vec<_> = tree.keys().collect();
        assert_eq!(seen.len(), expected.len());
        assert_eq!(seen.into_iter().collect::<BTreeSet<_>>(), expected);
        assert_eq!(tree.values().count(), 400);
    }

    #[test]
    fn test_iter_signed_keys_are_decoded() {
        let mut tree = PhTree::new_signed(1).unwrap();
        for v in [-3i64, 0, 7, i64::MIN, i64::MAX] {
            tree.put(&[v as u64], v);
        }
        // Z-order of the encoded keys is signed order in one dimension.
        let values: Vec<i64> = tree.iter().map(|(key, v)| {
            assert_eq!(key[0] as i64, *v);
            *v
        }).collect();
        assert_eq!(values, vec![i64::MIN, -3, 0, 7, i64::MAX]);
    }

    #[test]
    fn test_into_iterator_for_reference() {
        let mut tree = PhTree::with_config(PhTreeConfig::new(1).with_ni_thresholds(2, 2)).unwrap();
        for v in 0..50u64 {
            tree.put(&[v], v);
        }
        let mut total = 0;
        for (key, value) in &tree {
            assert_eq!(key[0], *value);
            total += value;
        }
        assert_eq!(total, (0..50).sum());
    }
}
