//! Nested index: a paged B+ tree from hypercube address to entry.
//!
//! Nodes with a large fan-out store their entries here instead of in a packed
//! array. Pages live in a [`CompactArena`] owned by the index, leaves hold
//! sorted `(address, entry)` pairs and branches hold separator keys. A page
//! splits when it exceeds the configured capacity and borrows from or merges
//! with a sibling when it drops below half of it.
//!
//! Range iteration takes the same `(lower, upper)` masks as the hypercube
//! query and seeks straight to the next address that can satisfy them, so
//! pages without such addresses are never visited.

use crate::compact_arena::{CompactArena, NodeId, NULL_NODE};
use crate::key_bits::{address_in_masks, first_address_at_or_after};
use tracing::trace;

/// Default number of entries (leaves) or children (branches) per page.
pub const DEFAULT_PAGE_CAPACITY: usize = 32;

/// Smallest page capacity that still allows split and merge.
pub const MIN_PAGE_CAPACITY: usize = 4;

// ============================================================================
// PAGES
// ============================================================================

#[derive(Debug, Clone)]
struct LeafPage<E> {
    keys: Vec<u64>,
    entries: Vec<E>,
}

#[derive(Debug, Clone)]
struct BranchPage {
    /// Separator `keys[i]` is the smallest key under `children[i + 1]`.
    keys: Vec<u64>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
enum Page<E> {
    Leaf(LeafPage<E>),
    Branch(BranchPage),
}

impl<E> Default for Page<E> {
    fn default() -> Self {
        Page::Leaf(LeafPage {
            keys: Vec::new(),
            entries: Vec::new(),
        })
    }
}

impl<E> Page<E> {
    /// Entries of a leaf, children of a branch.
    fn len(&self) -> usize {
        match self {
            Page::Leaf(leaf) => leaf.keys.len(),
            Page::Branch(branch) => branch.children.len(),
        }
    }

    /// Split off the upper half, returning the separator and the new page.
    fn split(&mut self) -> (u64, Page<E>) {
        match self {
            Page::Leaf(leaf) => {
                let (separator, right) = leaf.split();
                (separator, Page::Leaf(right))
            }
            Page::Branch(branch) => {
                let (separator, right) = branch.split();
                (separator, Page::Branch(right))
            }
        }
    }
}

impl<E> LeafPage<E> {
    fn split(&mut self) -> (u64, LeafPage<E>) {
        let mid = self.keys.len() / 2;
        let right = LeafPage {
            keys: self.keys.split_off(mid),
            entries: self.entries.split_off(mid),
        };
        (right.keys[0], right)
    }

    fn borrow_last(&mut self) -> Option<(u64, E)> {
        Some((self.keys.pop()?, self.entries.pop()?))
    }

    fn borrow_first(&mut self) -> Option<(u64, E)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.entries.remove(0)))
    }

    fn accept_from_left(&mut self, key: u64, entry: E) {
        self.keys.insert(0, key);
        self.entries.insert(0, entry);
    }

    fn accept_from_right(&mut self, key: u64, entry: E) {
        self.keys.push(key);
        self.entries.push(entry);
    }

    fn merge_from(&mut self, other: &mut LeafPage<E>) {
        self.keys.append(&mut other.keys);
        self.entries.append(&mut other.entries);
    }
}

impl BranchPage {
    fn find_child_index(&self, key: u64) -> usize {
        self.keys.partition_point(|&k| k <= key)
    }

    fn split(&mut self) -> (u64, BranchPage) {
        let mid = self.children.len() / 2;
        let separator = self.keys[mid - 1];
        let right = BranchPage {
            keys: self.keys.split_off(mid),
            children: self.children.split_off(mid),
        };
        self.keys.truncate(mid - 1);
        (separator, right)
    }

    fn borrow_last(&mut self) -> Option<(u64, NodeId)> {
        Some((self.keys.pop()?, self.children.pop()?))
    }

    fn borrow_first(&mut self) -> Option<(u64, NodeId)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.children.remove(0)))
    }

    /// Returns the new separator for the parent.
    fn accept_from_left(&mut self, separator: u64, moved_key: u64, moved_child: NodeId) -> u64 {
        self.keys.insert(0, separator);
        self.children.insert(0, moved_child);
        moved_key
    }

    /// Returns the new separator for the parent.
    fn accept_from_right(&mut self, separator: u64, moved_key: u64, moved_child: NodeId) -> u64 {
        self.keys.push(separator);
        self.children.push(moved_child);
        moved_key
    }

    fn merge_from(&mut self, separator: u64, other: &mut BranchPage) {
        self.keys.push(separator);
        self.keys.append(&mut other.keys);
        self.children.append(&mut other.children);
    }
}

// ============================================================================
// NESTED INDEX
// ============================================================================

/// Ordered map from `u64` keys to entries, stored in fixed-capacity pages.
#[derive(Debug, Clone)]
pub struct NestedIndex<E> {
    pages: CompactArena<Page<E>>,
    root: NodeId,
    len: usize,
    capacity: usize,
}

impl<E> NestedIndex<E> {
    /// Create an empty index whose pages hold up to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let mut pages = CompactArena::new();
        let root = pages.allocate(Page::default());
        Self {
            pages,
            root,
            len: 0,
            capacity: capacity.max(MIN_PAGE_CAPACITY),
        }
    }

    /// Build an index from pairs sorted by key.
    pub fn from_sorted(capacity: usize, entries: impl IntoIterator<Item = (u64, E)>) -> Self {
        let mut index = Self::new(capacity);
        for (key, entry) in entries {
            index.insert(key, entry);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pages currently allocated.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn min_len(&self) -> usize {
        self.capacity / 2
    }

    /// Number of page levels, 1 for a single leaf.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut id = self.root;
        while let Some(Page::Branch(branch)) = self.pages.get(id) {
            depth += 1;
            id = branch.children[0];
        }
        depth
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    fn find_leaf(&self, key: u64) -> NodeId {
        let mut id = self.root;
        while let Some(Page::Branch(branch)) = self.pages.get(id) {
            id = branch.children[branch.find_child_index(key)];
        }
        id
    }

    pub fn get(&self, key: u64) -> Option<&E> {
        match self.pages.get(self.find_leaf(key))? {
            Page::Leaf(leaf) => leaf
                .keys
                .binary_search(&key)
                .ok()
                .map(|index| &leaf.entries[index]),
            Page::Branch(_) => None,
        }
    }

    pub fn get_mut(&mut self, key: u64) -> Option<&mut E> {
        let leaf_id = self.find_leaf(key);
        match self.pages.get_mut(leaf_id)? {
            Page::Leaf(leaf) => match leaf.keys.binary_search(&key) {
                Ok(index) => Some(&mut leaf.entries[index]),
                Err(_) => None,
            },
            Page::Branch(_) => None,
        }
    }

    /// Smallest key `>= from` and its entry.
    pub fn first_at_or_after(&self, from: u64) -> Option<(u64, &E)> {
        self.seek_in(self.root, from)
    }

    fn seek_in(&self, id: NodeId, from: u64) -> Option<(u64, &E)> {
        match self.pages.get(id)? {
            Page::Leaf(leaf) => {
                let index = leaf.keys.partition_point(|&k| k < from);
                Some((*leaf.keys.get(index)?, leaf.entries.get(index)?))
            }
            Page::Branch(branch) => {
                // Every child after the first candidate starts above `from`,
                // so at most one extra child is ever opened.
                let start = branch.find_child_index(from);
                branch.children[start..]
                    .iter()
                    .find_map(|&child| self.seek_in(child, from))
            }
        }
    }

    /// Smallest key `>= from` that satisfies the address masks.
    pub fn first_in_masks(&self, from: u64, lower: u64, upper: u64) -> Option<(u64, &E)> {
        let mut from = first_address_at_or_after(from, lower, upper)?;
        loop {
            let (key, entry) = self.first_at_or_after(from)?;
            if address_in_masks(key, lower, upper) {
                return Some((key, entry));
            }
            from = first_address_at_or_after(key, lower, upper)?;
        }
    }

    /// Iterate over entries whose key satisfies `(k | lower) == k && (k & upper) == k`.
    pub fn range(&self, lower: u64, upper: u64) -> NestedRange<'_, E> {
        NestedRange {
            index: self,
            next_from: Some(0),
            lower,
            upper,
        }
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> NestedRange<'_, E> {
        self.range(0, u64::MAX)
    }

    // ------------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------------

    /// Insert `entry` at `key`, returning the entry it replaced.
    pub fn insert(&mut self, key: u64, entry: E) -> Option<E> {
        let (old, split) = self.insert_recursive(self.root, key, entry);
        if old.is_none() {
            self.len += 1;
        }
        if let Some((separator, right)) = split {
            let right_id = self.pages.allocate(right);
            let new_root = Page::Branch(BranchPage {
                keys: vec![separator],
                children: vec![self.root, right_id],
            });
            self.root = self.pages.allocate(new_root);
            trace!(depth = self.depth(), "nested index root split");
        }
        old
    }

    fn insert_recursive(&mut self, id: NodeId, key: u64, entry: E) -> (Option<E>, Option<(u64, Page<E>)>) {
        let capacity = self.capacity;
        let child = match self.pages.get_mut(id) {
            Some(Page::Leaf(leaf)) => {
                return match leaf.keys.binary_search(&key) {
                    Ok(index) => (Some(std::mem::replace(&mut leaf.entries[index], entry)), None),
                    Err(index) => {
                        leaf.keys.insert(index, key);
                        leaf.entries.insert(index, entry);
                        if leaf.keys.len() > capacity {
                            let (separator, right) = leaf.split();
                            trace!(page = id, separator, "nested index leaf split");
                            (None, Some((separator, Page::Leaf(right))))
                        } else {
                            (None, None)
                        }
                    }
                };
            }
            Some(Page::Branch(branch)) => {
                let index = branch.find_child_index(key);
                (index, branch.children[index])
            }
            None => return (None, None),
        };

        let (child_index, child_id) = child;
        let (old, split) = self.insert_recursive(child_id, key, entry);
        let Some((separator, right)) = split else {
            return (old, None);
        };

        let right_id = self.pages.allocate(right);
        let Some(page) = self.pages.get_mut(id) else {
            return (old, None);
        };
        page_insert_child(page, child_index, separator, right_id);
        if page.len() > capacity {
            let (separator, right) = page.split();
            trace!(page = id, separator, "nested index branch split");
            (old, Some((separator, right)))
        } else {
            (old, None)
        }
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    pub fn remove(&mut self, key: u64) -> Option<E> {
        self.remove_if(key, |_| true)
    }

    /// Remove the entry at `key` only if `predicate` accepts it.
    pub fn remove_if<F>(&mut self, key: u64, predicate: F) -> Option<E>
    where
        F: FnOnce(&E) -> bool,
    {
        let (removed, _) = self.remove_recursive(self.root, key, predicate);
        if removed.is_some() {
            self.len -= 1;
            self.collapse_root();
        }
        removed
    }

    fn collapse_root(&mut self) {
        while let Some(Page::Branch(branch)) = self.pages.get(self.root) {
            if branch.children.len() != 1 {
                break;
            }
            let only_child = branch.children[0];
            self.pages.deallocate(self.root);
            self.root = only_child;
            trace!(depth = self.depth(), "nested index root collapsed");
        }
    }

    /// Returns the removed entry and whether the page is now underfull.
    fn remove_recursive<F>(&mut self, id: NodeId, key: u64, predicate: F) -> (Option<E>, bool)
    where
        F: FnOnce(&E) -> bool,
    {
        let min_len = self.min_len();
        let (child_index, child_id) = match self.pages.get_mut(id) {
            Some(Page::Leaf(leaf)) => {
                let Ok(index) = leaf.keys.binary_search(&key) else {
                    return (None, false);
                };
                if !predicate(&leaf.entries[index]) {
                    return (None, false);
                }
                leaf.keys.remove(index);
                let removed = leaf.entries.remove(index);
                return (Some(removed), leaf.keys.len() < min_len);
            }
            Some(Page::Branch(branch)) => {
                let index = branch.find_child_index(key);
                (index, branch.children[index])
            }
            None => return (None, false),
        };

        let (removed, child_underfull) = self.remove_recursive(child_id, key, predicate);
        if child_underfull {
            self.rebalance_child(id, child_index);
        }
        let underfull = self.pages.get(id).map_or(false, |page| page.len() < min_len);
        (removed, underfull)
    }

    /// Restore the minimum fill of `parent.children[child_index]`.
    fn rebalance_child(&mut self, parent_id: NodeId, child_index: usize) {
        let Some(Page::Branch(parent)) = self.pages.get(parent_id) else {
            return;
        };
        if parent.children.len() < 2 {
            return;
        }
        // Pair the underfull page with its left sibling when it has one.
        let left_index = child_index.saturating_sub(1);
        let left_id = parent.children[left_index];
        let right_id = parent.children[left_index + 1];
        let separator = parent.keys[left_index];
        let underfull_is_left = child_index == left_index;

        let capacity = self.capacity;
        let Some((left, right)) = self.pages.get_pair_mut(left_id, right_id) else {
            return;
        };

        if left.len() + right.len() <= capacity {
            match (left, right) {
                (Page::Leaf(left), Page::Leaf(right)) => left.merge_from(right),
                (Page::Branch(left), Page::Branch(right)) => left.merge_from(separator, right),
                _ => return,
            }
            self.pages.deallocate(right_id);
            if let Some(Page::Branch(parent)) = self.pages.get_mut(parent_id) {
                parent.keys.remove(left_index);
                parent.children.remove(left_index + 1);
            }
            trace!(page = left_id, merged = right_id, "nested index pages merged");
            return;
        }

        let new_separator = match (left, right) {
            (Page::Leaf(left), Page::Leaf(right)) => {
                if underfull_is_left {
                    if let Some((key, entry)) = right.borrow_first() {
                        left.accept_from_right(key, entry);
                    }
                } else if let Some((key, entry)) = left.borrow_last() {
                    right.accept_from_left(key, entry);
                }
                right.keys.first().copied().unwrap_or(separator)
            }
            (Page::Branch(left), Page::Branch(right)) => {
                if underfull_is_left {
                    match right.borrow_first() {
                        Some((moved_key, moved_child)) => {
                            left.accept_from_right(separator, moved_key, moved_child)
                        }
                        None => separator,
                    }
                } else {
                    match left.borrow_last() {
                        Some((moved_key, moved_child)) => {
                            right.accept_from_left(separator, moved_key, moved_child)
                        }
                        None => separator,
                    }
                }
            }
            _ => separator,
        };
        if let Some(Page::Branch(parent)) = self.pages.get_mut(parent_id) {
            parent.keys[left_index] = new_separator;
        }
    }

    // ------------------------------------------------------------------------
    // Bulk
    // ------------------------------------------------------------------------

    /// Consume the index, returning all pairs in key order.
    pub fn into_sorted_vec(mut self) -> Vec<(u64, E)> {
        let mut out = Vec::with_capacity(self.len);
        let root = self.root;
        self.drain_page(root, &mut out);
        self.root = NULL_NODE;
        out
    }

    fn drain_page(&mut self, id: NodeId, out: &mut Vec<(u64, E)>) {
        match self.pages.deallocate(id) {
            Some(Page::Leaf(leaf)) => out.extend(leaf.keys.into_iter().zip(leaf.entries)),
            Some(Page::Branch(branch)) => {
                for child in branch.children {
                    self.drain_page(child, out);
                }
            }
            None => {}
        }
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Check ordering, fill and depth invariants of every page.
    pub fn check_invariants_detailed(&self) -> Result<(), String> {
        let mut leaf_depth = None;
        let counted = self.check_page(self.root, None, None, 1, &mut leaf_depth)?;
        if counted != self.len {
            return Err(format!(
                "nested index holds {} entries but len is {}",
                counted, self.len
            ));
        }
        Ok(())
    }

    fn check_page(
        &self,
        id: NodeId,
        min_key: Option<u64>,
        max_key: Option<u64>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> Result<usize, String> {
        let page = self
            .pages
            .get(id)
            .ok_or_else(|| format!("nested index page {} is not allocated", id))?;
        let is_root = id == self.root;
        if !is_root && page.len() < self.min_len() {
            return Err(format!("nested index page {} is underfull ({})", id, page.len()));
        }
        if page.len() > self.capacity {
            return Err(format!("nested index page {} overflows ({})", id, page.len()));
        }
        let keys = match page {
            Page::Leaf(leaf) => &leaf.keys,
            Page::Branch(branch) => &branch.keys,
        };
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("nested index page {} keys are not sorted", id));
        }
        let in_bounds = |k: &u64| min_key.map_or(true, |m| *k >= m) && max_key.map_or(true, |m| *k < m);
        if !keys.iter().all(in_bounds) {
            return Err(format!("nested index page {} has keys outside its separators", id));
        }
        match page {
            Page::Leaf(leaf) => {
                if leaf.entries.len() != leaf.keys.len() {
                    return Err(format!("nested index leaf {} key/entry count mismatch", id));
                }
                match *leaf_depth {
                    Some(d) if d != depth => {
                        return Err(format!("nested index leaf {} at depth {} (expected {})", id, depth, d))
                    }
                    _ => *leaf_depth = Some(depth),
                }
                Ok(leaf.keys.len())
            }
            Page::Branch(branch) => {
                if branch.children.len() != branch.keys.len() + 1 {
                    return Err(format!("nested index branch {} key/child count mismatch", id));
                }
                if is_root && branch.children.len() < 2 {
                    return Err("nested index branch root has a single child".to_string());
                }
                let mut total = 0;
                for (i, &child) in branch.children.iter().enumerate() {
                    let lo = if i == 0 { min_key } else { Some(branch.keys[i - 1]) };
                    let hi = branch.keys.get(i).copied().or(max_key);
                    total += self.check_page(child, lo, hi, depth + 1, leaf_depth)?;
                }
                Ok(total)
            }
        }
    }
}

fn page_insert_child<E>(page: &mut Page<E>, child_index: usize, separator: u64, right_id: NodeId) {
    if let Page::Branch(branch) = page {
        branch.keys.insert(child_index, separator);
        branch.children.insert(child_index + 1, right_id);
    }
}

/// Iterator over the entries of a [`NestedIndex`] that satisfy a pair of
/// address masks, in key order.
pub struct NestedRange<'a, E> {
    index: &'a NestedIndex<E>,
    next_from: Option<u64>,
    lower: u64,
    upper: u64,
}

impl<'a, E> Iterator for NestedRange<'a, E> {
    type Item = (u64, &'a E);

    fn next(&mut self) -> Option<Self::Item> {
        let from = self.next_from?;
        match self.index.first_in_masks(from, self.lower, self.upper) {
            Some((key, entry)) => {
                self.next_from = key.checked_add(1);
                Some((key, entry))
            }
            None => {
                self.next_from = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn test_insert_get_and_replace() {
        let mut index = NestedIndex::new(4);
        assert_eq!(index.insert(7, "a"), None);
        assert_eq!(index.insert(3, "b"), None);
        assert_eq!(index.insert(7, "c"), Some("a"));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(7), Some(&"c"));
        assert_eq!(index.get(3), Some(&"b"));
        assert_eq!(index.get(4), None);
        *index.get_mut(3).unwrap() = "d";
        assert_eq!(index.get(3), Some(&"d"));
    }

    #[test]
    fn test_pages_split_and_stay_balanced() {
        let mut index = NestedIndex::new(4);
        for key in 0..200u64 {
            index.insert(key * 3, key);
        }
        assert!(index.depth() > 2);
        assert!(index.page_count() > 50);
        index.check_invariants_detailed().unwrap();
        let keys: Vec<u64> = index.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, (0..200u64).map(|k| k * 3).collect::<Vec<_>>());
    }

    #[test]
    fn test_random_operations_match_btreemap() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut index = NestedIndex::new(5);
        let mut oracle = BTreeMap::new();
        for step in 0..4000u32 {
            let key = rng.gen_range(0..512u64);
            if rng.gen_bool(0.55) {
                assert_eq!(index.insert(key, step), oracle.insert(key, step));
            } else {
                assert_eq!(index.remove(key), oracle.remove(&key));
            }
            assert_eq!(index.len(), oracle.len());
        }
        index.check_invariants_detailed().unwrap();
        let collected: Vec<(u64, u32)> = index.iter().map(|(k, v)| (k, *v)).collect();
        let expected: Vec<(u64, u32)> = oracle.into_iter().collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_removing_everything_collapses_to_single_leaf() {
        let mut keys: Vec<u64> = (0..300).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(9));
        let mut index = NestedIndex::new(4);
        for &k in &keys {
            index.insert(k, k);
        }
        keys.shuffle(&mut StdRng::seed_from_u64(10));
        for &k in &keys {
            assert_eq!(index.remove(k), Some(k));
            index.check_invariants_detailed().unwrap();
        }
        assert!(index.is_empty());
        assert_eq!(index.depth(), 1);
        assert_eq!(index.page_count(), 1);
    }

    #[test]
    fn test_remove_if_respects_predicate() {
        let mut index = NestedIndex::new(4);
        index.insert(1, 10);
        assert_eq!(index.remove_if(1, |v| *v == 11), None);
        assert_eq!(index.len(), 1);
        assert_eq!(index.remove_if(1, |v| *v == 10), Some(10));
        assert!(index.is_empty());
        assert_eq!(index.remove_if(1, |_| true), None);
    }

    #[test]
    fn test_range_matches_filtered_scan() {
        let mut index = NestedIndex::new(4);
        for key in 0..256u64 {
            if key % 3 != 0 {
                index.insert(key, ());
            }
        }
        let masks = [(0u64, 0xFFu64), (0b0001_0000, 0b1011_0111), (0b1000_0001, 0b1000_0001), (0x80, 0x7F)];
        for &(lower, upper) in &masks {
            let got: Vec<u64> = index.range(lower, upper).map(|(k, _)| k).collect();
            let expected: Vec<u64> = (0..256u64)
                .filter(|k| k % 3 != 0 && address_in_masks(*k, lower, upper))
                .collect();
            assert_eq!(got, expected, "lower={:b} upper={:b}", lower, upper);
        }
    }

    #[test]
    fn test_first_at_or_after() {
        let index = NestedIndex::from_sorted(4, (0..50u64).map(|k| (k * 10, k)));
        assert_eq!(index.first_at_or_after(0), Some((0, &0)));
        assert_eq!(index.first_at_or_after(11), Some((20, &2)));
        assert_eq!(index.first_at_or_after(490), Some((490, &49)));
        assert_eq!(index.first_at_or_after(491), None);
    }

    #[test]
    fn test_into_sorted_vec() {
        let mut index = NestedIndex::new(4);
        for key in [9u64, 2, 7, 4, 1, 8, 3, 6, 5, 0] {
            index.insert(key, key * 2);
        }
        let drained = index.into_sorted_vec();
        assert_eq!(drained, (0..10u64).map(|k| (k, k * 2)).collect::<Vec<_>>());
    }
}
