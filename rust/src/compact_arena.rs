//! Compact arena implementation using Vec<T> instead of Vec<Option<T>>.
//!
//! Tree nodes and nested-index pages live in arenas and refer to each other
//! by `u32` ids. Freed slots are reset to `T::default()` so the values they
//! owned are dropped right away, and are handed out again by the next
//! allocation.

use std::convert::TryFrom;

pub type NodeId = u32;
pub const NULL_NODE: NodeId = u32::MAX;

/// Statistics for a compact arena
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompactArenaStats {
    pub total_capacity: usize,
    pub allocated_count: usize,
    pub free_count: usize,
    pub utilization: f64,
    pub fragmentation: f64,
}

/// Arena allocator with a free list and an allocation bitmap.
#[derive(Debug, Clone)]
pub struct CompactArena<T> {
    /// Direct storage without Option wrapper
    storage: Vec<T>,
    /// Free slot indices for reuse
    free_list: Vec<usize>,
    /// Track which slots are actually allocated
    allocated_mask: Vec<bool>,
    /// Number of allocated slots
    allocated: usize,
}

impl<T: Default> CompactArena<T> {
    /// Create a new empty compact arena
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
            free_list: Vec::new(),
            allocated_mask: Vec::new(),
            allocated: 0,
        }
    }

    /// Allocate a new item in the arena and return its ID
    #[inline]
    pub fn allocate(&mut self, item: T) -> NodeId {
        let index = if let Some(free_index) = self.free_list.pop() {
            self.storage[free_index] = item;
            self.allocated_mask[free_index] = true;
            free_index
        } else {
            let index = self.storage.len();
            self.storage.push(item);
            self.allocated_mask.push(true);
            index
        };
        self.allocated += 1;

        debug_assert!(index < NULL_NODE as usize, "arena exhausted the id space");
        index as NodeId
    }

    /// Deallocate an item from the arena and return it.
    #[inline]
    pub fn deallocate(&mut self, id: NodeId) -> Option<T> {
        let index = self.allocated_index(id)?;

        self.allocated_mask[index] = false;
        self.free_list.push(index);
        self.allocated -= 1;

        Some(std::mem::take(&mut self.storage[index]))
    }

    /// Get a reference to an item in the arena
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.allocated_index(id).map(|index| &self.storage[index])
    }

    /// Get a mutable reference to an item in the arena
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.allocated_index(id).map(move |index| &mut self.storage[index])
    }

    /// Mutable references to two distinct items at once.
    pub fn get_pair_mut(&mut self, a: NodeId, b: NodeId) -> Option<(&mut T, &mut T)> {
        let ia = self.allocated_index(a)?;
        let ib = self.allocated_index(b)?;
        if ia == ib {
            return None;
        }
        if ia < ib {
            let (left, right) = self.storage.split_at_mut(ib);
            Some((&mut left[ia], &mut right[0]))
        } else {
            let (left, right) = self.storage.split_at_mut(ia);
            Some((&mut right[0], &mut left[ib]))
        }
    }

    /// Check if an ID is valid and allocated
    pub fn contains(&self, id: NodeId) -> bool {
        self.allocated_index(id).is_some()
    }

    #[inline]
    fn allocated_index(&self, id: NodeId) -> Option<usize> {
        if id == NULL_NODE {
            return None;
        }
        let index = usize::try_from(id).ok()?;
        self.allocated_mask
            .get(index)
            .copied()
            .unwrap_or(false)
            .then_some(index)
    }

    /// Get arena statistics
    pub fn stats(&self) -> CompactArenaStats {
        let total_capacity = self.storage.capacity();
        let allocated_count = self.allocated;
        let free_count = self.free_list.len();
        let utilization = if total_capacity > 0 {
            allocated_count as f64 / total_capacity as f64
        } else {
            0.0
        };
        let fragmentation = if allocated_count > 0 {
            free_count as f64 / (allocated_count + free_count) as f64
        } else {
            0.0
        };

        CompactArenaStats {
            total_capacity,
            allocated_count,
            free_count,
            utilization,
            fragmentation,
        }
    }

    /// Get the number of allocated items
    pub fn len(&self) -> usize {
        self.allocated
    }

    /// Check if the arena is empty
    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    /// Clear all items from the arena
    pub fn clear(&mut self) {
        self.storage.clear();
        self.allocated_mask.clear();
        self.free_list.clear();
        self.allocated = 0;
    }

    /// Iterate over the ids of all allocated items.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.allocated_mask
            .iter()
            .enumerate()
            .filter(|(_, &allocated)| allocated)
            .map(|(index, _)| index as NodeId)
    }
}

impl<T: Default> Default for CompactArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_arena_basic_operations() {
        let mut arena = CompactArena::new();

        let id1 = arena.allocate(42);
        let id2 = arena.allocate(84);
        let id3 = arena.allocate(126);

        assert_eq!(arena.get(id1), Some(&42));
        assert_eq!(arena.get(id2), Some(&84));
        assert_eq!(arena.get(id3), Some(&126));

        assert!(arena.contains(id1));
        assert!(arena.contains(id2));
        assert!(arena.contains(id3));
        assert!(!arena.contains(NULL_NODE));

        let stats = arena.stats();
        assert_eq!(stats.allocated_count, 3);
        assert_eq!(stats.free_count, 0);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn test_deallocate_reuses_slot_and_drops_value() {
        let mut arena: CompactArena<Vec<i32>> = CompactArena::new();

        let id1 = arena.allocate(vec![1, 2, 3]);
        let id2 = arena.allocate(vec![4]);

        assert_eq!(arena.deallocate(id1), Some(vec![1, 2, 3]));
        assert!(!arena.contains(id1));
        assert!(arena.contains(id2));
        assert_eq!(arena.deallocate(id1), None);

        let id3 = arena.allocate(vec![5]);
        assert_eq!(id3, id1);
        assert_eq!(arena.get(id3), Some(&vec![5]));

        let stats = arena.stats();
        assert_eq!(stats.allocated_count, 2);
        assert_eq!(stats.free_count, 0);
    }

    #[test]
    fn test_get_pair_mut() {
        let mut arena = CompactArena::new();
        let a = arena.allocate(1);
        let b = arena.allocate(2);

        let (x, y) = arena.get_pair_mut(b, a).unwrap();
        std::mem::swap(x, y);
        assert_eq!(arena.get(a), Some(&2));
        assert_eq!(arena.get(b), Some(&1));
        assert!(arena.get_pair_mut(a, a).is_none());
    }

    #[test]
    fn test_ids_lists_only_allocated() {
        let mut arena = CompactArena::new();
        let a = arena.allocate(1);
        let b = arena.allocate(2);
        let c = arena.allocate(3);
        arena.deallocate(b);
        assert_eq!(arena.ids().collect::<Vec<_>>(), vec![a, c]);
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.ids().count(), 0);
    }
}
