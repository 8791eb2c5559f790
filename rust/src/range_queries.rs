//! Range query operations for PhTree.
//!
//! Window queries over axis-aligned boxes. Both corners are inclusive and
//! given in the tree's external key form; they are encoded once up front,
//! so signed trees take signed corners.

use crate::error::KeyResult;
use crate::iteration::QueryIter;
use crate::types::PhTree;

// ============================================================================
// RANGE QUERY OPERATIONS
// ============================================================================

impl<V> PhTree<V> {
    /// Iterate over every entry whose key lies inside `[min, max]` in every
    /// dimension.
    ///
    /// A box with `min > max` in any dimension is empty.
    ///
    /// # Panics
    ///
    /// Panics if `min` or `max` does not have exactly `dims()` coordinates.
    /// Use [`try_query`](Self::try_query) for a checked variant.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let mut tree = PhTree::new(2).unwrap();
    /// for x in 0..10u64 {
    ///     for y in 0..10u64 {
    ///         tree.put(&[x, y], x * 10 + y);
    ///     }
    /// }
    ///
    /// let mut hits: Vec<u64> = tree.query(&[2, 3], &[3, 4]).map(|(_, v)| *v).collect();
    /// hits.sort();
    /// assert_eq!(hits, vec![23, 24, 33, 34]);
    ///
    /// assert_eq!(tree.query(&[5, 5], &[4, 9]).count(), 0);
    /// ```
    pub fn query(&self, min: &[u64], max: &[u64]) -> QueryIter<'_, V> {
        self.assert_dims(min);
        self.assert_dims(max);
        self.query_encoded(min, max)
    }

    /// Checked variant of [`query`](Self::query).
    pub fn try_query(&self, min: &[u64], max: &[u64]) -> KeyResult<QueryIter<'_, V>> {
        self.check_dims(min)?;
        self.check_dims(max)?;
        Ok(self.query_encoded(min, max))
    }

    /// Run a window query and collect `mapper(key, value)` for every hit
    /// accepted by `filter`.
    ///
    /// Both closures see keys in external form.
    ///
    /// # Examples
    ///
    /// ```
    /// use phtree::PhTree;
    ///
    /// let mut tree = PhTree::new(1).unwrap();
    /// for v in 0..100u64 {
    ///     tree.put(&[v], v);
    /// }
    ///
    /// let mut even = tree.query_collect(&[10], &[20], |_, v| v % 2 == 0, |key, _| key[0]);
    /// even.sort();
    /// assert_eq!(even, vec![10, 12, 14, 16, 18, 20]);
    /// ```
    pub fn query_collect<R, F, M>(&self, min: &[u64], max: &[u64], mut filter: F, mut mapper: M) -> Vec<R>
    where
        F: FnMut(&[u64], &V) -> bool,
        M: FnMut(&[u64], &V) -> R,
    {
        self.query(min, max)
            .filter(|(key, value)| filter(key, value))
            .map(|(key, value)| mapper(&key, value))
            .collect()
    }

    // ============================================================================
    // RANGE HELPERS
    // ============================================================================

    fn query_encoded(&self, min: &[u64], max: &[u64]) -> QueryIter<'_, V> {
        let min = self.encode_key(min).into_owned();
        let max = self.encode_key(max).into_owned();
        QueryIter::new(self, min, max)
    }
}
