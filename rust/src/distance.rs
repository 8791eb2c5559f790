//! Distance functions for nearest neighbor search.
//!
//! A [`Distance`] receives keys in the tree's external form. For the search
//! to be exact it must be non-negative and must not decrease when the
//! difference between two coordinates grows, which holds for every Lp norm.

use crate::key_bits::sortable_to_f64;

/// Distance between two keys of equal length.
pub trait Distance {
    fn dist(&self, a: &[u64], b: &[u64]) -> f64;
}

impl<F> Distance for F
where
    F: Fn(&[u64], &[u64]) -> f64,
{
    fn dist(&self, a: &[u64], b: &[u64]) -> f64 {
        self(a, b)
    }
}

/// Euclidean distance for the supported coordinate interpretations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Euclidean {
    /// Coordinates are `u64`.
    #[default]
    Unsigned,
    /// Coordinates are `i64` bit patterns.
    Signed,
    /// Coordinates are `f64` values stored with
    /// [`f64_to_sortable`](crate::f64_to_sortable).
    SortableF64,
}

impl Euclidean {
    #[inline]
    fn delta(self, a: u64, b: u64) -> f64 {
        match self {
            Euclidean::Unsigned => a.abs_diff(b) as f64,
            Euclidean::Signed => (a as i64).abs_diff(b as i64) as f64,
            Euclidean::SortableF64 => sortable_to_f64(a as i64) - sortable_to_f64(b as i64),
        }
    }
}

impl Distance for Euclidean {
    fn dist(&self, a: &[u64], b: &[u64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| {
                let d = self.delta(x, y);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}
