//! Hypercube and prefix arithmetic on k-dimensional keys.
//!
//! A node with post length `p` splits its region in half along every
//! dimension at bit `p`. The k bits at position `p` form the node's hypercube
//! address, dimension 0 being the most significant bit of the address. Bits
//! above `p` are the node's prefix, bits below `p` its postfix.
//!
//! All functions here work on encoded keys (see [`KeyEncoding`]) where plain
//! unsigned comparison matches key order.

use crate::bit_codec::low_mask;

/// The top bit of every coordinate.
pub const SIGN_BIT: u64 = 1 << 63;

/// Post length of the root node: the root decides bit 63.
pub const ROOT_POST_LEN: u8 = 63;

/// How coordinates passed to the tree are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyEncoding {
    /// Coordinates are plain `u64` values.
    #[default]
    Unsigned,
    /// Coordinates are two's-complement `i64` values stored as `u64` bit
    /// patterns (`x as u64`).
    ///
    /// The sign bit is inverted on the way in and out. Only the root's
    /// hypercube address looks at bit 63, so this inverts the interpretation
    /// of the root level and nothing else, and negative keys sort first.
    Signed,
}

impl KeyEncoding {
    /// Convert one external coordinate to its internal form.
    #[inline]
    pub fn encode(self, value: u64) -> u64 {
        match self {
            KeyEncoding::Unsigned => value,
            KeyEncoding::Signed => value ^ SIGN_BIT,
        }
    }

    /// Convert one internal coordinate back to its external form.
    #[inline]
    pub fn decode(self, value: u64) -> u64 {
        // The mapping is an involution.
        self.encode(value)
    }

    /// Decode every coordinate of `key` in place.
    #[inline]
    pub fn decode_in_place(self, key: &mut [u64]) {
        if self == KeyEncoding::Signed {
            key.iter_mut().for_each(|v| *v ^= SIGN_BIT);
        }
    }
}

/// Mask covering the low `dims` bits, i.e. every valid hypercube address.
#[inline]
pub fn address_mask(dims: usize) -> u64 {
    low_mask(dims)
}

/// Mask of the bits strictly above `post_len`.
#[inline]
pub fn prefix_mask(post_len: u8) -> u64 {
    !low_mask(post_len as usize + 1)
}

// ============================================================================
// HYPERCUBE ADDRESSES
// ============================================================================

/// Extract the hypercube address of `key` at bit `post_len`.
#[inline]
pub fn hc_address(key: &[u64], post_len: u8) -> u64 {
    key.iter()
        .fold(0u64, |addr, &v| (addr << 1) | ((v >> post_len) & 1))
}

/// Write the bits of `addr` into bit `post_len` of every dimension of `key`.
#[inline]
pub fn apply_address(addr: u64, post_len: u8, key: &mut [u64]) {
    let bit = 1u64 << post_len;
    let dims = key.len();
    for (i, v) in key.iter_mut().enumerate() {
        if (addr >> (dims - 1 - i)) & 1 == 1 {
            *v |= bit;
        } else {
            *v &= !bit;
        }
    }
}

/// Highest bit at which `a` and `b` differ, restricted to bit positions
/// `0..=limit`.
///
/// The result is 1-based: `0` means no difference, `n` means bit `n - 1`.
#[inline]
pub fn max_conflicting_bit(a: &[u64], b: &[u64], limit: u8) -> u8 {
    let mask = low_mask(limit as usize + 1);
    let diff = a
        .iter()
        .zip(b.iter())
        .fold(0u64, |acc, (x, y)| acc | ((x ^ y) & mask));
    (64 - diff.leading_zeros()) as u8
}

// ============================================================================
// QUERY PRUNING
// ============================================================================

/// Whether the region of a node with post length `post_len` and the given
/// prefix can intersect the box `[min, max]`.
///
/// Only the prefix bits (above `post_len`) are decided for the node, so the
/// masked prefix must lie between the masked bounds in every dimension.
pub fn infix_matches(prefix: &[u64], min: &[u64], max: &[u64], post_len: u8) -> bool {
    let mask = prefix_mask(post_len);
    prefix
        .iter()
        .zip(min.iter().zip(max.iter()))
        .all(|(&p, (&lo, &hi))| {
            let p = p & mask;
            p >= lo & mask && p <= hi & mask
        })
}

/// Per-node address masks for the box `[min, max]`.
///
/// A hypercube address `a` of the node can hold matches only if
/// `a | lower == a` and `a & upper == a`. Bit `d` of `lower` is set when the
/// box lies entirely in the upper half of dimension `d`; bit `d` of `upper` is
/// set when the box reaches into the upper half at all. The node itself must
/// already pass [`infix_matches`].
pub fn range_mask_lower_upper(post_len: u8, prefix: &[u64], min: &[u64], max: &[u64]) -> (u64, u64) {
    let keep = prefix_mask(post_len);
    let half = 1u64 << post_len;
    let mut lower = 0u64;
    let mut upper = 0u64;
    for ((&p, &lo), &hi) in prefix.iter().zip(min.iter()).zip(max.iter()) {
        let bisection = (p & keep) | half;
        lower <<= 1;
        upper <<= 1;
        if lo >= bisection {
            lower |= 1;
        }
        if hi >= bisection {
            upper |= 1;
        }
    }
    (lower, upper)
}

/// Whether `addr` satisfies the masks from [`range_mask_lower_upper`].
#[inline]
pub fn address_in_masks(addr: u64, lower: u64, upper: u64) -> bool {
    (addr | lower) == addr && (addr & upper) == addr
}

/// Next valid address strictly after `addr`, which must itself be valid.
///
/// Bits that can only take one value are filled with ones before the
/// increment so the carry jumps straight to the next free bit.
#[inline]
pub fn inc_address(addr: u64, lower: u64, upper: u64) -> Option<u64> {
    let next = ((addr | !upper).wrapping_add(1) & upper) | lower;
    (next > addr).then_some(next)
}

/// Smallest valid address that is `>= from`, for any `from`.
pub fn first_address_at_or_after(from: u64, lower: u64, upper: u64) -> Option<u64> {
    if lower & !upper != 0 {
        return None;
    }
    let bad = (from & !upper) | (!from & lower);
    if bad == 0 {
        return Some(from);
    }
    let highest_bad = 63 - bad.leading_zeros();
    // Raise the lowest bit at or above the first violation that is still
    // zero and allowed to be one, keep everything above it, and fill the rest
    // with the minimum.
    for bit in highest_bad..64 {
        let b = 1u64 << bit;
        if from & b == 0 && upper & b != 0 {
            let above = if bit == 63 { 0 } else { from & !low_mask(bit as usize + 1) };
            return Some(above | b | (lower & low_mask(bit as usize)));
        }
    }
    None
}

/// Whether every coordinate of `key` lies within `[min, max]`.
#[inline]
pub fn key_in_range(key: &[u64], min: &[u64], max: &[u64]) -> bool {
    key.iter()
        .zip(min.iter().zip(max.iter()))
        .all(|(&k, (&lo, &hi))| k >= lo && k <= hi)
}

// ============================================================================
// FLOATING POINT KEYS
// ============================================================================

/// Map an `f64` to an `i64` whose signed order matches the float order.
///
/// Store the result with [`KeyEncoding::Signed`] (`as u64`).
#[inline]
pub fn f64_to_sortable(value: f64) -> i64 {
    let bits = value.to_bits() as i64;
    if bits < 0 {
        bits ^ i64::MAX
    } else {
        bits
    }
}

/// Inverse of [`f64_to_sortable`].
#[inline]
pub fn sortable_to_f64(value: i64) -> f64 {
    let bits = if value < 0 { value ^ i64::MAX } else { value };
    f64::from_bits(bits as u64)
}
