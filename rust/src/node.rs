//! Node implementation for PhTree.
//!
//! A node maps hypercube addresses to slots, each slot carrying a packed key
//! fragment of `post_len` bits per dimension. The entries can be stored in
//! three ways:
//!
//! - **AHC**: `2^k` slots indexed directly by address, fragments at fixed
//!   offsets. Best when most addresses are occupied.
//! - **LHC**: `(address, fragment)` records bit-packed back to back and sorted
//!   by address, binary searched. Best for sparse, small nodes.
//! - **NI**: a [`NestedIndex`] keyed by address. Used once a node holds many
//!   values or children.
//!
//! All mutations keep the value and child counts current, and
//! [`Node::adjust_representation`] moves the content to the preferred
//! representation afterwards.

use crate::bit_codec::{self, low_mask, resize_for_bits, words_for_bits};
use crate::construction::PhTreeConfig;
use crate::key_bits::{address_in_masks, address_mask, first_address_at_or_after, inc_address};
use crate::nested_index::NestedIndex;
use crate::types::{
    Content, HcArray, LinearHc, NiEntry, Node, NodeId, Representation, Slot, AHC_MAX_DIMENSIONS,
    REF_BITS,
};
use tracing::trace;

// ============================================================================
// KEY FRAGMENTS
// ============================================================================

/// Read-only view of a packed key fragment inside a word buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fragment<'a> {
    words: &'a [u64],
    offset: usize,
}

impl<'a> Fragment<'a> {
    fn field(&self, dim: usize, post_len: u8) -> u64 {
        let p = post_len as usize;
        bit_codec::read(self.words, self.offset + dim * p, p)
    }

    /// Overwrite bits `[0, post_len)` of every dimension of `key` with the
    /// fragment.
    pub(crate) fn load_into(&self, post_len: u8, key: &mut [u64]) {
        let keep = !low_mask(post_len as usize);
        for (dim, v) in key.iter_mut().enumerate() {
            *v = (*v & keep) | self.field(dim, post_len);
        }
    }

    /// OR over all dimensions of `(fragment ^ key) & mask`.
    ///
    /// Zero means the fragment agrees with `key` on every masked bit,
    /// otherwise the highest set bit is the highest conflicting bit.
    pub(crate) fn diff(&self, post_len: u8, key: &[u64], mask: u64) -> u64 {
        key.iter()
            .enumerate()
            .fold(0, |acc, (dim, &v)| acc | ((self.field(dim, post_len) ^ v) & mask))
    }
}

/// 1-based position of the highest set bit, `0` for zero.
#[inline]
pub(crate) fn bit_len(x: u64) -> u8 {
    (64 - x.leading_zeros()) as u8
}

/// Bits strictly between a child's and its parent's split positions.
#[inline]
pub(crate) fn infix_mask(post_len: u8, child_post_len: u8) -> u64 {
    low_mask(post_len as usize) & !low_mask(child_post_len as usize + 1)
}

fn store_fragment(words: &mut [u64], offset: usize, post_len: u8, key: &[u64]) {
    let p = post_len as usize;
    for (dim, &v) in key.iter().enumerate() {
        bit_codec::write(words, offset + dim * p, p, v);
    }
}

fn copy_fragment(words: &[u64], offset: usize, n_bits: usize) -> Box<[u64]> {
    let mut fragment = vec![0u64; words_for_bits(n_bits)];
    bit_codec::copy_bits(words, offset, &mut fragment, 0, n_bits);
    fragment.into_boxed_slice()
}

/// Where the bits of a fragment being stored come from.
#[derive(Clone, Copy)]
enum FragmentSource<'a> {
    /// Low `post_len` bits of each coordinate of a key.
    Key(&'a [u64]),
    /// An already packed fragment at offset 0.
    Packed(&'a [u64]),
}

impl FragmentSource<'_> {
    fn write_to(self, words: &mut [u64], offset: usize, post_len: u8, n_bits: usize) {
        match self {
            FragmentSource::Key(key) => store_fragment(words, offset, post_len, key),
            FragmentSource::Packed(src) => bit_codec::copy_bits(src, 0, words, offset, n_bits),
        }
    }
}

/// An occupied address of a node.
#[derive(Debug)]
pub(crate) struct EntryRef<'a, V> {
    pub(crate) addr: u64,
    pub(crate) fragment: Fragment<'a>,
    pub(crate) slot: &'a Slot<V>,
}

fn slot_counts<V>(slot: &Slot<V>) -> (u32, u32) {
    match slot {
        Slot::Empty => (0, 0),
        Slot::Value(_) => (1, 0),
        Slot::Child(_) => (0, 1),
    }
}

// ============================================================================
// LINEARIZED HYPERCUBE HELPERS
// ============================================================================

impl<V> LinearHc<V> {
    fn search(&self, addr: u64, dims: usize, fragment_bits: usize) -> isize {
        bit_codec::binary_search(&self.records, 0, self.slots.len(), addr, dims, fragment_bits)
    }

    /// Index of `addr`, or of the first record above it.
    fn position(&self, addr: u64, dims: usize, fragment_bits: usize) -> usize {
        let index = self.search(addr, dims, fragment_bits);
        if index >= 0 {
            index as usize
        } else {
            (-(index + 1)) as usize
        }
    }

    fn address_at(&self, index: usize, dims: usize, fragment_bits: usize) -> u64 {
        bit_codec::read(&self.records, index * (dims + fragment_bits), dims)
    }

    fn entry_at(&self, index: usize, dims: usize, fragment_bits: usize) -> EntryRef<'_, V> {
        let record = index * (dims + fragment_bits);
        EntryRef {
            addr: bit_codec::read(&self.records, record, dims),
            fragment: Fragment {
                words: &self.records,
                offset: record + dims,
            },
            slot: &self.slots[index],
        }
    }
}

// ============================================================================
// NODE IMPLEMENTATION
// ============================================================================

impl<V> Node<V> {
    /// Create an empty node. The content starts out linearized.
    pub(crate) fn new(dims: usize, infix_len: u8, post_len: u8) -> Self {
        debug_assert!(post_len < 64);
        Self {
            dims: dims as u8,
            infix_len,
            post_len,
            value_count: 0,
            sub_count: 0,
            content: Content::default(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims as usize
    }

    pub fn post_len(&self) -> u8 {
        self.post_len
    }

    pub fn infix_len(&self) -> u8 {
        self.infix_len
    }

    /// Number of occupied addresses (values plus children).
    pub fn entry_count(&self) -> usize {
        (self.value_count + self.sub_count) as usize
    }

    pub fn value_count(&self) -> usize {
        self.value_count as usize
    }

    pub fn sub_count(&self) -> usize {
        self.sub_count as usize
    }

    pub fn representation(&self) -> Representation {
        match self.content {
            Content::Ahc(_) => Representation::Ahc,
            Content::Lhc(_) => Representation::Lhc,
            Content::Ni(_) => Representation::Ni,
        }
    }

    fn fragment_bits(&self) -> usize {
        self.dims() * self.post_len as usize
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// The entry at `addr`, if occupied.
    pub(crate) fn find(&self, addr: u64) -> Option<EntryRef<'_, V>> {
        let dims = self.dims();
        let fragment_bits = self.fragment_bits();
        match &self.content {
            Content::Ahc(hc) => {
                let slot = hc.slots.get(addr as usize)?;
                if slot.is_empty() {
                    return None;
                }
                Some(EntryRef {
                    addr,
                    fragment: Fragment {
                        words: &hc.fragments,
                        offset: addr as usize * fragment_bits,
                    },
                    slot,
                })
            }
            Content::Lhc(lhc) => {
                let index = lhc.search(addr, dims, fragment_bits);
                (index >= 0).then(|| lhc.entry_at(index as usize, dims, fragment_bits))
            }
            Content::Ni(ni) => {
                let entry = ni.get(addr)?;
                Some(EntryRef {
                    addr,
                    fragment: Fragment {
                        words: &entry.fragment,
                        offset: 0,
                    },
                    slot: &entry.slot,
                })
            }
        }
    }

    /// First occupied address `>= from` that satisfies the query masks.
    pub(crate) fn next_entry(&self, from: u64, lower: u64, upper: u64) -> Option<EntryRef<'_, V>> {
        let dims = self.dims();
        let fragment_bits = self.fragment_bits();
        let from = first_address_at_or_after(from, lower, upper)?;
        match &self.content {
            Content::Ahc(_) => {
                let mut addr = from;
                loop {
                    if let Some(entry) = self.find(addr) {
                        return Some(entry);
                    }
                    if addr >= address_mask(dims) {
                        return None;
                    }
                    addr = inc_address(addr, lower, upper)?;
                }
            }
            Content::Lhc(lhc) => {
                let n = lhc.slots.len();
                let mut index = lhc.position(from, dims, fragment_bits);
                while index < n {
                    let addr = lhc.address_at(index, dims, fragment_bits);
                    if address_in_masks(addr, lower, upper) {
                        return Some(lhc.entry_at(index, dims, fragment_bits));
                    }
                    let next = first_address_at_or_after(addr, lower, upper)?;
                    index = lhc.position(next, dims, fragment_bits);
                }
                None
            }
            Content::Ni(ni) => {
                let (addr, entry) = ni.first_in_masks(from, lower, upper)?;
                Some(EntryRef {
                    addr,
                    fragment: Fragment {
                        words: &entry.fragment,
                        offset: 0,
                    },
                    slot: &entry.slot,
                })
            }
        }
    }

    /// All entries in address order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = EntryRef<'_, V>> + '_ {
        let full = address_mask(self.dims());
        let mut next = Some(0u64);
        std::iter::from_fn(move || {
            let entry = self.next_entry(next?, 0, full)?;
            next = entry.addr.checked_add(1);
            Some(entry)
        })
    }

    /// Ids of all child nodes.
    pub(crate) fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries().filter_map(|entry| match entry.slot {
            Slot::Child(id) => Some(*id),
            _ => None,
        })
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Slot and fragment location of an occupied address.
    fn locate_mut(&mut self, addr: u64) -> Option<(&mut Slot<V>, &mut [u64], usize)> {
        let dims = self.dims();
        let fragment_bits = self.fragment_bits();
        match &mut self.content {
            Content::Ahc(hc) => {
                let slot = hc.slots.get_mut(addr as usize)?;
                if slot.is_empty() {
                    return None;
                }
                Some((slot, hc.fragments.as_mut_slice(), addr as usize * fragment_bits))
            }
            Content::Lhc(lhc) => {
                let index = lhc.search(addr, dims, fragment_bits);
                if index < 0 {
                    return None;
                }
                let index = index as usize;
                let offset = index * (dims + fragment_bits) + dims;
                Some((&mut lhc.slots[index], lhc.records.as_mut_slice(), offset))
            }
            Content::Ni(ni) => {
                let entry = ni.get_mut(addr)?;
                Some((&mut entry.slot, &mut entry.fragment[..], 0))
            }
        }
    }

    pub(crate) fn value_mut(&mut self, addr: u64) -> Option<&mut V> {
        match self.locate_mut(addr)?.0 {
            Slot::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Store a new entry at the free address `addr`, taking the fragment
    /// from the low `post_len` bits of `key`.
    pub(crate) fn insert_entry(&mut self, addr: u64, key: &[u64], slot: Slot<V>) {
        self.insert_from(addr, FragmentSource::Key(key), slot);
    }

    fn insert_from(&mut self, addr: u64, source: FragmentSource<'_>, slot: Slot<V>) {
        debug_assert!(!slot.is_empty(), "inserting an empty slot");
        let dims = self.dims();
        let post_len = self.post_len;
        let fragment_bits = self.fragment_bits();
        let (values, subs) = slot_counts(&slot);
        self.value_count += values;
        self.sub_count += subs;

        match &mut self.content {
            Content::Ahc(hc) => {
                let index = addr as usize;
                debug_assert!(hc.slots[index].is_empty(), "address {} already occupied", addr);
                source.write_to(&mut hc.fragments, index * fragment_bits, post_len, fragment_bits);
                hc.slots[index] = slot;
            }
            Content::Lhc(lhc) => {
                let index = lhc.search(addr, dims, fragment_bits);
                debug_assert!(index < 0, "address {} already occupied", addr);
                let position = (-(index + 1)) as usize;
                let stride = dims + fragment_bits;
                let n = lhc.slots.len();
                resize_for_bits(&mut lhc.records, (n + 1) * stride);
                bit_codec::insert_bits(&mut lhc.records, position * stride, stride);
                bit_codec::write(&mut lhc.records, position * stride, dims, addr);
                source.write_to(&mut lhc.records, position * stride + dims, post_len, fragment_bits);
                lhc.slots.insert(position, slot);
            }
            Content::Ni(ni) => {
                let mut fragment = vec![0u64; words_for_bits(fragment_bits)].into_boxed_slice();
                source.write_to(&mut fragment, 0, post_len, fragment_bits);
                let previous = ni.insert(addr, NiEntry { fragment, slot });
                debug_assert!(previous.is_none(), "address {} already occupied", addr);
            }
        }
    }

    /// Swap the slot at the occupied address `addr`, optionally rewriting its
    /// fragment from `key`. Returns the previous slot, or `Slot::Empty` (and
    /// changes nothing) when `addr` is free.
    pub(crate) fn replace_entry(&mut self, addr: u64, key: Option<&[u64]>, slot: Slot<V>) -> Slot<V> {
        let post_len = self.post_len;
        let (new_values, new_subs) = slot_counts(&slot);
        let Some((target, words, offset)) = self.locate_mut(addr) else {
            return Slot::Empty;
        };
        if let Some(key) = key {
            store_fragment(words, offset, post_len, key);
        }
        let old = std::mem::replace(target, slot);
        let (old_values, old_subs) = slot_counts(&old);
        self.value_count = self.value_count + new_values - old_values;
        self.sub_count = self.sub_count + new_subs - old_subs;
        old
    }

    /// Rewrite the fragment at the occupied address `addr` from `key`.
    pub(crate) fn set_fragment(&mut self, addr: u64, key: &[u64]) -> bool {
        let post_len = self.post_len;
        match self.locate_mut(addr) {
            Some((_, words, offset)) => {
                store_fragment(words, offset, post_len, key);
                true
            }
            None => false,
        }
    }

    /// Take the entry at `addr` out of the node.
    pub(crate) fn remove_entry(&mut self, addr: u64) -> Slot<V> {
        let dims = self.dims();
        let fragment_bits = self.fragment_bits();
        let removed = match &mut self.content {
            Content::Ahc(hc) => match hc.slots.get_mut(addr as usize) {
                Some(slot) if !slot.is_empty() => {
                    bit_codec::clear_bits(&mut hc.fragments, addr as usize * fragment_bits, fragment_bits);
                    std::mem::take(slot)
                }
                _ => Slot::Empty,
            },
            Content::Lhc(lhc) => {
                let index = lhc.search(addr, dims, fragment_bits);
                if index < 0 {
                    Slot::Empty
                } else {
                    let index = index as usize;
                    let stride = dims + fragment_bits;
                    let n = lhc.slots.len();
                    bit_codec::remove_bits(&mut lhc.records, index * stride, stride);
                    resize_for_bits(&mut lhc.records, (n - 1) * stride);
                    lhc.slots.remove(index)
                }
            }
            Content::Ni(ni) => ni.remove(addr).map(|entry| entry.slot).unwrap_or_default(),
        };
        let (values, subs) = slot_counts(&removed);
        self.value_count -= values;
        self.sub_count -= subs;
        removed
    }

    // ------------------------------------------------------------------------
    // Representation switching
    // ------------------------------------------------------------------------

    /// The representation this node should use for its current counts.
    ///
    /// The nested index is entered when either count exceeds its threshold
    /// and left only once both are back at or below half of it. Outside the
    /// nested index the dense array is chosen whenever it is not larger than
    /// the linearized records.
    pub(crate) fn preferred_representation(&self, config: &PhTreeConfig) -> Representation {
        let values = self.value_count();
        let subs = self.sub_count();
        let use_ni = if self.representation() == Representation::Ni {
            values > config.ni_value_threshold / 2 || subs > config.ni_sub_threshold / 2
        } else {
            values > config.ni_value_threshold || subs > config.ni_sub_threshold
        };
        if use_ni {
            return Representation::Ni;
        }

        let dims = self.dims();
        if config.ahc_enabled && dims <= AHC_MAX_DIMENSIONS {
            let fragment_bits = self.fragment_bits();
            let ahc_bits = (1usize << dims) * (fragment_bits + REF_BITS);
            let lhc_bits = self.entry_count() * (dims + fragment_bits + REF_BITS);
            if ahc_bits <= lhc_bits {
                return Representation::Ahc;
            }
        }
        Representation::Lhc
    }

    /// Move to the preferred representation. Returns whether it changed.
    pub(crate) fn adjust_representation(&mut self, config: &PhTreeConfig) -> bool {
        let current = self.representation();
        let target = self.preferred_representation(config);
        if target == current {
            return false;
        }
        self.convert_to(target, config.ni_page_capacity);
        trace!(
            from = ?current,
            to = ?target,
            entries = self.entry_count(),
            post_len = self.post_len,
            "node representation switched"
        );
        true
    }

    /// Rebuild the content in `target`, keeping every fragment bit for bit.
    pub(crate) fn convert_to(&mut self, target: Representation, page_capacity: usize) {
        let dims = self.dims();
        let fragment_bits = self.fragment_bits();
        let counts = (self.value_count, self.sub_count);
        let entries = self.drain_entries();

        self.content = match target {
            Representation::Ahc => {
                let size = 1usize << dims;
                Content::Ahc(HcArray {
                    fragments: vec![0u64; words_for_bits(size * fragment_bits)],
                    slots: (0..size).map(|_| Slot::Empty).collect(),
                })
            }
            Representation::Lhc => {
                let mut records = Vec::new();
                resize_for_bits(&mut records, entries.len() * (dims + fragment_bits));
                Content::Lhc(LinearHc {
                    records,
                    slots: Vec::with_capacity(entries.len()),
                })
            }
            Representation::Ni => Content::Ni(NestedIndex::new(page_capacity)),
        };
        self.value_count = 0;
        self.sub_count = 0;
        for (addr, fragment, slot) in entries {
            self.insert_from(addr, FragmentSource::Packed(&fragment), slot);
        }
        debug_assert_eq!(counts, (self.value_count, self.sub_count));
    }

    /// Empty the content, returning `(address, fragment, slot)` in address
    /// order. Counts are left untouched.
    fn drain_entries(&mut self) -> Vec<(u64, Box<[u64]>, Slot<V>)> {
        let dims = self.dims();
        let fragment_bits = self.fragment_bits();
        match std::mem::take(&mut self.content) {
            Content::Ahc(HcArray { fragments, slots }) => slots
                .into_iter()
                .enumerate()
                .filter(|(_, slot)| !slot.is_empty())
                .map(|(addr, slot)| {
                    let fragment = copy_fragment(&fragments, addr * fragment_bits, fragment_bits);
                    (addr as u64, fragment, slot)
                })
                .collect(),
            Content::Lhc(LinearHc { records, slots }) => {
                let stride = dims + fragment_bits;
                slots
                    .into_iter()
                    .enumerate()
                    .map(|(index, slot)| {
                        let record = index * stride;
                        let addr = bit_codec::read(&records, record, dims);
                        (addr, copy_fragment(&records, record + dims, fragment_bits), slot)
                    })
                    .collect()
            }
            Content::Ni(ni) => ni
                .into_sorted_vec()
                .into_iter()
                .map(|(addr, entry)| (addr, entry.fragment, entry.slot))
                .collect(),
        }
    }
}
