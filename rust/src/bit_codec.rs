//! Bit-field codec over flat `u64` word buffers.
//!
//! Node content is stored as runs of fixed-width unsigned fields packed back to
//! back into a `Vec<u64>`. Bit offsets count from the most significant bit of
//! word 0, so a sequence of packed fields reads left to right like the integers
//! it holds and sorted records can be binary searched in place.
//!
//! Offsets and widths are trusted: callers are the node layer, and an offset
//! outside the buffer is a bug that panics on the slice index.

/// Number of bits in one storage word.
pub const WORD_BITS: usize = 64;

/// Buffers grow in multiples of this many words to avoid reallocating on
/// every single-entry insert.
pub const WORD_BATCH: usize = 4;

// ============================================================================
// MASKS AND SIZING
// ============================================================================

/// Mask with the lowest `width` bits set. `width` may be 0..=64.
#[inline]
pub fn low_mask(width: usize) -> u64 {
    debug_assert!(width <= WORD_BITS);
    if width >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Number of words needed to hold `bits` bits.
#[inline]
pub fn words_for_bits(bits: usize) -> usize {
    bits.div_ceil(WORD_BITS)
}

/// Resize `words` so it holds at least `bits` bits.
///
/// Growth is rounded up to [`WORD_BATCH`] words; shrinking releases the excess
/// once more than a full batch is unused. New words are zeroed.
pub fn resize_for_bits(words: &mut Vec<u64>, bits: usize) {
    let needed = words_for_bits(bits);
    if needed > words.len() {
        let target = needed.div_ceil(WORD_BATCH) * WORD_BATCH;
        words.resize(target, 0);
    } else if words.len() >= needed + WORD_BATCH {
        let target = needed.div_ceil(WORD_BATCH) * WORD_BATCH;
        words.truncate(target);
        words.shrink_to_fit();
    }
}

// ============================================================================
// FIELD ACCESS
// ============================================================================

/// Read an unsigned field of `width` bits (0..=64) starting at `offset`.
#[inline]
pub fn read(words: &[u64], offset: usize, width: usize) -> u64 {
    debug_assert!(width <= WORD_BITS);
    if width == 0 {
        return 0;
    }
    let index = offset / WORD_BITS;
    let shift = offset % WORD_BITS;
    let head = words[index] << shift;
    if shift + width <= WORD_BITS {
        head >> (WORD_BITS - width)
    } else {
        let rest = shift + width - WORD_BITS;
        (head >> (WORD_BITS - width)) | (words[index + 1] >> (WORD_BITS - rest))
    }
}

/// Overwrite the `width`-bit field at `offset` with the low `width` bits of
/// `value`. Higher bits of `value` are ignored.
#[inline]
pub fn write(words: &mut [u64], offset: usize, width: usize, value: u64) {
    debug_assert!(width <= WORD_BITS);
    if width == 0 {
        return;
    }
    let value = value & low_mask(width);
    let index = offset / WORD_BITS;
    let shift = offset % WORD_BITS;
    if shift + width <= WORD_BITS {
        let pos = WORD_BITS - shift - width;
        let mask = low_mask(width) << pos;
        words[index] = (words[index] & !mask) | (value << pos);
    } else {
        let rest = shift + width - WORD_BITS;
        let head_bits = WORD_BITS - shift;
        let head_mask = low_mask(head_bits);
        words[index] = (words[index] & !head_mask) | (value >> rest);
        let tail_pos = WORD_BITS - rest;
        let tail_mask = low_mask(rest) << tail_pos;
        words[index + 1] = (words[index + 1] & !tail_mask) | (value << tail_pos);
    }
}

// ============================================================================
// RANGE SHIFTING
// ============================================================================

/// Shift every bit at or after `offset` towards the end of the buffer by
/// `n_bits`, opening a zeroed gap of `n_bits` at `offset`.
///
/// The buffer length is not changed: bits shifted past the last word are
/// dropped, so callers grow the buffer first (see [`resize_for_bits`]).
pub fn insert_bits(words: &mut [u64], offset: usize, n_bits: usize) {
    let total = words.len() * WORD_BITS;
    if n_bits == 0 || offset >= total {
        return;
    }
    if offset + n_bits < total {
        // Copy back to front so the source is never clobbered before it is read.
        let mut pos = total - n_bits;
        while pos > offset {
            let len = (pos - offset).min(WORD_BITS);
            pos -= len;
            let chunk = read(words, pos, len);
            write(words, pos + n_bits, len, chunk);
        }
    }
    clear_bits(words, offset, n_bits.min(total - offset));
}

/// Remove `n_bits` bits at `offset`, shifting everything after them towards
/// the start of the buffer. The vacated bits at the end are zeroed.
pub fn remove_bits(words: &mut [u64], offset: usize, n_bits: usize) {
    let total = words.len() * WORD_BITS;
    if n_bits == 0 || offset >= total {
        return;
    }
    let n_bits = n_bits.min(total - offset);
    let mut pos = offset;
    while pos + n_bits < total {
        let len = (total - n_bits - pos).min(WORD_BITS);
        let chunk = read(words, pos + n_bits, len);
        write(words, pos, len, chunk);
        pos += len;
    }
    clear_bits(words, total - n_bits, n_bits);
}

/// Zero `n_bits` bits starting at `offset`.
pub fn clear_bits(words: &mut [u64], offset: usize, n_bits: usize) {
    let mut pos = offset;
    let end = offset + n_bits;
    while pos < end {
        let len = (end - pos).min(WORD_BITS);
        write(words, pos, len, 0);
        pos += len;
    }
}

/// Copy `n_bits` bits from `src` at `src_offset` into `dst` at `dst_offset`.
pub fn copy_bits(src: &[u64], src_offset: usize, dst: &mut [u64], dst_offset: usize, n_bits: usize) {
    let mut done = 0;
    while done < n_bits {
        let len = (n_bits - done).min(WORD_BITS);
        let chunk = read(src, src_offset + done, len);
        write(dst, dst_offset + done, len, chunk);
        done += len;
    }
}

// ============================================================================
// SEARCH
// ============================================================================

/// Binary search over `n_entries` fixed-stride records starting at `start_bit`.
///
/// Each record is a `key_width`-bit key followed by `value_width` bits of
/// payload, and records are sorted by key. Returns the record index when
/// found, otherwise `-(insertion_point + 1)`.
pub fn binary_search(
    words: &[u64],
    start_bit: usize,
    n_entries: usize,
    key: u64,
    key_width: usize,
    value_width: usize,
) -> isize {
    let stride = key_width + value_width;
    let mut low = 0usize;
    let mut high = n_entries;
    while low < high {
        let mid = low + (high - low) / 2;
        let probe = read(words, start_bit + mid * stride, key_width);
        if probe < key {
            low = mid + 1;
        } else if probe > key {
            high = mid;
        } else {
            return mid as isize;
        }
    }
    -(low as isize) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_width_field() {
        let mut words = vec![u64::MAX; 2];
        assert_eq!(read(&words, 17, 0), 0);
        write(&mut words, 17, 0, 0);
        assert_eq!(words, vec![u64::MAX; 2]);
    }

    #[test]
    fn test_field_exactly_filling_a_word() {
        let mut words = vec![0u64; 3];
        write(&mut words, 64, 64, 0xDEAD_BEEF_0123_4567);
        assert_eq!(words[1], 0xDEAD_BEEF_0123_4567);
        assert_eq!(read(&words, 64, 64), 0xDEAD_BEEF_0123_4567);
        assert_eq!(words[0], 0);
        assert_eq!(words[2], 0);
    }

    #[test]
    fn test_field_spanning_word_boundary() {
        let mut words = vec![0u64; 2];
        write(&mut words, 60, 10, 0b11_0101_1011);
        assert_eq!(read(&words, 60, 10), 0b11_0101_1011);
        assert_eq!(words[0], 0b1101);
        assert_eq!(words[1] >> 58, 0b01_1011);

        write(&mut words, 1, 64, u64::MAX);
        assert_eq!(read(&words, 1, 64), u64::MAX);
        assert_eq!(read(&words, 0, 1), 0);
        assert_eq!(read(&words, 65, 5), 0b1_1011);
    }

    #[test]
    fn test_write_ignores_high_bits_and_keeps_neighbours() {
        let mut words = vec![u64::MAX; 2];
        write(&mut words, 10, 5, 0xFFFF_FFF0);
        assert_eq!(read(&words, 10, 5), 0b10000);
        assert_eq!(read(&words, 0, 10), 0x3FF);
        assert_eq!(read(&words, 15, 49), low_mask(49));
        assert_eq!(words[1], u64::MAX);
    }

    #[test]
    fn test_msb_first_ordering() {
        let mut words = vec![0u64; 1];
        write(&mut words, 0, 1, 1);
        assert_eq!(words[0], 1u64 << 63);
        write(&mut words, 63, 1, 1);
        assert_eq!(words[0], (1u64 << 63) | 1);
    }

    #[test]
    fn test_insert_bits_opens_zeroed_gap() {
        let mut words = vec![0u64; 2];
        write(&mut words, 0, 8, 0xAB);
        write(&mut words, 8, 8, 0xCD);
        insert_bits(&mut words, 8, 70);
        assert_eq!(read(&words, 0, 8), 0xAB);
        assert_eq!(read(&words, 8, 64), 0);
        assert_eq!(read(&words, 72, 6), 0);
        assert_eq!(read(&words, 78, 8), 0xCD);
    }

    #[test]
    fn test_remove_bits_closes_gap() {
        let mut words = vec![0u64; 3];
        write(&mut words, 0, 8, 0xAB);
        write(&mut words, 8, 64, u64::MAX);
        write(&mut words, 72, 8, 0xCD);
        write(&mut words, 180, 4, 0xF);
        remove_bits(&mut words, 8, 64);
        assert_eq!(read(&words, 0, 8), 0xAB);
        assert_eq!(read(&words, 8, 8), 0xCD);
        assert_eq!(read(&words, 116, 4), 0xF);
        assert_eq!(read(&words, 128, 64), 0);
    }

    #[test]
    fn test_insert_then_remove_restores_buffer() {
        let mut words = vec![0x0123_4567_89AB_CDEF, 0xFEDC_BA98_7654_3210, 0, 0];
        let original = words.clone();
        insert_bits(&mut words, 37, 91);
        remove_bits(&mut words, 37, 91);
        assert_eq!(words, original);
    }

    #[test]
    fn test_copy_bits_unaligned() {
        let src = vec![0xFFFF_0000_FFFF_0000u64, 0x1234_5678_9ABC_DEF0];
        let mut dst = vec![0u64; 3];
        copy_bits(&src, 16, &mut dst, 5, 100);
        for i in 0..100 {
            assert_eq!(read(&dst, 5 + i, 1), read(&src, 16 + i, 1), "bit {}", i);
        }
        assert_eq!(read(&dst, 0, 5), 0);
    }

    #[test]
    fn test_binary_search_found_and_insertion_points() {
        // Records: 5-bit key + 7-bit payload.
        let keys = [2u64, 5, 9, 17, 30];
        let mut words = vec![0u64; 2];
        for (i, k) in keys.iter().enumerate() {
            write(&mut words, 3 + i * 12, 5, *k);
            write(&mut words, 3 + i * 12 + 5, 7, 0x7F);
        }
        assert_eq!(binary_search(&words, 3, keys.len(), 9, 5, 7), 2);
        assert_eq!(binary_search(&words, 3, keys.len(), 2, 5, 7), 0);
        assert_eq!(binary_search(&words, 3, keys.len(), 30, 5, 7), 4);
        assert_eq!(binary_search(&words, 3, keys.len(), 0, 5, 7), -1);
        assert_eq!(binary_search(&words, 3, keys.len(), 10, 5, 7), -4);
        assert_eq!(binary_search(&words, 3, keys.len(), 31, 5, 7), -6);
        assert_eq!(binary_search(&words, 3, 0, 4, 5, 7), -1);
    }

    #[test]
    fn test_resize_for_bits_batches_words() {
        let mut words = Vec::new();
        resize_for_bits(&mut words, 65);
        assert_eq!(words.len(), WORD_BATCH);
        resize_for_bits(&mut words, 64 * WORD_BATCH + 1);
        assert_eq!(words.len(), 2 * WORD_BATCH);
        resize_for_bits(&mut words, 10);
        assert_eq!(words.len(), WORD_BATCH);
        resize_for_bits(&mut words, 0);
        assert!(words.is_empty());
    }
}
