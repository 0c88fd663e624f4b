//! Suffix sorting for the old file.
//!
//! This is the prefix-doubling sort (Larsson & Sadakane) used by bsdiff: suffixes
//! are bucketed by their first byte, then every round sorts each unfinished group
//! by the rank of the suffix `h` bytes further on, doubling `h` until every suffix
//! sits in a group of its own.
//!
//! The empty suffix (offset `old.len()`) takes part in the sort and always ends up
//! with rank 0, so both tables cover `0..=old.len()`.

use std::ops::Range;
use std::time::Instant;

use log::debug;

/// Groups smaller than this are sorted with a simple selection pass instead of
/// a three-way partition.
const SMALL_GROUP: usize = 16;

/// Immutable suffix index over an old file.
///
/// Build it once with [`SuffixArray::new`] and hand it to
/// [`generate_with`][crate::generate_with] for every new file diffed against the
/// same old file. Nothing mutates it after construction, so it can be shared
/// between threads by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixArray<'a> {
    old: &'a [u8],
    /// rank -> offset
    sorted: Vec<isize>,
    /// offset -> rank
    ranks: Vec<isize>,
    /// Minimum offset over rank ranges, as a bottom-up segment tree: leaves
    /// sit at `total..2 * total` and node `i` covers nodes `2i` and `2i + 1`.
    lowest: Vec<isize>,
}

impl<'a> SuffixArray<'a> {
    pub fn new(old: &'a [u8]) -> Self {
        let started = Instant::now();
        let mut sorted = vec![0; old.len() + 1];
        let mut ranks = vec![0; old.len() + 1];
        qsufsort(&mut sorted, &mut ranks, old);
        let lowest = lowest_offsets(&sorted);
        debug!("sorted {} suffixes in {:?}", old.len() + 1, started.elapsed());
        SuffixArray {
            old,
            sorted,
            ranks,
            lowest,
        }
    }

    /// The bytes this index was built over.
    pub fn old(&self) -> &'a [u8] {
        self.old
    }

    /// Length of the indexed old file.
    pub fn len(&self) -> usize {
        self.old.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old.is_empty()
    }

    /// Offset of the suffix with lexicographic rank `rank`, for `rank` in
    /// `0..=len()`.
    pub fn offset_at(&self, rank: usize) -> usize {
        self.sorted[rank] as usize
    }

    /// Lexicographic rank of the suffix starting at `offset`, for `offset` in
    /// `0..=len()`.
    pub fn rank_of(&self, offset: usize) -> usize {
        self.ranks[offset] as usize
    }

    pub(crate) fn sorted(&self) -> &[isize] {
        &self.sorted
    }

    /// Smallest offset among the suffixes ranked in `ranks`, which must not
    /// be empty.
    pub(crate) fn lowest_offset(&self, ranks: Range<usize>) -> usize {
        debug_assert!(ranks.start < ranks.end);
        let total = self.sorted.len();
        let (mut lo, mut hi) = (ranks.start + total, ranks.end + total);
        let mut lowest = isize::MAX;
        while lo < hi {
            if lo & 1 == 1 {
                lowest = lowest.min(self.lowest[lo]);
                lo += 1;
            }
            if hi & 1 == 1 {
                hi -= 1;
                lowest = lowest.min(self.lowest[hi]);
            }
            lo /= 2;
            hi /= 2;
        }
        lowest as usize
    }
}

fn lowest_offsets(sorted: &[isize]) -> Vec<isize> {
    let total = sorted.len();
    let mut tree = vec![0; 2 * total];
    tree[total..].copy_from_slice(sorted);
    for i in (1..total).rev() {
        tree[i] = tree[2 * i].min(tree[2 * i + 1]);
    }
    tree
}

fn qsufsort(sorted: &mut [isize], ranks: &mut [isize], old: &[u8]) {
    let n = old.len();

    let mut buckets = [0isize; 256];
    for &byte in old {
        buckets[byte as usize] += 1;
    }
    for i in 1..256 {
        buckets[i] += buckets[i - 1];
    }
    for i in (1..256).rev() {
        buckets[i] = buckets[i - 1];
    }
    buckets[0] = 0;

    // Slot 0 is reserved for the empty suffix, so each bucket fills from one
    // past its start.
    for (i, &byte) in old.iter().enumerate() {
        buckets[byte as usize] += 1;
        sorted[buckets[byte as usize] as usize] = i as isize;
    }
    sorted[0] = n as isize;
    for (i, &byte) in old.iter().enumerate() {
        ranks[i] = buckets[byte as usize];
    }
    ranks[n] = 0;

    // A negative entry -len marks a run of len already-sorted suffixes.
    for i in 1..256 {
        if buckets[i] == buckets[i - 1] + 1 {
            sorted[buckets[i] as usize] = -1;
        }
    }
    sorted[0] = -1;

    let total = n as isize + 1;
    let mut h = 1;
    while sorted[0] != -total {
        let mut done = 0isize;
        let mut i = 0isize;
        while i < total {
            let entry = sorted[i as usize];
            if entry < 0 {
                done -= entry;
                i -= entry;
            } else {
                if done != 0 {
                    sorted[(i - done) as usize] = -done;
                }
                let group = ranks[entry as usize] + 1 - i;
                split(sorted, ranks, i as usize, group as usize, h);
                i += group;
                done = 0;
            }
        }
        if done != 0 {
            sorted[(i - done) as usize] = -done;
        }
        h += h;
    }

    for (offset, &rank) in ranks.iter().enumerate() {
        sorted[rank as usize] = offset as isize;
    }
}

/// Sorts the unfinished group `sorted[start..start + len]` by the rank of the
/// suffix `h` bytes further on, and assigns new group ranks.
fn split(sorted: &mut [isize], ranks: &mut [isize], mut start: usize, mut len: usize, h: usize) {
    loop {
        if len < SMALL_GROUP {
            select_groups(sorted, ranks, start, len, h);
            return;
        }

        let pivot = key(ranks, sorted[start + len / 2], h);
        let mut less = 0;
        let mut equal = 0;
        for &offset in &sorted[start..start + len] {
            let k = key(ranks, offset, h);
            if k < pivot {
                less += 1;
            } else if k == pivot {
                equal += 1;
            }
        }
        let jj = start + less;
        let kk = jj + equal;

        let mut i = start;
        let mut j = 0;
        let mut k = 0;
        while i < jj {
            let v = key(ranks, sorted[i], h);
            if v < pivot {
                i += 1;
            } else if v == pivot {
                sorted.swap(i, jj + j);
                j += 1;
            } else {
                sorted.swap(i, kk + k);
                k += 1;
            }
        }
        while jj + j < kk {
            if key(ranks, sorted[jj + j], h) == pivot {
                j += 1;
            } else {
                sorted.swap(jj + j, kk + k);
                k += 1;
            }
        }

        if jj > start {
            split(sorted, ranks, start, jj - start, h);
        }

        for idx in jj..kk {
            ranks[sorted[idx] as usize] = kk as isize - 1;
        }
        if jj == kk - 1 {
            sorted[jj] = -1;
        }

        if start + len > kk {
            len = start + len - kk;
            start = kk;
        } else {
            return;
        }
    }
}

fn key(ranks: &[isize], offset: isize, h: usize) -> isize {
    ranks[offset as usize + h]
}

fn select_groups(sorted: &mut [isize], ranks: &mut [isize], start: usize, len: usize, h: usize) {
    let end = start + len;
    let mut k = start;
    while k < end {
        let mut j = 1;
        let mut x = key(ranks, sorted[k], h);
        let mut i = 1;
        while k + i < end {
            let v = key(ranks, sorted[k + i], h);
            if v < x {
                x = v;
                j = 0;
            }
            if v == x {
                sorted.swap(k + j, k + i);
                j += 1;
            }
            i += 1;
        }
        for idx in k..k + j {
            ranks[sorted[idx] as usize] = (k + j) as isize - 1;
        }
        if j == 1 {
            sorted[k] = -1;
        }
        k += j;
    }
}
