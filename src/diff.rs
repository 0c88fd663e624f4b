use std::io::Write;
use std::time::Instant;

use log::{debug, trace};

use crate::codec::{write_patch, Delta};
use crate::compress::{StreamCompressor, DEFAULT_LEVEL};
use crate::{ControlRecord, Result, SuffixArray, TieBreak};

/// A fresh match has to beat the current alignment by more than this many
/// bytes before the scanner switches to it. A match the current alignment
/// already reproduces byte for byte (`len == oldscore`) also stops the search,
/// and the scanner then skips over it without emitting a record.
const FUZZ: isize = 8;

/// Consecutive candidates that stay within `FUZZ` of the previous one before
/// the scanner gives up looking for a better anchor.
const NEAR_MISS_LIMIT: usize = 100;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    pub tie_break: TieBreak,
    /// bzip2 level for all three blocks.
    pub compression: u32,
}

impl Default for DiffOptions {
    fn default() -> Self {
        DiffOptions {
            tie_break: TieBreak::default(),
            compression: DEFAULT_LEVEL,
        }
    }
}

/// Generate a patch turning `old` into `new` and write it to `patch`.
pub fn generate(old: &[u8], new: &[u8], patch: &mut impl Write) -> Result<()> {
    generate_with(
        &SuffixArray::new(old),
        new,
        patch,
        &DiffOptions::default(),
        |_| {},
    )
}

/// Like [`generate`], but against a suffix array built ahead of time, so one
/// old file can be diffed against many new ones without sorting it again.
///
/// `progress` is called with the number of new-file bytes consumed so far.
pub fn generate_with(
    suffixes: &SuffixArray,
    new: &[u8],
    patch: &mut impl Write,
    options: &DiffOptions,
    progress: impl FnMut(u64),
) -> Result<()> {
    let delta = encode(suffixes, new, options, progress);
    write_patch(
        &delta,
        new.len() as u64,
        &StreamCompressor::new(options.compression),
        patch,
    )
}

/// Scans `new` against the indexed old file and produces the raw control,
/// diff and extra streams.
pub fn encode(
    suffixes: &SuffixArray,
    new: &[u8],
    options: &DiffOptions,
    mut progress: impl FnMut(u64),
) -> Delta {
    let started = Instant::now();
    let old = suffixes.old();
    let old_len = old.len() as isize;
    let new_len = new.len() as isize;
    let mut delta = Delta::default();

    // new[i] equals the old byte `offset` positions away
    let agrees = |i: isize, offset: isize| {
        let j = i + offset;
        j >= 0 && j < old_len && old[j as usize] == new[i as usize]
    };

    let mut scan = 0;
    let mut len = 0;
    let mut pos = 0;
    let mut lastscan = 0;
    let mut lastpos = 0;
    let mut lastoffset = 0;
    // bsdiff has no early exit, and HigherRank output has to match it
    let early_exit = options.tie_break != TieBreak::HigherRank;
    while scan < new_len {
        let mut oldscore = 0;
        let mut near_misses = 0;
        scan += len;
        let mut scsc = scan;
        while scan < new_len {
            let (prev_len, prev_oldscore, prev_pos) = (len, oldscore, pos);
            let found = suffixes.longest_match(&new[scan as usize..], options.tie_break);
            pos = found.position as isize;
            len = found.len as isize;

            while scsc < scan + len {
                if agrees(scsc, lastoffset) {
                    oldscore += 1;
                }
                scsc += 1;
            }

            if (len == oldscore && len != 0) || len > oldscore + FUZZ {
                break;
            }

            if agrees(scan, lastoffset) {
                oldscore -= 1;
            }

            if early_exit {
                if prev_len - FUZZ <= len
                    && len <= prev_len
                    && prev_oldscore - FUZZ <= oldscore
                    && oldscore <= prev_oldscore
                    && prev_pos <= pos
                    && pos <= prev_pos + FUZZ
                    && oldscore <= len
                    && len <= oldscore + FUZZ
                {
                    near_misses += 1;
                } else {
                    near_misses = 0;
                }
                if near_misses > NEAR_MISS_LIMIT {
                    break;
                }
            }
            scan += 1;
        }

        if len == oldscore && scan != new_len {
            continue;
        }

        // Grow the previous match forward from lastscan while at least half
        // of the bytes agree.
        let mut s = 0;
        let mut s_f = 0;
        let mut lenf = 0;
        let mut i = 0;
        while lastscan + i < scan && lastpos + i < old_len {
            if old[(lastpos + i) as usize] == new[(lastscan + i) as usize] {
                s += 1;
            }
            i += 1;
            if s * 2 - i > s_f * 2 - lenf {
                s_f = s;
                lenf = i;
            }
        }

        // Same thing backwards from the new match.
        let mut lenb = 0;
        if scan < new_len {
            let mut s = 0;
            let mut s_b = 0;
            let mut i = 1;
            while scan >= lastscan + i && pos >= i {
                if old[(pos - i) as usize] == new[(scan - i) as usize] {
                    s += 1;
                }
                if s * 2 - i > s_b * 2 - lenb {
                    s_b = s;
                    lenb = i;
                }
                i += 1;
            }
        }

        // The two extensions may overlap; give each byte to whichever side
        // matches it.
        if lastscan + lenf > scan - lenb {
            let overlap = (lastscan + lenf) - (scan - lenb);
            let mut s = 0;
            let mut s_s = 0;
            let mut lens = 0;
            for i in 0..overlap {
                if new[(lastscan + lenf - overlap + i) as usize]
                    == old[(lastpos + lenf - overlap + i) as usize]
                {
                    s += 1;
                }
                if new[(scan - lenb + i) as usize] == old[(pos - lenb + i) as usize] {
                    s -= 1;
                }
                if s > s_s {
                    s_s = s;
                    lens = i + 1;
                }
            }
            lenf += lens - overlap;
            lenb -= lens;
        }

        let extra_start = lastscan + lenf;
        let extra_end = scan - lenb;
        debug_assert!(lenf >= 0 && extra_end >= extra_start);

        delta.diff.extend(
            new[lastscan as usize..extra_start as usize]
                .iter()
                .zip(&old[lastpos as usize..(lastpos + lenf) as usize])
                .map(|(new, old)| new.wrapping_sub(*old)),
        );
        delta
            .extra
            .extend_from_slice(&new[extra_start as usize..extra_end as usize]);
        let record = ControlRecord::new(
            lenf as i64,
            (extra_end - extra_start) as i64,
            ((pos - lenb) - (lastpos + lenf)) as i64,
        );
        trace!("control record at new offset {}: {:?}", lastscan, record);
        delta.control.push(record);

        lastscan = scan - lenb;
        lastpos = pos - lenb;
        lastoffset = pos - scan;
        progress(lastscan as u64);
    }

    debug!(
        "scanned {} new bytes into {} control records in {:?}",
        new.len(),
        delta.control.len(),
        started.elapsed()
    );
    delta
}
