use std::cmp::Ordering;
use std::ops::Range;

use crate::SuffixArray;

/// The longest prefix of a new-file window found in the old file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Match {
    /// Offset of the match in the old file.
    pub position: usize,
    /// Number of matching bytes. Zero when nothing matched at all.
    pub len: usize,
}

/// How the search settles on one old-file offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TieBreak {
    /// Report the longest match there is and, of all old offsets sharing
    /// that length, the smallest.
    LowestOffset,
    /// Search exactly like bsdiff 4.x: the descent stops at suffixes that are
    /// a prefix of the window, and of the two final candidates the one with
    /// the higher rank wins unless the other matches strictly further. On long
    /// runs of one byte this reports shorter matches than exist, but patches
    /// come out byte-identical to the ones bsdiff writes.
    HigherRank,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::LowestOffset
    }
}

fn match_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(old, new)| old == new).count()
}

/// Compares lexicographically the common part of these slices, i.e. takes the
/// smallest length and compares within that.
fn min_memcmp(a: &[u8], b: &[u8]) -> Ordering {
    let len = a.len().min(b.len());
    a[..len].cmp(&b[..len])
}

impl<'a> SuffixArray<'a> {
    /// Finds the old-file suffix sharing the longest common prefix with `new`.
    ///
    /// This is a binary search over the rank order: the interval `[st, en]`
    /// narrows towards the rank where `new` would be inserted, and once it has
    /// collapsed to two neighbouring ranks the longer of their two matches wins.
    /// [`TieBreak::LowestOffset`] then widens that to every rank sharing the
    /// match and takes the smallest offset among them.
    pub fn longest_match(&self, new: &[u8], tie_break: TieBreak) -> Match {
        let sorted = self.sorted();
        let old = self.old();
        let suffix = |rank: usize| &old[sorted[rank] as usize..];

        let mut st = 0;
        let mut en = self.len();
        while en - st >= 2 {
            let mid = st + (en - st) / 2;
            let order = min_memcmp(suffix(mid), new);
            let right = match tie_break {
                TieBreak::LowestOffset => order != Ordering::Greater,
                TieBreak::HigherRank => order == Ordering::Less,
            };
            if right {
                st = mid;
            } else {
                en = mid;
            }
        }

        let low = match_len(suffix(st), new);
        let high = match_len(suffix(en), new);
        match tie_break {
            TieBreak::LowestOffset => {
                let len = low.max(high);
                Match {
                    position: self.lowest_offset(self.ranks_with_prefix(&new[..len])),
                    len,
                }
            }
            TieBreak::HigherRank if low > high => Match {
                position: sorted[st] as usize,
                len: low,
            },
            TieBreak::HigherRank => Match {
                position: sorted[en] as usize,
                len: high,
            },
        }
    }

    /// Ranks of every suffix that starts with `prefix`. These are contiguous
    /// in rank order.
    fn ranks_with_prefix(&self, prefix: &[u8]) -> Range<usize> {
        let old = self.old();
        let head = |offset: &isize| {
            let suffix = &old[*offset as usize..];
            suffix[..suffix.len().min(prefix.len())].cmp(prefix)
        };
        let sorted = self.sorted();
        let start = sorted.partition_point(|offset| head(offset) == Ordering::Less);
        let end = start + sorted[start..].partition_point(|offset| head(offset) == Ordering::Equal);
        start..end
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use super::{match_len, min_memcmp, Match, TieBreak};
    use crate::SuffixArray;

    #[test]
    fn match_len_stops_at_first_difference() {
        assert_eq!(match_len(b"xyzq", b"xyzw"), 3);
        assert_eq!(match_len(b"xy", b"xyzw"), 2);
        assert_eq!(match_len(b"xyzw", b"x"), 1);
        assert_eq!(match_len(b"wxyz", b"xyzw"), 0);
        assert_eq!(match_len(b"", b"xyzw"), 0);
    }

    #[test]
    fn min_memcmp_ignores_the_longer_tail() {
        assert_eq!(min_memcmp(b"abc", b"abcdef"), Ordering::Equal);
        assert_eq!(min_memcmp(b"abcdef", b"abc"), Ordering::Equal);
        assert_eq!(min_memcmp(b"abb", b"abcdef"), Ordering::Less);
        assert_eq!(min_memcmp(b"abd", b"abc"), Ordering::Greater);
        assert_eq!(min_memcmp(b"", b"abc"), Ordering::Equal);
    }

    #[test]
    fn empty_old_never_matches() {
        let sa = SuffixArray::new(b"");
        let m = sa.longest_match(b"hello", TieBreak::default());
        assert_eq!(m, Match { position: 0, len: 0 });
    }

    #[test]
    fn finds_longest_prefix() {
        let old = b"the quick brown fox jumps over the lazy dog";
        let sa = SuffixArray::new(old);

        let m = sa.longest_match(b"brown cow", TieBreak::default());
        assert_eq!(m.len, 6);
        assert_eq!(&old[m.position..m.position + m.len], b"brown ");

        let m = sa.longest_match(b"lazy dog and more", TieBreak::default());
        assert_eq!(m, Match { position: 35, len: 8 });
    }

    #[test]
    fn whole_window_matches() {
        let old = b"0123456789";
        let sa = SuffixArray::new(old);
        assert_eq!(
            sa.longest_match(b"456", TieBreak::default()),
            Match { position: 4, len: 3 }
        );
    }

    #[test]
    fn no_common_byte() {
        let sa = SuffixArray::new(b"aaaa");
        assert_eq!(sa.longest_match(b"zzz", TieBreak::default()).len, 0);
    }

    #[test]
    fn tie_break_rules() {
        // "abd" sorts between "abcabe" (offset 0) and "abe" (offset 3), and
        // shares two bytes with each.
        let sa = SuffixArray::new(b"abcabe");

        let lowest = sa.longest_match(b"abd", TieBreak::LowestOffset);
        assert_eq!(lowest, Match { position: 0, len: 2 });

        let higher = sa.longest_match(b"abd", TieBreak::HigherRank);
        assert_eq!(higher, Match { position: 3, len: 2 });
    }

    #[test]
    fn lowest_offset_looks_past_the_final_pair() {
        // both "abc"s tie; the one at offset 4 sits next to the insertion point
        let sa = SuffixArray::new(b"abcYabcX");
        assert_eq!(
            sa.longest_match(b"abc", TieBreak::LowestOffset),
            Match { position: 0, len: 3 }
        );

        let old: Vec<u8> = b"xyz.".iter().cycle().take(400).copied().collect();
        let sa = SuffixArray::new(&old);
        assert_eq!(
            sa.longest_match(b"xyz.xyz!", TieBreak::LowestOffset),
            Match { position: 0, len: 7 }
        );
    }

    #[test]
    fn lowest_offset_finds_longer_suffixes_of_a_run() {
        // bsdiff's descent stops at the one-byte suffix here
        let old = vec![0u8; 64];
        let mut new = vec![0u8; 40];
        new[32] = 1;
        let sa = SuffixArray::new(&old);
        assert_eq!(
            sa.longest_match(&new, TieBreak::LowestOffset),
            Match { position: 0, len: 32 }
        );
        assert_eq!(
            sa.longest_match(&new, TieBreak::HigherRank),
            Match { position: 63, len: 1 }
        );
    }

    #[test]
    fn lowest_offset_agrees_with_brute_force() {
        let old: Vec<u8> = (0..300u32).map(|i| b"abc"[(i * i % 7 % 3) as usize]).collect();
        let sa = SuffixArray::new(&old);
        for start in 0..40 {
            let mut window = old[start * 5..start * 5 + 12].to_vec();
            window[11] = b'z';
            let best = (0..=old.len()).map(|at| match_len(&old[at..], &window)).max().unwrap();
            let position = (0..=old.len())
                .find(|&at| match_len(&old[at..], &window) == best)
                .unwrap();
            assert_eq!(
                sa.longest_match(&window, TieBreak::LowestOffset),
                Match { position, len: best }
            );
        }
    }
}
