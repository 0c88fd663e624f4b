use std::io::{Read, Write};

use log::debug;

use crate::error::IoContext;
use crate::{Patch, PatchError, Result};

impl Patch {
    /// Replays the control records against `old` and returns the new file.
    ///
    /// Nothing is returned unless every record stayed inside the old file,
    /// the output is exactly `new_file_len` bytes long, and the diff and
    /// extra streams were consumed completely.
    pub fn replay(&self, old: &[u8]) -> Result<Vec<u8>> {
        let new_file_len = self.new_file_len;
        let delta = &self.delta;
        let mut new = Vec::with_capacity(
            (delta.diff.len() + delta.extra.len()).min(new_file_len as usize),
        );
        let mut diff = &delta.diff[..];
        let mut extra = &delta.extra[..];
        let mut cursor: i64 = 0;

        for (index, record) in delta.control.iter().enumerate() {
            if record.diff < 0 || record.extra < 0 {
                return Err(PatchError::corruption(format!(
                    "control record {} has a negative length",
                    index
                )));
            }
            let (diff_len, extra_len) = (record.diff as u64, record.extra as u64);
            if (new.len() as u64)
                .checked_add(diff_len)
                .and_then(|len| len.checked_add(extra_len))
                .map_or(true, |len| len > new_file_len)
            {
                return Err(PatchError::corruption(format!(
                    "control record {} writes past the declared new file length {}",
                    index, new_file_len
                )));
            }

            if diff_len > 0 {
                let end = cursor.checked_add(record.diff);
                let source = match end {
                    Some(end) if cursor >= 0 && end as u64 <= old.len() as u64 => {
                        &old[cursor as usize..end as usize]
                    }
                    _ => {
                        return Err(PatchError::corruption(format!(
                            "control record {} reads old bytes {}..{} of {}",
                            index,
                            cursor,
                            cursor.saturating_add(record.diff),
                            old.len()
                        )))
                    }
                };
                let stored = take(&mut diff, diff_len, "diff", index)?;
                new.extend(
                    source
                        .iter()
                        .zip(stored)
                        .map(|(old, diff)| old.wrapping_add(*diff)),
                );
            }

            new.extend_from_slice(take(&mut extra, extra_len, "extra", index)?);

            cursor = cursor
                .checked_add(record.diff)
                .and_then(|cursor| cursor.checked_add(record.seek))
                .ok_or_else(|| {
                    PatchError::corruption(format!("control record {} seeks out of range", index))
                })?;
        }

        if new.len() as u64 != new_file_len {
            return Err(PatchError::corruption(format!(
                "patch too short: rebuilt {} of {} bytes",
                new.len(),
                new_file_len
            )));
        }
        if !diff.is_empty() || !extra.is_empty() {
            return Err(PatchError::corruption(format!(
                "{} diff and {} extra bytes left over after replay",
                diff.len(),
                extra.len()
            )));
        }
        Ok(new)
    }
}

fn take<'a>(stream: &mut &'a [u8], len: u64, name: &str, index: usize) -> Result<&'a [u8]> {
    if len > stream.len() as u64 {
        return Err(PatchError::corruption(format!(
            "control record {} needs {} {} bytes, only {} left",
            index,
            len,
            name,
            stream.len()
        )));
    }
    let (head, tail) = stream.split_at(len as usize);
    *stream = tail;
    Ok(head)
}

/// Apply a patch file produced by [`generate`][crate::generate] or by bsdiff.
///
/// The new file is only written once the whole patch has been replayed and
/// checked, so `new` never receives a partial result from a corrupt patch.
/// A failing sink can of course still leave it half written.
pub fn apply(old: &[u8], new: &mut impl Write, patch: &mut impl Read) -> Result<()> {
    let patch = Patch::read_from(patch)?;
    let rebuilt = patch.replay(old)?;
    debug!("rebuilt {} bytes from {} old bytes", rebuilt.len(), old.len());
    new.write_all(&rebuilt)
        .context("Failed to write to new file")?;
    new.flush().context("Failed to write to new file")
}

/// In-memory form of [`apply`].
pub fn apply_to_vec(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    Patch::parse(patch)?.replay(old)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::{write_patch, Delta};
    use crate::compress::StreamCompressor;
    use crate::ControlRecord;

    fn build(records: &[ControlRecord], diff: &[u8], extra: &[u8], new_len: u64) -> Vec<u8> {
        let delta = Delta {
            control: records.to_vec(),
            diff: diff.to_vec(),
            extra: extra.to_vec(),
        };
        let mut out = Vec::new();
        write_patch(&delta, new_len, &StreamCompressor::default(), &mut out).unwrap();
        out
    }

    fn corruption(result: Result<Vec<u8>>) -> bool {
        matches!(result, Err(PatchError::Corruption(_)))
    }

    #[test]
    fn replays_diff_extra_and_seek() {
        // "hello" plus a literal "! ", seek back to the start, then "hello"
        // again with its last byte bumped
        let old = b"hello world";
        let patch = build(
            &[
                ControlRecord::new(5, 2, -5),
                ControlRecord::new(5, 0, 0),
            ],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
            b"! ",
            12,
        );
        assert_eq!(apply_to_vec(old, &patch).unwrap(), b"hello! hellp");
    }

    #[test]
    fn out_of_bounds_diff_is_fatal() {
        let patch = build(&[ControlRecord::new(4, 0, 0)], &[0; 4], b"", 4);
        assert!(corruption(apply_to_vec(b"abc", &patch)));

        let patch = build(
            &[ControlRecord::new(0, 1, -1), ControlRecord::new(1, 0, 0)],
            &[0],
            b"x",
            2,
        );
        assert!(corruption(apply_to_vec(b"abc", &patch)));
    }

    #[test]
    fn output_longer_than_declared() {
        let patch = build(&[ControlRecord::new(0, 3, 0)], b"", b"abc", 2);
        assert!(corruption(apply_to_vec(b"", &patch)));
    }

    #[test]
    fn output_shorter_than_declared() {
        let patch = build(&[ControlRecord::new(0, 3, 0)], b"", b"abc", 4);
        assert!(corruption(apply_to_vec(b"", &patch)));
    }

    #[test]
    fn negative_lengths() {
        let patch = build(&[ControlRecord::new(-1, 0, 0)], b"", b"", 0);
        assert!(corruption(apply_to_vec(b"abc", &patch)));
    }

    #[test]
    fn leftover_stream_bytes() {
        let patch = build(&[ControlRecord::new(0, 1, 0)], b"", b"ab", 1);
        assert!(corruption(apply_to_vec(b"", &patch)));
    }

    #[test]
    fn missing_extra_bytes() {
        let patch = build(&[ControlRecord::new(0, 3, 0)], b"", b"ab", 3);
        assert!(corruption(apply_to_vec(b"", &patch)));
    }

    #[test]
    fn truncated_body() {
        let patch = build(&[ControlRecord::new(0, 3, 0)], b"", b"abc", 3);
        assert!(apply_to_vec(b"", &patch[..patch.len() - 8]).is_err());
    }

    #[test]
    fn apply_writes_nothing_on_failure() {
        let patch = build(&[ControlRecord::new(4, 0, 0)], &[0; 4], b"", 4);
        let mut out = Vec::new();
        assert!(apply(b"abc", &mut out, &mut &patch[..]).is_err());
        assert!(out.is_empty());
    }
}
