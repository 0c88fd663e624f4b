//! The BSDIFF40 container.
//!
//! ```text
//! 0   8  magic "BSDIFF40"
//! 8   8  compressed control block length
//! 16  8  compressed diff block length
//! 24  8  new file length
//! 32  .. control block, diff block, extra block (runs to end of patch)
//! ```
//!
//! Header integers are written the same way as control integers. Lengths are
//! never negative, so a set sign bit marks a malformed header.

use std::io::{Read, Write};
use std::mem::size_of;

use byteorder::LittleEndian;
use log::debug;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U64};

use crate::compress::StreamCompressor;
use crate::control::{decode_records, encode_records, ControlRecord, RAW_CONTROL_LEN};
use crate::error::IoContext;
use crate::{PatchError, Result, BSDIFF_MAGIC};

#[derive(Debug, Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub(crate) struct PatchHeader {
    magic: [u8; 8],
    control_len: U64<LittleEndian>,
    diff_len: U64<LittleEndian>,
    new_file_len: U64<LittleEndian>,
}

pub const HEADER_LEN: usize = size_of::<PatchHeader>();

/// The three uncompressed streams a diff produces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delta {
    pub control: Vec<ControlRecord>,
    pub diff: Vec<u8>,
    pub extra: Vec<u8>,
}

/// A fully decoded patch, ready to be replayed against an old file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub new_file_len: u64,
    pub delta: Delta,
}

fn header_field(value: u64, name: &str) -> Result<usize> {
    if value > i64::MAX as u64 {
        return Err(PatchError::format(format!("negative {} in header", name)));
    }
    Ok(value as usize)
}

/// Compresses the three streams of `delta` and writes a complete patch.
pub fn write_patch(
    delta: &Delta,
    new_file_len: u64,
    compressor: &StreamCompressor,
    patch: &mut impl Write,
) -> Result<()> {
    let control = compressor.compress(&encode_records(&delta.control))?;
    let diff = compressor.compress(&delta.diff)?;
    let extra = compressor.compress(&delta.extra)?;
    debug!(
        "compressed blocks: control {} -> {}, diff {} -> {}, extra {} -> {}",
        delta.control.len() * RAW_CONTROL_LEN,
        control.len(),
        delta.diff.len(),
        diff.len(),
        delta.extra.len(),
        extra.len()
    );

    let header = PatchHeader {
        magic: *BSDIFF_MAGIC,
        control_len: U64::new(control.len() as u64),
        diff_len: U64::new(diff.len() as u64),
        new_file_len: U64::new(new_file_len),
    };
    for block in [header.as_bytes(), &control[..], &diff[..], &extra[..]].iter() {
        patch
            .write_all(block)
            .context("Failed to write to patch file")?;
    }
    patch.flush().context("Failed to write to patch file")?;
    Ok(())
}

impl Patch {
    /// Parses the header and decompresses all three blocks.
    pub fn parse(bytes: &[u8]) -> Result<Patch> {
        if bytes.len() < HEADER_LEN {
            return Err(PatchError::format(format!(
                "patch is {} bytes, shorter than the {} byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let (head, body) = bytes.split_at(HEADER_LEN);
        let header = LayoutVerified::<_, PatchHeader>::new(head)
            .map(|header| *header)
            .ok_or_else(|| PatchError::format("Bytes not aligned"))?;
        if &header.magic != BSDIFF_MAGIC {
            return Err(PatchError::format("Invalid magic number"));
        }

        let control_len = header_field(header.control_len.get(), "control block length")?;
        let diff_len = header_field(header.diff_len.get(), "diff block length")?;
        let new_file_len = header_field(header.new_file_len.get(), "new file length")? as u64;
        if control_len
            .checked_add(diff_len)
            .map_or(true, |declared| declared > body.len())
        {
            return Err(PatchError::format(format!(
                "header declares {} + {} block bytes but only {} follow",
                control_len,
                diff_len,
                body.len()
            )));
        }

        // Every record but the last moves the scan forward, and the diff and
        // extra streams never hold more than the new file.
        let control_limit = new_file_len
            .saturating_add(1)
            .saturating_mul(RAW_CONTROL_LEN as u64);
        let (control, rest) = body.split_at(control_len);
        let (diff, extra) = rest.split_at(diff_len);
        let control = decode_records(&StreamCompressor::decompress(
            control,
            "control",
            control_limit,
        )?)?;
        let diff = StreamCompressor::decompress(diff, "diff", new_file_len)?;
        let extra = StreamCompressor::decompress(extra, "extra", new_file_len)?;
        debug!(
            "parsed patch: {} control records, {} diff bytes, {} extra bytes, new file {} bytes",
            control.len(),
            diff.len(),
            extra.len(),
            new_file_len
        );

        Ok(Patch {
            new_file_len,
            delta: Delta {
                control,
                diff,
                extra,
            },
        })
    }

    /// Reads a whole patch from `reader` and parses it.
    pub fn read_from(reader: &mut impl Read) -> Result<Patch> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .context("Failed to read patch file")?;
        Patch::parse(&bytes)
    }
}
