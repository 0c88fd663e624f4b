//! Per-stream compression.
//!
//! Each of the control, diff and extra streams is compressed on its own as a
//! complete bzip2 stream. bsdiff writes them at level 9 with the default work
//! factor, which is also our default.

use std::io::{Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;

use crate::error::IoContext;
use crate::{PatchError, Result};

pub const DEFAULT_LEVEL: u32 = 9;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamCompressor {
    level: u32,
}

impl Default for StreamCompressor {
    fn default() -> Self {
        StreamCompressor {
            level: DEFAULT_LEVEL,
        }
    }
}

impl StreamCompressor {
    /// `level` is the bzip2 block size in units of 100k, clamped to `1..=9`.
    pub fn new(level: u32) -> Self {
        StreamCompressor {
            level: level.max(1).min(9),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(raw)
            .context("Failed to compress patch stream")?;
        encoder.finish().context("Failed to compress patch stream")
    }

    /// Decompresses one block, refusing to produce more than `limit` bytes.
    /// `name` only shows up in error messages.
    pub fn decompress(compressed: &[u8], name: &str, limit: u64) -> Result<Vec<u8>> {
        let mut raw = Vec::new();
        BzDecoder::new(compressed)
            .take(limit.saturating_add(1))
            .read_to_end(&mut raw)
            .map_err(|err| {
                PatchError::corruption(format!("failed to decompress {} block: {}", name, err))
            })?;
        if raw.len() as u64 > limit {
            return Err(PatchError::corruption(format!(
                "{} block decompresses to more than {} bytes",
                name, limit
            )));
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_stream_is_a_valid_block() {
        let packed = StreamCompressor::default().compress(b"").unwrap();
        assert!(packed.starts_with(b"BZh9"));
        assert!(StreamCompressor::decompress(&packed, "extra", 0).unwrap().is_empty());
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(StreamCompressor::new(0).level(), 1);
        assert_eq!(StreamCompressor::new(12).level(), 9);
        let packed = StreamCompressor::new(1).compress(b"abc").unwrap();
        assert!(packed.starts_with(b"BZh1"));
    }

    #[test]
    fn garbage_is_corruption() {
        let err = StreamCompressor::decompress(b"definitely not bzip2", "diff", 100).unwrap_err();
        assert!(matches!(err, PatchError::Corruption(_)));
    }

    #[test]
    fn output_is_capped() {
        let packed = StreamCompressor::default().compress(&[0; 10_000]).unwrap();
        assert_eq!(StreamCompressor::decompress(&packed, "diff", 10_000).unwrap().len(), 10_000);
        let err = StreamCompressor::decompress(&packed, "diff", 9_999).unwrap_err();
        assert!(matches!(err, PatchError::Corruption(_)));
    }
}
