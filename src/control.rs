use byteorder::LittleEndian;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U64};

use crate::{PatchError, Result};

const SIGN_BIT: u64 = 1 << 63;

/// One replay step of a patch.
///
/// `diff` bytes are rebuilt from the old file plus the diff stream, `extra`
/// bytes are copied from the extra stream, then the old-file cursor moves by
/// `diff + seek`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ControlRecord {
    pub diff: i64,
    pub extra: i64,
    pub seek: i64,
}

/// Wire form of a [`ControlRecord`]: three sign-magnitude integers.
#[derive(Debug, Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub(crate) struct RawControl {
    diff: U64<LittleEndian>,
    extra: U64<LittleEndian>,
    seek: U64<LittleEndian>,
}

pub(crate) const RAW_CONTROL_LEN: usize = std::mem::size_of::<RawControl>();

/// Encodes `value` the way bsdiff's `offtout` does: magnitude in the low 63
/// bits, sign in the top bit.
pub fn encode_offset(value: i64) -> u64 {
    if value < 0 {
        value.unsigned_abs() | SIGN_BIT
    } else {
        value as u64
    }
}

/// Inverse of [`encode_offset`]. A set sign bit with zero magnitude reads as 0.
pub fn decode_offset(raw: u64) -> i64 {
    let magnitude = (raw & !SIGN_BIT) as i64;
    if raw & SIGN_BIT != 0 {
        -magnitude
    } else {
        magnitude
    }
}

impl ControlRecord {
    pub fn new(diff: i64, extra: i64, seek: i64) -> Self {
        ControlRecord { diff, extra, seek }
    }

    pub(crate) fn to_raw(self) -> RawControl {
        RawControl {
            diff: U64::new(encode_offset(self.diff)),
            extra: U64::new(encode_offset(self.extra)),
            seek: U64::new(encode_offset(self.seek)),
        }
    }

    pub(crate) fn from_raw(raw: &RawControl) -> Self {
        ControlRecord {
            diff: decode_offset(raw.diff.get()),
            extra: decode_offset(raw.extra.get()),
            seek: decode_offset(raw.seek.get()),
        }
    }
}

/// Serializes records back to back, 24 bytes each.
pub(crate) fn encode_records(records: &[ControlRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * RAW_CONTROL_LEN);
    for record in records {
        out.extend_from_slice(record.to_raw().as_bytes());
    }
    out
}

pub(crate) fn decode_records(block: &[u8]) -> Result<Vec<ControlRecord>> {
    if block.len() % RAW_CONTROL_LEN != 0 {
        return Err(PatchError::corruption(format!(
            "control block is {} bytes, not a multiple of {}",
            block.len(),
            RAW_CONTROL_LEN
        )));
    }
    block
        .chunks_exact(RAW_CONTROL_LEN)
        .map(|chunk| {
            LayoutVerified::<_, RawControl>::new(chunk)
                .map(|raw| ControlRecord::from_raw(&raw))
                .ok_or_else(|| PatchError::corruption("Bytes not aligned"))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sign_magnitude() {
        assert_eq!(encode_offset(0), 0);
        assert_eq!(encode_offset(5), 5);
        assert_eq!(encode_offset(-1), 0x8000_0000_0000_0001);
        assert_eq!(encode_offset(-6), 0x8000_0000_0000_0006);
        assert_eq!(encode_offset(i64::MAX), 0x7fff_ffff_ffff_ffff);

        assert_eq!(decode_offset(0x8000_0000_0000_0001), -1);
        assert_eq!(decode_offset(0x8000_0000_0000_0000), 0);
        assert_eq!(decode_offset(42), 42);
    }

    #[test]
    fn wire_layout() {
        let bytes = encode_records(&[ControlRecord::new(6, 0, -6)]);
        assert_eq!(
            bytes,
            [
                6, 0, 0, 0, 0, 0, 0, 0, //
                0, 0, 0, 0, 0, 0, 0, 0, //
                6, 0, 0, 0, 0, 0, 0, 0x80,
            ]
        );
        assert_eq!(decode_records(&bytes).unwrap(), vec![ControlRecord::new(6, 0, -6)]);
    }

    #[test]
    fn rejects_partial_record() {
        let mut bytes = encode_records(&[ControlRecord::new(1, 2, 3)]);
        bytes.pop();
        assert!(matches!(decode_records(&bytes), Err(PatchError::Corruption(_))));
    }
}
