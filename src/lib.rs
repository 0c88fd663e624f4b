//! Binary deltas in the bsdiff 4.x patch format.
//!
//! A patch is generated by suffix-sorting the old file, scanning the new file
//! for long approximate matches against it, and storing the result as three
//! bzip2-compressed streams behind a 32 byte `BSDIFF40` header. Patches written
//! here can be applied by `bspatch`, and patches written by `bsdiff` can be
//! applied here.
//!
//! ```
//! let old = b"the quick brown fox jumps over the lazy dog".to_vec();
//! let new = b"the quick brown cat jumps over the lazy dog!".to_vec();
//!
//! let mut patch = Vec::new();
//! bsdelta::generate(&old, &new, &mut patch)?;
//! assert_eq!(bsdelta::apply_to_vec(&old, &patch)?, new);
//! # Ok::<(), bsdelta::PatchError>(())
//! ```
//!
//! Sorting dominates the cost of a diff. When several new files are diffed
//! against the same old file, build the [`SuffixArray`] once and pass it to
//! [`generate_with`]; the output is identical to [`generate`].

pub use codec::{write_patch, Delta, Patch, HEADER_LEN};
pub use compress::StreamCompressor;
pub use control::{decode_offset, encode_offset, ControlRecord};
pub use error::{PatchError, Result};
pub use patch::{apply, apply_to_vec};

#[cfg(feature = "diff")]
pub use diff::{encode, generate, generate_with, DiffOptions};
#[cfg(feature = "diff")]
pub use search::{Match, TieBreak};
#[cfg(feature = "diff")]
pub use sufsort::SuffixArray;

const BSDIFF_MAGIC: &[u8; 8] = b"BSDIFF40";

mod codec;
mod compress;
mod control;
mod error;
mod patch;

#[cfg(feature = "diff")]
mod diff;
#[cfg(feature = "diff")]
mod search;
#[cfg(feature = "diff")]
mod sufsort;
