use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PatchError>;

/// Everything that can go wrong while generating or applying a patch.
#[derive(Error, Debug)]
pub enum PatchError {
    /// The patch header is missing, truncated, or carries the wrong magic tag.
    #[error("Invalid patch format: {0}")]
    Format(String),

    /// The header parsed, but the blocks behind it do not describe a valid
    /// reconstruction of the new file.
    #[error("Corrupt patch: {0}")]
    Corruption(String),

    #[error("{context}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        PatchError::Format(reason.into())
    }

    pub(crate) fn corruption(reason: impl Into<String>) -> Self {
        PatchError::Corruption(reason.into())
    }
}

/// Attaches a short description to an I/O failure, in the spirit of
/// `anyhow::Context`.
pub(crate) trait IoContext<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| PatchError::Io { context, source })
    }
}
