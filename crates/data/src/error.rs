//! Errors for the binary asset decoders.

use thiserror::Error;

/// Unrecoverable decode failures.
///
/// Section-boundary disagreements are deliberately NOT represented here:
/// those are logged and decoding continues with best-effort partial data, so
/// a corrupt trailing section never blocks meshes that already parsed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("buffer too short: need {needed} bytes at offset {offset}, have {len}")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}
