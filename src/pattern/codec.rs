//! Canonical byte encoding of cluster patterns.
//!
//! Layout (all multi-byte fields little-endian):
//! `row_span u8 | col_span u8 | anchor_row u16 | anchor_col u16 | bitmap`,
//! where the bitmap holds `ceil(row_span * col_span / 8)` bytes, row-major,
//! MSB first, padding bits zero. The encoding is minimal and deterministic:
//! `encode(decode(b)) == b` for every valid `b`, which together with the
//! padding check keeps the content hash stable.

use super::{ClusterPattern, MAX_COL_SPAN, MAX_ROW_SPAN};
use thiserror::Error;

/// Fixed part of the encoding preceding the bitmap.
pub const HEADER_LEN: usize = 6;

/// Validation and decode failures for pattern bytes.
///
/// All of these are batch-fatal for the caller: a malformed pattern means
/// the input stream itself is corrupt, not one bad sample.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("pattern bytes truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("{extra} trailing bytes after pattern bitmap")]
    TrailingBytes { extra: usize },
    #[error(
        "pattern span {row_span}x{col_span} outside 1..={max_rows} x 1..={max_cols}",
        max_rows = MAX_ROW_SPAN,
        max_cols = MAX_COL_SPAN
    )]
    SpanOutOfRange { row_span: u8, col_span: u8 },
    #[error("bitmap holds {got} bytes, spans require {needed}")]
    BitmapLengthMismatch { needed: usize, got: usize },
    #[error("nonzero padding bits after the last mask bit")]
    DirtyPadding,
    #[error("pixel ({row}, {col}) outside span {row_span}x{col_span}")]
    PixelOutOfBounds {
        row: u8,
        col: u8,
        row_span: u8,
        col_span: u8,
    },
}

/// Checks spans, bitmap length and padding bits for a prospective pattern.
pub(super) fn validate(row_span: u8, col_span: u8, bits: &[u8]) -> Result<(), CodecError> {
    if row_span == 0
        || col_span == 0
        || row_span as usize > MAX_ROW_SPAN
        || col_span as usize > MAX_COL_SPAN
    {
        return Err(CodecError::SpanOutOfRange { row_span, col_span });
    }
    let nbits = row_span as usize * col_span as usize;
    let needed = nbits.div_ceil(8);
    if bits.len() != needed {
        return Err(CodecError::BitmapLengthMismatch {
            needed,
            got: bits.len(),
        });
    }
    let pad = needed * 8 - nbits;
    if pad > 0 && bits[needed - 1] & ((1u8 << pad) - 1) != 0 {
        return Err(CodecError::DirtyPadding);
    }
    Ok(())
}

impl ClusterPattern {
    /// Serializes the pattern to its canonical byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let (anchor_row, anchor_col) = self.anchor();
        let mut out = Vec::with_capacity(HEADER_LEN + self.bitmap().len());
        out.push(self.row_span());
        out.push(self.col_span());
        out.extend_from_slice(&anchor_row.to_le_bytes());
        out.extend_from_slice(&anchor_col.to_le_bytes());
        out.extend_from_slice(self.bitmap());
        out
    }

    /// Decodes a pattern from its canonical byte form. The slice must hold
    /// exactly one pattern.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                got: bytes.len(),
            });
        }
        let row_span = bytes[0];
        let col_span = bytes[1];
        if row_span == 0
            || col_span == 0
            || row_span as usize > MAX_ROW_SPAN
            || col_span as usize > MAX_COL_SPAN
        {
            return Err(CodecError::SpanOutOfRange { row_span, col_span });
        }
        let anchor_row = u16::from_le_bytes([bytes[2], bytes[3]]);
        let anchor_col = u16::from_le_bytes([bytes[4], bytes[5]]);
        let nbytes = (row_span as usize * col_span as usize).div_ceil(8);
        let needed = HEADER_LEN + nbytes;
        if bytes.len() < needed {
            return Err(CodecError::Truncated {
                needed,
                got: bytes.len(),
            });
        }
        if bytes.len() > needed {
            return Err(CodecError::TrailingBytes {
                extra: bytes.len() - needed,
            });
        }
        ClusterPattern::new(
            row_span,
            col_span,
            anchor_row,
            anchor_col,
            bytes[HEADER_LEN..needed].to_vec(),
        )
    }
}
