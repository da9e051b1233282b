//! Cluster pattern value type and its canonical byte codec.
//!
//! A `ClusterPattern` is the immutable 2-D binary mask of one detected
//! cluster: bounding-box spans, the top-left anchor within the chip-local
//! pixel grid, and the row-major MSB-first packed bitmap. Equality and the
//! stable content hash cover the mask only; the anchor records where the
//! cluster sat on the chip and does not affect identity.

pub mod codec;

pub use codec::CodecError;

/// Maximum bounding-box span along the row axis, in pixels.
pub const MAX_ROW_SPAN: usize = 32;
/// Maximum bounding-box span along the column axis, in pixels.
pub const MAX_COL_SPAN: usize = 32;

/// Immutable 2-D binary pixel mask with its chip-local anchor.
#[derive(Clone, Debug)]
pub struct ClusterPattern {
    row_span: u8,
    col_span: u8,
    anchor_row: u16,
    anchor_col: u16,
    /// `ceil(row_span * col_span / 8)` bytes; padding bits are zero.
    bits: Vec<u8>,
}

impl ClusterPattern {
    /// Builds a pattern from raw parts, validating spans, bitmap length and
    /// padding bits.
    pub fn new(
        row_span: u8,
        col_span: u8,
        anchor_row: u16,
        anchor_col: u16,
        bits: Vec<u8>,
    ) -> Result<Self, CodecError> {
        codec::validate(row_span, col_span, &bits)?;
        Ok(Self {
            row_span,
            col_span,
            anchor_row,
            anchor_col,
            bits,
        })
    }

    /// Builds a pattern from the list of set pixels, given as (row, col)
    /// offsets relative to the anchor. Offsets must fit the spans.
    pub fn from_pixels(
        row_span: u8,
        col_span: u8,
        anchor_row: u16,
        anchor_col: u16,
        pixels: &[(u8, u8)],
    ) -> Result<Self, CodecError> {
        let nbits = row_span as usize * col_span as usize;
        let mut bits = vec![0u8; nbits.div_ceil(8)];
        for &(r, c) in pixels {
            if r >= row_span || c >= col_span {
                return Err(CodecError::PixelOutOfBounds {
                    row: r,
                    col: c,
                    row_span,
                    col_span,
                });
            }
            let bit = r as usize * col_span as usize + c as usize;
            bits[bit / 8] |= 0x80 >> (bit % 8);
        }
        Self::new(row_span, col_span, anchor_row, anchor_col, bits)
    }

    pub fn row_span(&self) -> u8 {
        self.row_span
    }

    pub fn col_span(&self) -> u8 {
        self.col_span
    }

    /// Top-left corner of the bounding box in the chip-local pixel grid.
    pub fn anchor(&self) -> (u16, u16) {
        (self.anchor_row, self.anchor_col)
    }

    /// Packed bitmap, row-major, MSB first.
    pub fn bitmap(&self) -> &[u8] {
        &self.bits
    }

    /// Whether the pixel at (row, col) inside the bounding box is set.
    pub fn pixel(&self, row: u8, col: u8) -> bool {
        if row >= self.row_span || col >= self.col_span {
            return false;
        }
        let bit = row as usize * self.col_span as usize + col as usize;
        self.bits[bit / 8] & (0x80 >> (bit % 8)) != 0
    }

    /// Number of fired pixels in the mask.
    pub fn pixel_count(&self) -> u16 {
        self.bits.iter().map(|b| b.count_ones() as u16).sum()
    }

    /// Geometric center of the bounding box in chip-local pitch units,
    /// as (row, col). Pixel (r, c) covers [r, r+1) x [c, c+1).
    pub fn center(&self) -> (f64, f64) {
        (
            self.anchor_row as f64 + self.row_span as f64 / 2.0,
            self.anchor_col as f64 + self.col_span as f64 / 2.0,
        )
    }

    /// Stable 64-bit content hash over spans and bitmap (FNV-1a).
    ///
    /// The value is part of the persisted dictionary and must not change
    /// across runs or platforms. Accidental collisions between differing
    /// masks are handled fail-closed by the accumulator (full-mask compare),
    /// never silently merged.
    pub fn topology_hash(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut h = OFFSET;
        for &b in [self.row_span, self.col_span].iter().chain(self.bits.iter()) {
            h ^= b as u64;
            h = h.wrapping_mul(PRIME);
        }
        h
    }

    /// Renders the mask as rows of `X`/`.`, one string per row.
    pub fn ascii_rows(&self) -> Vec<String> {
        (0..self.row_span)
            .map(|r| {
                (0..self.col_span)
                    .map(|c| if self.pixel(r, c) { 'X' } else { '.' })
                    .collect()
            })
            .collect()
    }
}

// Mask identity only: two patterns are equal iff spans and bitmap match,
// regardless of where they were observed on the chip.
impl PartialEq for ClusterPattern {
    fn eq(&self, other: &Self) -> bool {
        self.row_span == other.row_span
            && self.col_span == other.col_span
            && self.bits == other.bits
    }
}

impl Eq for ClusterPattern {}
