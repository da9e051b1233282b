//! Binary and text serialization of the finalized dictionary.
//!
//! Binary layout (little-endian throughout):
//!
//! ```text
//! magic "TPDC" | version u16 | slot_count u32
//! per slot: payload_len u32 | payload
//! payload:  id u32 | flag u8 | pattern bytes | count u64 | bias_samples u64
//!           | mean_d_row f64 | mean_d_col f64
//!           | member_count u32 | member hashes u64 ...
//! ```
//!
//! Records are length-prefixed so a reader built against this version can
//! skip trailing fields appended by a future one. Corrupt or truncated
//! input fails with a distinct error; a dictionary is never partially
//! loaded. Both forms are pure functions of the dictionary value.

use super::{Dictionary, ShapeClass, Slot, SlotStats};
use crate::pattern::{codec::HEADER_LEN, ClusterPattern, CodecError};
use std::fmt::Write as _;
use thiserror::Error;

const MAGIC: [u8; 4] = *b"TPDC";
const VERSION: u16 = 1;

/// Failures while reading a serialized dictionary. All are fatal for the
/// load; the caller never sees a half-built dictionary.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DictionaryDecodeError {
    #[error("not a topology dictionary (bad magic)")]
    BadMagic,
    #[error("unsupported dictionary version {0}")]
    UnsupportedVersion(u16),
    #[error("dictionary data truncated in {context}")]
    Truncated { context: &'static str },
    #[error("slot {got} out of order, expected id {expected}")]
    NonSequentialId { expected: u32, got: u32 },
    #[error("unknown slot flag {0}")]
    BadFlag(u8),
    #[error("invalid slot pattern: {0}")]
    Pattern(#[from] CodecError),
}

struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DictionaryDecodeError> {
        if self.data.len() < n {
            return Err(DictionaryDecodeError::Truncated { context });
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self, context: &'static str) -> Result<u8, DictionaryDecodeError> {
        Ok(self.take(1, context)?[0])
    }

    fn u16(&mut self, context: &'static str) -> Result<u16, DictionaryDecodeError> {
        Ok(u16::from_le_bytes(self.take(2, context)?.try_into().unwrap()))
    }

    fn u32(&mut self, context: &'static str) -> Result<u32, DictionaryDecodeError> {
        Ok(u32::from_le_bytes(self.take(4, context)?.try_into().unwrap()))
    }

    fn u64(&mut self, context: &'static str) -> Result<u64, DictionaryDecodeError> {
        Ok(u64::from_le_bytes(self.take(8, context)?.try_into().unwrap()))
    }

    fn f64(&mut self, context: &'static str) -> Result<f64, DictionaryDecodeError> {
        Ok(f64::from_le_bytes(self.take(8, context)?.try_into().unwrap()))
    }
}

fn write_slot(out: &mut Vec<u8>, id: u32, slot: &Slot) {
    let pattern_bytes = slot.pattern().to_bytes();
    let members = slot.member_hashes();
    let stats = slot.stats();
    let payload_len = 4 + 1 + pattern_bytes.len() + 8 + 8 + 8 + 8 + 4 + 8 * members.len();
    out.extend_from_slice(&(payload_len as u32).to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.push(if slot.is_group() { 1 } else { 0 });
    out.extend_from_slice(&pattern_bytes);
    out.extend_from_slice(&stats.count.to_le_bytes());
    out.extend_from_slice(&stats.bias_samples.to_le_bytes());
    out.extend_from_slice(&stats.mean_d_row.to_le_bytes());
    out.extend_from_slice(&stats.mean_d_col.to_le_bytes());
    out.extend_from_slice(&(members.len() as u32).to_le_bytes());
    for &hash in members {
        out.extend_from_slice(&hash.to_le_bytes());
    }
}

fn read_pattern(cur: &mut Cursor<'_>) -> Result<ClusterPattern, DictionaryDecodeError> {
    let header = cur.take(HEADER_LEN, "slot pattern header")?;
    let nbits = header[0] as usize * header[1] as usize;
    let bitmap = cur.take(nbits.div_ceil(8), "slot pattern bitmap")?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + bitmap.len());
    bytes.extend_from_slice(header);
    bytes.extend_from_slice(bitmap);
    Ok(ClusterPattern::from_bytes(&bytes)?)
}

fn read_slot(payload: &[u8], expected_id: u32) -> Result<Slot, DictionaryDecodeError> {
    let mut cur = Cursor::new(payload);
    let id = cur.u32("slot id")?;
    if id != expected_id {
        return Err(DictionaryDecodeError::NonSequentialId {
            expected: expected_id,
            got: id,
        });
    }
    let flag = cur.u8("slot flag")?;
    let pattern = read_pattern(&mut cur)?;
    let stats = SlotStats {
        count: cur.u64("slot count")?,
        bias_samples: cur.u64("slot bias samples")?,
        mean_d_row: cur.f64("slot mean row bias")?,
        mean_d_col: cur.f64("slot mean column bias")?,
    };
    let member_count = cur.u32("slot member count")? as usize;
    // The claimed count is only trusted up to what the record still holds;
    // a short record fails on the first missing hash.
    let mut members = Vec::with_capacity(member_count.min(cur.remaining() / 8));
    for _ in 0..member_count {
        members.push(cur.u64("slot member hash")?);
    }
    // Remaining payload bytes belong to fields of a future version.
    match flag {
        0 => Ok(Slot::Individual {
            hash: pattern.topology_hash(),
            pattern,
            stats,
        }),
        1 => Ok(Slot::Group {
            class: ShapeClass::of(&pattern),
            representative_hash: pattern.topology_hash(),
            representative: pattern,
            members,
            stats,
        }),
        other => Err(DictionaryDecodeError::BadFlag(other)),
    }
}

impl Dictionary {
    /// Serializes to the compact binary form. Deterministic for a given
    /// dictionary value.
    pub fn serialize_binary(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for (id, slot) in self.slots().iter().enumerate() {
            write_slot(&mut out, id as u32, slot);
        }
        out
    }

    /// Reads a dictionary serialized by [`Dictionary::serialize_binary`].
    pub fn deserialize_binary(bytes: &[u8]) -> Result<Self, DictionaryDecodeError> {
        let mut cur = Cursor::new(bytes);
        if cur.take(4, "magic")? != MAGIC {
            return Err(DictionaryDecodeError::BadMagic);
        }
        let version = cur.u16("version")?;
        if version != VERSION {
            return Err(DictionaryDecodeError::UnsupportedVersion(version));
        }
        let slot_count = cur.u32("slot count")?;
        // Every record costs at least its 4-byte length prefix, which bounds
        // the reservation for a corrupt count; the parse loop below still
        // demands all `slot_count` records.
        let mut slots = Vec::with_capacity((slot_count as usize).min(cur.remaining() / 4));
        for id in 0..slot_count {
            let payload_len = cur.u32("slot length")? as usize;
            let payload = cur.take(payload_len, "slot payload")?;
            slots.push(read_slot(payload, id)?);
        }
        // Bytes after the last record are reserved for future sections.
        Ok(Dictionary::from_slots(slots))
    }

    /// Human-readable diagnostic form: one line per slot, value-exact.
    pub fn serialize_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# topology dictionary, {} slots", self.len());
        for (id, slot) in self.slots().iter().enumerate() {
            let p = slot.pattern();
            let (anchor_row, anchor_col) = p.anchor();
            let stats = slot.stats();
            let bitmap: String = p.bitmap().iter().map(|b| format!("{b:02x}")).collect();
            let _ = writeln!(
                out,
                "{id} {kind} span={rows}x{cols} anchor={anchor_row},{anchor_col} \
                 bitmap={bitmap} count={count} samples={samples} dRow={d_row} dCol={d_col} \
                 members={members}",
                kind = if slot.is_group() { "G" } else { "I" },
                rows = p.row_span(),
                cols = p.col_span(),
                count = stats.count,
                samples = stats.bias_samples,
                d_row = stats.mean_d_row,
                d_col = stats.mean_d_col,
                members = slot.member_hashes().len(),
            );
        }
        out
    }
}
