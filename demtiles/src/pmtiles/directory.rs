//! Directory entries and their columnar varint encoding.
//!
//! A serialized directory is a varint entry count followed by four varint
//! columns: tile id deltas, run lengths, lengths and offsets. Offsets are
//! stored as `offset + 1`, with `0` meaning "directly after the previous
//! entry's bytes".

use crate::error::{DemError, Result};

/// Longest valid LEB128 encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// One directory record.
///
/// `run_length == 0` marks a pointer to a leaf directory; otherwise the entry
/// addresses tile bytes shared by `run_length` consecutive tile ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Entry {
    pub tile_id: u64,
    pub offset: u64,
    pub length: u32,
    pub run_length: u32,
}

impl Entry {
    pub fn is_leaf_pointer(&self) -> bool {
        self.run_length == 0
    }
}

struct VarintReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> VarintReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Err(DemError::Format(format!(
                    "varint cut off at byte {}",
                    self.pos
                )));
            };
            self.pos += 1;

            let bits = u64::from(byte & 0x7f);
            if i == MAX_VARINT_LEN - 1 && bits > 1 {
                return Err(DemError::Format("varint overflows u64".into()));
            }
            value |= bits << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DemError::Format(format!(
            "varint longer than {MAX_VARINT_LEN} bytes at byte {}",
            self.pos
        )))
    }

    fn read_u32(&mut self, field: &str) -> Result<u32> {
        let value = self.read_u64()?;
        u32::try_from(value)
            .map_err(|_| DemError::Format(format!("{field} {value} does not fit in u32")))
    }
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decode an uncompressed directory.
///
/// # Errors
///
/// Returns [`DemError::Format`] for malformed varints, an entry count the
/// input cannot hold, tile id overflow or trailing bytes.
pub fn deserialize_directory(bytes: &[u8]) -> Result<Vec<Entry>> {
    let mut reader = VarintReader::new(bytes);
    let count = reader.read_u64()?;
    // Every entry takes at least one byte per column
    if count > (reader.remaining() / 4) as u64 {
        return Err(DemError::Format(format!(
            "directory claims {count} entries in {} bytes",
            reader.remaining()
        )));
    }
    let count = count as usize;
    let mut entries = vec![Entry::default(); count];

    let mut last_id = 0u64;
    for entry in entries.iter_mut() {
        let delta = reader.read_u64()?;
        last_id = last_id
            .checked_add(delta)
            .ok_or_else(|| DemError::Format("tile id overflow".into()))?;
        entry.tile_id = last_id;
    }
    for entry in entries.iter_mut() {
        entry.run_length = reader.read_u32("run length")?;
    }
    for entry in entries.iter_mut() {
        entry.length = reader.read_u32("length")?;
    }
    for i in 0..count {
        let stored = reader.read_u64()?;
        entries[i].offset = match (stored, i) {
            (0, 0) => 0,
            (0, _) => {
                let prev = entries[i - 1];
                prev.offset
                    .checked_add(u64::from(prev.length))
                    .ok_or_else(|| DemError::Format("offset overflow".into()))?
            }
            (stored, _) => stored - 1,
        };
    }

    if reader.remaining() != 0 {
        return Err(DemError::Format(format!(
            "{} trailing bytes after directory",
            reader.remaining()
        )));
    }
    Ok(entries)
}

/// Encode entries, which must be sorted by ascending tile id.
pub fn serialize_directory(entries: &[Entry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * 8 + 2);
    write_varint(&mut buf, entries.len() as u64);

    let mut last_id = 0u64;
    for entry in entries {
        write_varint(&mut buf, entry.tile_id - last_id);
        last_id = entry.tile_id;
    }
    for entry in entries {
        write_varint(&mut buf, u64::from(entry.run_length));
    }
    for entry in entries {
        write_varint(&mut buf, u64::from(entry.length));
    }
    for (i, entry) in entries.iter().enumerate() {
        let contiguous = i > 0 && {
            let prev = &entries[i - 1];
            entry.offset == prev.offset + u64::from(prev.length)
        };
        if contiguous {
            write_varint(&mut buf, 0);
        } else {
            write_varint(&mut buf, entry.offset + 1);
        }
    }
    buf
}

/// Find the entry covering `tile_id`.
///
/// Picks the last entry whose tile id is `<= tile_id`. A leaf pointer covers
/// everything up to the next entry; a tile entry covers its run.
pub fn find_tile(entries: &[Entry], tile_id: u64) -> Option<Entry> {
    let idx = entries.partition_point(|e| e.tile_id <= tile_id);
    let entry = *entries.get(idx.checked_sub(1)?)?;
    if entry.is_leaf_pointer() || tile_id - entry.tile_id < u64::from(entry.run_length) {
        Some(entry)
    } else {
        None
    }
}
