//! Interned-string decoding
//!
//! Two pool encodings exist:
//! - pooled: `index` splits into a block number and an entry offset; entries carry a
//!   2-byte header holding length and a wide-character flag
//! - chunked array: `index` selects a pointer in fixed-size chunks; the string sits
//!   behind a header of build-dependent size
//!
//! Decoded names are cached behind a reader-writer lock. Concurrent misses may decode
//! the same index twice; the second insert is a no-op.

use std::collections::HashMap;

use encoding_rs::{UTF_16LE, WINDOWS_1252};
use parking_lot::RwLock;

use crate::memory::layout::{name, name_array, name_pool};
use crate::memory::validate::{is_plausible_ptr, is_printable_ascii};
use crate::memory::{ByteView, ReadMemory};
use crate::offset::{NamePoolInfo, NamePoolLayout};

/// Bytes fetched per read while looking for a terminator
const READ_CHUNK: usize = 64;

#[derive(Debug)]
pub struct NameResolver {
    pool: NamePoolInfo,
    cache: RwLock<HashMap<i32, String>>,
}

impl NameResolver {
    pub fn new(pool: NamePoolInfo) -> Self {
        Self {
            pool,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &NamePoolInfo {
        &self.pool
    }

    /// Decode a comparison index. Invalid indices and malformed entries yield `None`.
    pub fn resolve<R: ReadMemory + ?Sized>(&self, reader: &R, index: i32) -> Option<String> {
        if index <= 0 {
            return None;
        }
        if let Some(hit) = self.cache.read().get(&index) {
            return Some(hit.clone());
        }

        let decoded = match self.pool.layout {
            NamePoolLayout::Pooled => decode_pooled(reader, &self.pool, index),
            NamePoolLayout::ChunkedArray => decode_chunked(reader, &self.pool, index),
        }?;

        self.cache
            .write()
            .entry(index)
            .or_insert_with(|| decoded.clone());
        Some(decoded)
    }

    /// Display form: `Base` or `Base_{number - 1}`
    pub fn resolve_numbered<R: ReadMemory + ?Sized>(
        &self,
        reader: &R,
        index: i32,
        number: i32,
    ) -> Option<String> {
        let base = self.resolve(reader, index)?;
        Some(if number > 0 {
            format!("{}_{}", base, number - 1)
        } else {
            base
        })
    }

    /// Read an embedded name value (index, number) at `address` and decode it
    pub fn read_name<R: ReadMemory + ?Sized>(&self, reader: &R, address: u64) -> Option<String> {
        let raw = reader.read_bytes(address, name::SIZE as usize).ok()?;
        let index = raw.i32_at(name::COMPARISON_INDEX as usize)?;
        let number = raw.i32_at(name::NUMBER as usize)?;
        self.resolve_numbered(reader, index, number)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

fn decode_pooled<R: ReadMemory + ?Sized>(
    reader: &R,
    pool: &NamePoolInfo,
    index: i32,
) -> Option<String> {
    let index = index as u32;
    let block = (index >> pool.block_offset_bits) as u64;
    let offset = (index & ((1 << pool.block_offset_bits) - 1)) as u64 * pool.entry_stride as u64;

    let block_ptr = reader
        .read_ptr(pool.address + name_pool::BLOCKS + block * 8)
        .ok()?;
    if !is_plausible_ptr(block_ptr) {
        return None;
    }

    let entry = block_ptr + offset;
    let header = reader.read_u16(entry).ok()?;
    let len = (header >> name_pool::LENGTH_SHIFT) as usize;
    if len == 0 || len > name::MAX_LENGTH {
        return None;
    }

    let text = entry + name_pool::ENTRY_HEADER_SIZE;
    if header & name_pool::WIDE_FLAG != 0 {
        let bytes = reader.read_bytes(text, len * 2).ok()?;
        let (decoded, had_errors) = UTF_16LE.decode_without_bom_handling(&bytes);
        (!had_errors).then(|| decoded.into_owned())
    } else {
        let bytes = reader.read_bytes(text, len).ok()?;
        let (decoded, _) = WINDOWS_1252.decode_without_bom_handling(&bytes);
        Some(decoded.into_owned())
    }
}

fn decode_chunked<R: ReadMemory + ?Sized>(
    reader: &R,
    pool: &NamePoolInfo,
    index: i32,
) -> Option<String> {
    let index = index as u64;
    let chunk = index / name_array::ELEMENTS_PER_CHUNK as u64;
    let within = index % name_array::ELEMENTS_PER_CHUNK as u64;

    let chunks = reader.read_ptr(pool.address).ok()?;
    if !is_plausible_ptr(chunks) {
        return None;
    }
    let chunk_ptr = reader.read_ptr(chunks + chunk * 8).ok()?;
    if !is_plausible_ptr(chunk_ptr) {
        return None;
    }
    let entry = reader.read_ptr(chunk_ptr + within * 8).ok()?;
    if !is_plausible_ptr(entry) {
        return None;
    }

    // A run must start on a boundary, otherwise a larger header guess would return a suffix
    name_array::ENTRY_STRING_OFFSETS.iter().find_map(|&off| {
        let before = reader.read_u8(entry + off - 1).ok()?;
        if is_printable_ascii(before) {
            return None;
        }
        read_printable_run(reader, entry + off)
    })
}

/// NUL-terminated printable ASCII of 1..=1024 characters
pub(crate) fn read_printable_run<R: ReadMemory + ?Sized>(
    reader: &R,
    address: u64,
) -> Option<String> {
    let mut text = String::new();
    let mut cursor = address;
    loop {
        let chunk = reader.read_bytes(cursor, READ_CHUNK).ok()?;
        for &byte in &chunk {
            if byte == 0 {
                return (!text.is_empty()).then_some(text);
            }
            if !is_printable_ascii(byte) || text.len() == name::MAX_LENGTH {
                return None;
            }
            text.push(byte as char);
        }
        cursor += READ_CHUNK as u64;
    }
}

/// Encode a pooled entry (header + characters) as the runtime lays it out
#[cfg(test)]
pub(crate) fn encode_pooled_entry(text: &str, wide: bool) -> Vec<u8> {
    let (len, payload): (usize, Vec<u8>) = if wide {
        let units: Vec<u16> = text.encode_utf16().collect();
        (
            units.len(),
            units.iter().flat_map(|u| u.to_le_bytes()).collect(),
        )
    } else {
        (text.len(), text.as_bytes().to_vec())
    };
    let header = ((len as u16) << name_pool::LENGTH_SHIFT) | u16::from(wide);
    let mut bytes = header.to_le_bytes().to_vec();
    bytes.extend(payload);
    bytes
}
