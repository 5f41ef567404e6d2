//! Global name pool locator

use memchr::memmem;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::memory::layout::{name, name_array, name_pool};
use crate::memory::validate::is_plausible_ptr;
use crate::memory::{ByteView, ReadMemory};
use crate::offset::{NamePoolInfo, NamePoolLayout};
use crate::sections::{SectionCache, SectionSnapshot};

use super::sections_in_order;

/// Scan `preferred` first, then every other section, for a name pool header.
pub fn locate<R: ReadMemory + ?Sized>(
    reader: &R,
    sections: &SectionCache,
    preferred: &str,
) -> Result<NamePoolInfo> {
    for section in sections_in_order(sections, preferred) {
        debug!("  Scanning {} for name pool", section.name);
        if let Some(info) = scan_section(reader, section) {
            info!("  Name pool: 0x{:X} ({})", info.address, info.layout);
            return Ok(info);
        }
    }
    Err(Error::AnchorNotFound("name pool"))
}

/// Pooled layout over the whole section first, then the chunked array; 8-byte aligned.
pub fn scan_section<R: ReadMemory + ?Sized>(
    reader: &R,
    section: &SectionSnapshot,
) -> Option<NamePoolInfo> {
    let pooled_end = section.size().saturating_sub(name_pool::HEADER_SIZE);
    let pooled = (0..=pooled_end)
        .step_by(8)
        .find_map(|off| check_pooled(reader, section, off));
    if pooled.is_some() {
        return pooled;
    }

    let array_end = section.size().saturating_sub(name_array::HEADER_SIZE);
    (0..=array_end)
        .step_by(8)
        .find_map(|off| check_chunked_array(reader, section, off))
}

pub fn check_pooled<R: ReadMemory + ?Sized>(
    reader: &R,
    section: &SectionSnapshot,
    off: usize,
) -> Option<NamePoolInfo> {
    let current_block = section.u32_at(off + name_pool::CURRENT_BLOCK)?;
    let cursor = section.u32_at(off + name_pool::CURRENT_CURSOR)?;
    let first_block = section.u64_at(off + name_pool::BLOCKS as usize)?;

    if current_block > name_pool::MAX_CURRENT_BLOCK
        || cursor == 0
        || cursor > name_pool::MAX_CURSOR
        || !is_plausible_ptr(first_block)
    {
        return None;
    }

    let head = reader
        .read_bytes(first_block, name_pool::NONE_SEARCH_BYTES)
        .ok()?;
    let has_none = memmem::find_iter(&head, name::NONE.as_bytes()).any(|pos| pos % 2 == 0);
    if !has_none {
        return None;
    }

    let address = section.address_of(off);
    debug!(
        "  Pooled candidate at 0x{:X}: block={} cursor=0x{:X}",
        address, current_block, cursor
    );
    Some(NamePoolInfo::new(address, NamePoolLayout::Pooled))
}

pub fn check_chunked_array<R: ReadMemory + ?Sized>(
    reader: &R,
    section: &SectionSnapshot,
    off: usize,
) -> Option<NamePoolInfo> {
    let chunks = section.u64_at(off + name_array::CHUNKS)?;
    let count = section.i32_at(off + name_array::NUM_ELEMENTS)?;
    if !is_plausible_ptr(chunks) || !name_array::NUM_ELEMENTS_RANGE.contains(&count) {
        return None;
    }

    let chunk0 = reader.read_ptr(chunks).ok().filter(|p| is_plausible_ptr(*p))?;
    let entry0 = reader.read_ptr(chunk0).ok().filter(|p| is_plausible_ptr(*p))?;
    let has_none = name_array::FIRST_ENTRY_OFFSETS.iter().any(|&sub| {
        reader
            .read_bytes(entry0 + sub, name::NONE.len())
            .is_ok_and(|bytes| bytes == name::NONE.as_bytes())
    });
    if !has_none {
        return None;
    }

    let address = section.address_of(off);
    debug!("  Chunked name array candidate at 0x{:X}: count={}", address, count);
    Some(NamePoolInfo::new(address, NamePoolLayout::ChunkedArray))
}
