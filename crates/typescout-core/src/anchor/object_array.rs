//! Global object array locator
//!
//! Candidates are read from the cached section bytes; only the pointers they hold
//! are followed through the reader.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::memory::layout::{chunked_objects, flat_objects, object_item};
use crate::memory::validate::is_plausible_ptr;
use crate::memory::{ByteView, ReadMemory};
use crate::offset::{ObjectArrayInfo, ObjectArrayLayout};
use crate::sections::{SectionCache, SectionSnapshot};

use super::sections_in_order;

/// Scan `preferred` first, then every other section, for a valid object array header.
///
/// The preferred section is searched for the chunked layout before the flat one. Other
/// sections try both layouts at each offset.
pub fn locate<R: ReadMemory + ?Sized>(
    reader: &R,
    sections: &SectionCache,
    preferred: &str,
) -> Result<ObjectArrayInfo> {
    for section in sections_in_order(sections, preferred) {
        debug!(
            "  Scanning {} (0x{:X} bytes) for object array",
            section.name,
            section.size()
        );
        let found = if section.name == preferred {
            scan_section(reader, section)
        } else {
            scan_section_interleaved(reader, section)
        };
        if let Some(mut info) = found {
            detect_stride(reader, &mut info);
            info!(
                "  Object array: 0x{:X} ({}, {} per chunk, stride 0x{:X}, pointer +0x{:X})",
                info.address, info.layout, info.chunk_size, info.stride, info.pointer_offset
            );
            return Ok(info);
        }
    }
    Err(Error::AnchorNotFound("object array"))
}

/// Chunked layout over the whole section first, then flat; ascending address.
pub fn scan_section<R: ReadMemory + ?Sized>(
    reader: &R,
    section: &SectionSnapshot,
) -> Option<ObjectArrayInfo> {
    let chunked_end = section.size().saturating_sub(chunked_objects::HEADER_SIZE);
    let chunked = (0..=chunked_end)
        .step_by(4)
        .find_map(|off| check_chunked(reader, section, off));
    if chunked.is_some() {
        return chunked;
    }

    let flat_end = section.size().saturating_sub(flat_objects::HEADER_SIZE);
    (0..=flat_end)
        .step_by(4)
        .find_map(|off| check_flat(reader, section, off))
}

/// Chunked then flat at each offset; ascending address.
pub fn scan_section_interleaved<R: ReadMemory + ?Sized>(
    reader: &R,
    section: &SectionSnapshot,
) -> Option<ObjectArrayInfo> {
    let end = section.size().saturating_sub(chunked_objects::HEADER_SIZE);
    (0..=end).step_by(4).find_map(|off| {
        check_chunked(reader, section, off).or_else(|| check_flat(reader, section, off))
    })
}

/// Header counts are signed 32-bit; negative values never validate
fn count_at(section: &SectionSnapshot, off: usize) -> Option<u32> {
    u32::try_from(section.i32_at(off)?).ok()
}

/// Validate a chunked header at `off` in `section`
pub fn check_chunked<R: ReadMemory + ?Sized>(
    reader: &R,
    section: &SectionSnapshot,
    off: usize,
) -> Option<ObjectArrayInfo> {
    let objects = section.u64_at(off + chunked_objects::OBJECTS)?;
    let max = count_at(section, off + chunked_objects::MAX_ELEMENTS)?;
    let num = count_at(section, off + chunked_objects::NUM_ELEMENTS)?;
    let max_chunks = count_at(section, off + chunked_objects::MAX_CHUNKS)?;
    let num_chunks = count_at(section, off + chunked_objects::NUM_CHUNKS)?;

    if !chunked_objects::NUM_CHUNKS_RANGE.contains(&num_chunks)
        || !chunked_objects::MAX_CHUNKS_RANGE.contains(&max_chunks)
        || num <= chunked_objects::MIN_NUM_ELEMENTS
        || max <= chunked_objects::MIN_MAX_ELEMENTS
        || num > max
        || num_chunks > max_chunks
        || max % 16 != 0
    {
        return None;
    }

    let per_chunk = max / max_chunks;
    if per_chunk % 16 != 0
        || !chunked_objects::ELEMENTS_PER_CHUNK_RANGE.contains(&per_chunk)
        || num / per_chunk + 1 != num_chunks
        || max / per_chunk != max_chunks
    {
        return None;
    }

    if !is_plausible_ptr(objects) {
        return None;
    }
    let verified = num_chunks.min(chunked_objects::VERIFIED_CHUNKS) as u64;
    let chunks_ok = (0..verified).all(|i| {
        reader
            .read_ptr(objects + i * 8)
            .is_ok_and(is_plausible_ptr)
    });
    if !chunks_ok {
        return None;
    }

    let address = section.address_of(off);
    debug!(
        "  Chunked candidate at 0x{:X}: num={} max={} chunks={}/{}",
        address, num, max, num_chunks, max_chunks
    );
    let mut info = ObjectArrayInfo::new(address, ObjectArrayLayout::Chunked);
    info.chunk_size = per_chunk;
    Some(info)
}

/// Validate a flat header at `off` in `section`
pub fn check_flat<R: ReadMemory + ?Sized>(
    reader: &R,
    section: &SectionSnapshot,
    off: usize,
) -> Option<ObjectArrayInfo> {
    let objects = section.u64_at(off + flat_objects::OBJECTS)?;
    let max = count_at(section, off + flat_objects::MAX_ELEMENTS)?;
    let num = count_at(section, off + flat_objects::NUM_ELEMENTS)?;

    if num < flat_objects::MIN_NUM_ELEMENTS || num > max || max > flat_objects::MAX_MAX_ELEMENTS {
        return None;
    }
    if !is_plausible_ptr(objects) {
        return None;
    }

    let stride = flat_witness_stride(reader, objects)?;
    let address = section.address_of(off);
    debug!(
        "  Flat candidate at 0x{:X}: num={} max={} witness stride 0x{:X}",
        address, num, max, stride
    );
    let mut info = ObjectArrayInfo::new(address, ObjectArrayLayout::Flat);
    info.stride = stride as u32;
    Some(info)
}

/// Stride at which element 5 is a record reporting its own index as 5
fn flat_witness_stride<R: ReadMemory + ?Sized>(reader: &R, objects: u64) -> Option<u64> {
    flat_objects::WITNESS_STRIDES.into_iter().find(|&stride| {
        let Ok(record) = reader.read_ptr(objects + flat_objects::WITNESS_INDEX * stride) else {
            return false;
        };
        is_plausible_ptr(record)
            && flat_objects::WITNESS_INDEX_OFFSETS.iter().any(|&index_off| {
                reader
                    .read_i32(record + index_off)
                    .is_ok_and(|index| index as u64 == flat_objects::WITNESS_INDEX)
            })
    })
}

/// Derive element pointer offset and stride from the first element records.
///
/// Keeps the current values when no candidate fits.
pub fn detect_stride<R: ReadMemory + ?Sized>(reader: &R, info: &mut ObjectArrayInfo) {
    let Some(first) = first_element_block(reader, info) else {
        debug!("  Stride: element block unreadable, keeping defaults");
        return;
    };

    let plausible_at = |addr: u64| reader.read_ptr(addr).is_ok_and(is_plausible_ptr);

    let Some(pointer_offset) = (0..object_item::POINTER_OFFSET_LIMIT)
        .step_by(4)
        .find(|&off| plausible_at(first + off as u64))
    else {
        debug!("  Stride: no pointer in first element, keeping defaults");
        return;
    };

    let base = first + pointer_offset as u64;
    let stride = (object_item::MIN_STRIDE..=object_item::MAX_STRIDE)
        .step_by(4)
        .find(|&stride| plausible_at(base + stride as u64) && plausible_at(base + 2 * stride as u64));

    match stride {
        Some(stride) => {
            info.pointer_offset = pointer_offset;
            info.stride = stride;
        }
        None => debug!("  Stride: no stride fits, keeping defaults"),
    }
}

fn first_element_block<R: ReadMemory + ?Sized>(reader: &R, info: &ObjectArrayInfo) -> Option<u64> {
    let objects = reader.read_ptr(info.address).ok()?;
    if !is_plausible_ptr(objects) {
        return None;
    }
    let first = match info.layout {
        ObjectArrayLayout::Chunked => reader.read_ptr(objects).ok()?,
        ObjectArrayLayout::Flat => objects,
    };
    is_plausible_ptr(first).then_some(first)
}
