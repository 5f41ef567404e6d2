//! World pointer locator
//!
//! The world record is known from the object array; the global that points at it is
//! found by scanning a data section for 8-byte aligned references.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::memory::{ByteView, ReadMemory};
use crate::sections::SectionSnapshot;

/// Every 8-byte aligned address in `section` holding `target`
pub fn scan_references(section: &SectionSnapshot, target: u64) -> Vec<u64> {
    (0..section.size().saturating_sub(7))
        .step_by(8)
        .filter(|&off| section.u64_at(off) == Some(target))
        .map(|off| section.address_of(off))
        .collect()
}

/// Pick the global holding `world`.
///
/// One hit is taken as is. With two, the first is re-read after `delay`: a global
/// that still points at the world is stable and wins, otherwise the second does.
/// More than two takes the first and warns.
pub fn resolve_world_pointer<R: ReadMemory + ?Sized>(
    reader: &R,
    section: &SectionSnapshot,
    world: u64,
    delay: Duration,
) -> Option<u64> {
    let hits = scan_references(section, world);
    debug!("  World 0x{:X} referenced {} time(s)", world, hits.len());

    let chosen = match hits.as_slice() {
        [] => return None,
        [only] => *only,
        [first, second] => {
            thread::sleep(delay);
            match reader.read_ptr(*first) {
                Ok(value) if value == world => *first,
                _ => {
                    debug!("  0x{:X} changed after re-read, using 0x{:X}", first, second);
                    *second
                }
            }
        }
        [first, rest @ ..] => {
            warn!(
                "World 0x{:X} referenced from {} globals, using first 0x{:X}",
                world,
                rest.len() + 1,
                first
            );
            *first
        }
    };
    info!("  World pointer: 0x{:X}", chosen);
    Some(chosen)
}
