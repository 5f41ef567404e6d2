//! Float precision detection
//!
//! Builds store transforms either as single or double floats. A live scene component's
//! rotation quaternion is close to unit length only when read at the right width, so
//! following world → level → actors → root component to one is enough to tell.

use std::ops::RangeInclusive;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::array;
use crate::memory::validate::{is_plausible_ptr, is_unit_quat};
use crate::offset::FloatPrecision;
use crate::session::DiscoverySession;

const LEVEL_OFFSETS: RangeInclusive<u64> = 0x28..=0x100;
const ACTORS_OFFSETS: RangeInclusive<u64> = 0x80..=0x120;
const ROOT_COMPONENT_OFFSETS: RangeInclusive<u64> = 0x130..=0x180;
const TRANSFORM_OFFSETS: RangeInclusive<u64> = 0x100..=0x200;
const MAX_ACTOR_COUNT: i32 = 100_000;
const ACTORS_CHECKED: usize = 10;

fn ptr<R: ReadMemory + ?Sized>(reader: &R, address: u64) -> Option<u64> {
    reader.read_ptr(address).ok().filter(|p| is_plausible_ptr(*p))
}

fn quat_f64<R: ReadMemory + ?Sized>(reader: &R, address: u64) -> Option<[f64; 4]> {
    let mut q = [0.0; 4];
    for (i, c) in q.iter_mut().enumerate() {
        *c = reader.read_f64(address + i as u64 * 8).ok()?;
    }
    Some(q)
}

fn quat_f32<R: ReadMemory + ?Sized>(reader: &R, address: u64) -> Option<[f64; 4]> {
    let mut q = [0.0; 4];
    for (i, c) in q.iter_mut().enumerate() {
        *c = reader.read_f32(address + i as u64 * 4).ok()? as f64;
    }
    Some(q)
}

/// Precision of the first unit quaternion near a root component's transform
fn component_precision<R: ReadMemory + ?Sized>(reader: &R, component: u64) -> Option<FloatPrecision> {
    TRANSFORM_OFFSETS.step_by(0x10).find_map(|off| {
        let at = component + off;
        if quat_f64(reader, at).is_some_and(is_unit_quat) {
            debug!("  Double quaternion at component+0x{:X}", off);
            Some(FloatPrecision::Double)
        } else if quat_f32(reader, at).is_some_and(is_unit_quat) {
            debug!("  Single quaternion at component+0x{:X}", off);
            Some(FloatPrecision::Single)
        } else {
            None
        }
    })
}

fn actor_precision<R: ReadMemory + ?Sized>(reader: &R, actor: u64) -> Option<FloatPrecision> {
    ROOT_COMPONENT_OFFSETS
        .step_by(8)
        .filter_map(|off| ptr(reader, actor + off))
        .find_map(|component| component_precision(reader, component))
}

fn level_precision<R: ReadMemory + ?Sized>(reader: &R, level: u64) -> Option<FloatPrecision> {
    ACTORS_OFFSETS.step_by(8).find_map(|off| {
        let data = ptr(reader, level + off + array::DATA)?;
        let count = reader.read_i32(level + off + array::COUNT).ok()?;
        if count <= 0 || count > MAX_ACTOR_COUNT {
            return None;
        }
        (0..count as u64)
            .take(ACTORS_CHECKED)
            .filter_map(|i| ptr(reader, data + i * 8))
            .find_map(|actor| actor_precision(reader, actor))
    })
}

/// Walk from the world record to a component transform and report its width.
pub fn detect_precision<R: ReadMemory + ?Sized>(reader: &R, world_record: u64) -> Option<FloatPrecision> {
    LEVEL_OFFSETS
        .step_by(8)
        .filter_map(|off| ptr(reader, world_record + off))
        .find_map(|level| level_precision(reader, level))
}

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    pub(crate) fn discover_precision(&mut self) -> Result<()> {
        let global = self.table.world.ok_or_else(|| Error::Unavailable {
            stage: "precision",
            requires: "world".to_string(),
        })?;

        let detected = ptr(self.reader, global).and_then(|world| detect_precision(self.reader, world));
        match detected {
            Some(precision) => {
                info!("  Float precision: {:?}", precision);
                self.table.precision = precision;
            }
            None => {
                warn!("No component transform found. Falling back to single precision");
                self.table.precision = FloatPrecision::Single;
            }
        }
        Ok(())
    }
}
