//! Read access to the global object array

use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::{chunked_objects, flat_objects};
use crate::memory::validate::is_plausible_ptr;
use crate::offset::{FieldId, ObjectArrayInfo, ObjectArrayLayout};

/// Index → record address view over a located object array
pub struct ObjectArray<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    info: ObjectArrayInfo,
}

impl<'a, R: ReadMemory + ?Sized> ObjectArray<'a, R> {
    pub fn new(reader: &'a R, info: ObjectArrayInfo) -> Self {
        Self { reader, info }
    }

    pub fn info(&self) -> &ObjectArrayInfo {
        &self.info
    }

    /// Number of used slots as reported by the array header
    pub fn count(&self) -> usize {
        let field = match self.info.layout {
            ObjectArrayLayout::Chunked => chunked_objects::NUM_ELEMENTS,
            ObjectArrayLayout::Flat => flat_objects::NUM_ELEMENTS,
        };
        self.reader
            .read_i32(self.info.address + field as u64)
            .map(|n| n.max(0) as usize)
            .unwrap_or(0)
    }

    /// Record address stored in slot `index`, if plausible
    pub fn object_at(&self, index: usize) -> Option<u64> {
        let item = self.item_address(index)?;
        let object = self.reader.read_ptr(item).ok()?;
        is_plausible_ptr(object).then_some(object)
    }

    fn item_address(&self, index: usize) -> Option<u64> {
        let index = index as u64;
        let stride = self.info.stride as u64;
        let pointer_offset = self.info.pointer_offset as u64;
        let objects = self.reader.read_ptr(self.info.address).ok()?;
        if !is_plausible_ptr(objects) {
            return None;
        }

        let base = match self.info.layout {
            ObjectArrayLayout::Chunked => {
                let per_chunk = self.info.chunk_size.max(1) as u64;
                let chunk = self.reader.read_ptr(objects + (index / per_chunk) * 8).ok()?;
                if !is_plausible_ptr(chunk) {
                    return None;
                }
                chunk + (index % per_chunk) * stride
            }
            ObjectArrayLayout::Flat => objects + index * stride,
        };
        Some(base + pointer_offset)
    }

    /// Live records in slot order, at most `limit` of them
    pub fn iter(&self, limit: usize) -> impl Iterator<Item = Sample> + '_ {
        (0..self.count().min(limit)).filter_map(|index| {
            self.object_at(index)
                .map(|address| Sample { index, address })
        })
    }

    /// Gather up to `want` records among the first `scan` slots that pass `filter`
    pub fn sample<F>(&self, want: usize, scan: usize, mut filter: F) -> SampleSet
    where
        F: FnMut(u64) -> bool,
    {
        let entries = self
            .iter(scan)
            .filter(|s| filter(s.address))
            .take(want)
            .collect();
        SampleSet { entries }
    }
}

/// One live record and the slot it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub index: usize,
    pub address: u64,
}

/// Ephemeral set of live instances gathered for one discoverer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleSet {
    entries: Vec<Sample>,
}

impl SampleSet {
    pub fn from_samples(entries: Vec<Sample>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.entries
    }

    pub fn addresses(&self) -> Vec<u64> {
        self.entries.iter().map(|s| s.address).collect()
    }

    /// Fail with `TooFewSamples` when fewer than `minimum` were gathered
    pub fn require(self, field: FieldId, minimum: usize) -> Result<Self> {
        if self.entries.len() < minimum {
            return Err(Error::TooFewSamples {
                field,
                found: self.entries.len(),
                required: minimum,
            });
        }
        Ok(self)
    }

    pub fn truncated(&self, len: usize) -> &[Sample] {
        &self.entries[..len.min(self.entries.len())]
    }
}
