//! Base record layout: declared type, self index, flags, name, outer, vtable
//!
//! Every record in the object array shares this header, so the first few hundred
//! live records are sampled and each candidate offset is scored by agreement.

use tracing::debug;

use super::agreement::{Threshold, first_agreeing};
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::{flat_objects, name};
use crate::memory::validate::{is_null_or_ptr, is_plausible_ptr};
use crate::objects::{Sample, SampleSet};
use crate::offset::FieldId;
use crate::session::DiscoverySession;

const CLASS_CANDIDATES: [i32; 3] = [0x10, 0x18, 0x08];
const INDEX_CANDIDATES: [i32; 3] = [0x0C, 0x08, 0x04];
const FLAGS_CANDIDATES: [i32; 3] = [0x08, 0x04, 0x0C];
const NAME_CANDIDATES: [i32; 4] = [0x18, 0x20, 0x10, 0x28];
const OUTER_CANDIDATES: [i32; 4] = [0x20, 0x28, 0x30, 0x18];

/// Offset whose value equals the record's slot index.
///
/// When the record in slot 5 was sampled it acts as a pinned witness: candidates it
/// disagrees with are dropped before scoring, and if no remaining candidate reaches
/// agreement the first one the witness holds is taken.
pub(crate) fn find_index_offset<R: ReadMemory + ?Sized>(
    reader: &R,
    samples: &[Sample],
    threshold: Threshold,
) -> Option<i32> {
    let self_index = |s: &Sample, off: i32| {
        reader
            .read_i32(s.address + off as u64)
            .is_ok_and(|v| v as i64 == s.index as i64)
    };

    let witness = samples
        .iter()
        .find(|s| s.index as u64 == flat_objects::WITNESS_INDEX);
    let candidates: Vec<i32> = INDEX_CANDIDATES
        .into_iter()
        .filter(|&off| witness.is_none_or(|w| self_index(w, off)))
        .collect();

    if let Some(a) = first_agreeing(candidates.iter().copied(), samples, threshold, self_index) {
        debug!("  Self index at 0x{:X}: {}/{}", a.offset, a.hits, a.total);
        return Some(a.offset);
    }

    let offset = witness.and(candidates.first().copied())?;
    debug!("  Self index at 0x{:X}: witness only", offset);
    Some(offset)
}

/// First candidate where some record holds a small non-zero flag word
pub(crate) fn find_flags_offset<R: ReadMemory + ?Sized>(
    reader: &R,
    samples: &[Sample],
    candidates: impl IntoIterator<Item = i32>,
) -> Option<i32> {
    candidates.into_iter().find(|&off| {
        samples.iter().any(|s| {
            reader
                .read_u32(s.address + off as u64)
                .is_ok_and(|v| v != 0 && v >> 16 == 0)
        })
    })
}

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    fn base_samples(&self, field: FieldId) -> Result<SampleSet> {
        let limits = &self.config.samples;
        self.objects()?
            .sample(limits.base_records, usize::MAX, |_| true)
            .require(field, limits.base_minimum)
    }

    pub(crate) fn discover_object_class(&mut self) -> Result<()> {
        let samples = self.base_samples(FieldId::ObjectClass)?;
        let found = first_agreeing(
            CLASS_CANDIDATES,
            samples.as_slice(),
            self.config.thresholds.object_class,
            |s, off| self.ptr_at(s.address, off).is_some(),
        )
        .ok_or_else(|| Error::not_found(FieldId::ObjectClass, "no candidate holds pointers"))?;

        debug!("  Class pointer agreement {}/{}", found.hits, found.total);
        self.table.set(FieldId::ObjectClass, found.offset);
        Ok(())
    }

    pub(crate) fn discover_object_index(&mut self) -> Result<()> {
        let samples = self.base_samples(FieldId::ObjectIndex)?;
        let window = samples.truncated(self.config.samples.index_window);
        let offset = find_index_offset(self.reader, window, self.config.thresholds.object_index)
            .ok_or_else(|| Error::not_found(FieldId::ObjectIndex, "no self-index agreement"))?;
        self.table.set(FieldId::ObjectIndex, offset);
        Ok(())
    }

    pub(crate) fn discover_object_flags(&mut self) -> Result<()> {
        let samples = self.base_samples(FieldId::ObjectFlags)?;
        let taken = [
            self.table.get(FieldId::ObjectClass),
            self.table.get(FieldId::ObjectIndex),
        ];
        let candidates = FLAGS_CANDIDATES
            .into_iter()
            .filter(|off| !taken.contains(&Some(*off)));
        let offset = find_flags_offset(self.reader, samples.as_slice(), candidates)
            .ok_or_else(|| Error::not_found(FieldId::ObjectFlags, "no flag word seen"))?;
        self.table.set(FieldId::ObjectFlags, offset);
        Ok(())
    }

    pub(crate) fn discover_object_name(&mut self) -> Result<()> {
        let class = self.table.require(FieldId::ObjectName, FieldId::ObjectClass)?;
        let samples = self.base_samples(FieldId::ObjectName)?;
        let window = samples.truncated(self.config.samples.name_window);

        let candidates = NAME_CANDIDATES.into_iter().filter(|off| *off != class);
        let found = first_agreeing(
            candidates,
            window,
            self.config.thresholds.object_name,
            |s, off| {
                self.read_i32_at(s.address, off)
                    .is_some_and(|v| v > 0 && v < name::MAX_COMPARISON_INDEX)
            },
        )
        .ok_or_else(|| Error::not_found(FieldId::ObjectName, "no name index agreement"))?;

        self.table.set(FieldId::ObjectName, found.offset);
        Ok(())
    }

    pub(crate) fn discover_object_outer(&mut self) -> Result<()> {
        let class = self.table.require(FieldId::ObjectOuter, FieldId::ObjectClass)?;
        let name = self.table.require(FieldId::ObjectOuter, FieldId::ObjectName)?;
        let samples = self.base_samples(FieldId::ObjectOuter)?;

        let candidates = OUTER_CANDIDATES
            .into_iter()
            .filter(|off| *off != class && *off != name);
        let found = first_agreeing(
            candidates,
            samples.as_slice(),
            self.config.thresholds.object_outer,
            |s, off| {
                self.read_u64_at(s.address, off)
                    .is_some_and(is_null_or_ptr)
            },
        )
        .ok_or_else(|| Error::not_found(FieldId::ObjectOuter, "no optional link agreement"))?;

        self.table.set(FieldId::ObjectOuter, found.offset);
        Ok(())
    }

    pub(crate) fn discover_object_vtable(&mut self) -> Result<()> {
        self.table.require(FieldId::ObjectVtable, FieldId::ObjectClass)?;
        self.table.require(FieldId::ObjectVtable, FieldId::ObjectName)?;
        let first = self
            .objects()?
            .iter(1)
            .next()
            .ok_or_else(|| Error::not_found(FieldId::ObjectVtable, "object array is empty"))?;
        if !self.reader.read_ptr(first.address).is_ok_and(is_plausible_ptr) {
            return Err(Error::not_found(
                FieldId::ObjectVtable,
                "first record has no table pointer",
            ));
        }
        self.table.set(FieldId::ObjectVtable, 0);
        Ok(())
    }

    pub(crate) fn discover_field_next(&mut self) -> Result<()> {
        let outer = self.table.require(FieldId::FieldNext, FieldId::ObjectOuter)?;
        self.table.set(FieldId::FieldNext, outer + 8);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SnapshotMemory;
    use crate::objects::ObjectArray;
    use crate::offset::{ObjectArrayInfo, ObjectArrayLayout};
    use crate::testing::Runtime;

    const HEADER: u64 = 0x1_4000_3000;
    const ITEMS: u64 = 0x2_0000_0000;
    const RECORDS: u64 = 0x3_0000_0000;

    /// Six flat entries; each record holds its index at +0x0C and noise at +4 and +8.
    fn self_index_table(witness_value: i32) -> (SnapshotMemory, ObjectArrayInfo) {
        let mut memory = SnapshotMemory::new(0, 0);
        let mut header = vec![0u8; 0x10];
        header[0..8].copy_from_slice(&ITEMS.to_le_bytes());
        header[8..12].copy_from_slice(&6i32.to_le_bytes());
        header[12..16].copy_from_slice(&6i32.to_le_bytes());
        memory.map(HEADER, header);

        let mut items = vec![0u8; 6 * 0x18];
        for i in 0..6usize {
            let record = RECORDS + i as u64 * 0x40;
            items[i * 0x18..i * 0x18 + 8].copy_from_slice(&record.to_le_bytes());

            let mut bytes = vec![0u8; 0x40];
            bytes[4..8].copy_from_slice(&(0x7700 + i as i32).to_le_bytes());
            bytes[8..12].copy_from_slice(&(0x1234_0000u32 >> i).to_le_bytes());
            let index = if i == 5 { witness_value } else { i as i32 };
            bytes[12..16].copy_from_slice(&index.to_le_bytes());
            memory.map(record, bytes);
        }
        memory.map(ITEMS, items);
        (memory, ObjectArrayInfo::new(HEADER, ObjectArrayLayout::Flat))
    }

    #[test]
    fn test_self_index_found_at_twelve() {
        let (memory, info) = self_index_table(5);
        let samples: Vec<_> = ObjectArray::new(&memory, info).iter(usize::MAX).collect();
        assert_eq!(samples.len(), 6);
        assert_eq!(
            find_index_offset(&memory, &samples, Threshold::percent(50)),
            Some(12)
        );
    }

    #[test]
    fn test_self_index_rejected_by_witness() {
        // the other five still agree at +0x0C, but the pinned witness does not
        let (memory, info) = self_index_table(4);
        let samples: Vec<_> = ObjectArray::new(&memory, info).iter(usize::MAX).collect();
        assert_eq!(find_index_offset(&memory, &samples, Threshold::percent(50)), None);
    }

    /// Clobber the self index of every record but the witness
    fn witness_only(memory: &SnapshotMemory) {
        for i in 0..5u64 {
            memory
                .write_bytes(RECORDS + i * 0x40 + 0x0C, &0x55i32.to_le_bytes())
                .unwrap();
        }
    }

    fn six_sample_session(
        memory: &SnapshotMemory,
        info: ObjectArrayInfo,
    ) -> DiscoverySession<'_, SnapshotMemory> {
        let mut session = crate::testing::bare_session(memory, info);
        session.config.samples.base_minimum = 6;
        session
    }

    #[test]
    fn test_index_stage_on_six_entries() {
        let (memory, info) = self_index_table(5);
        let mut session = six_sample_session(&memory, info);
        session.discover_object_index().unwrap();
        assert_eq!(session.table().get(FieldId::ObjectIndex), Some(12));
    }

    #[test]
    fn test_index_stage_wrong_witness_not_found() {
        let (memory, info) = self_index_table(4);
        let mut session = six_sample_session(&memory, info);
        let err = session.discover_object_index().unwrap_err();
        assert!(matches!(err, Error::FieldNotFound { field: FieldId::ObjectIndex, .. }));
        assert!(!session.table().is_set(FieldId::ObjectIndex));
    }

    #[test]
    fn test_index_stage_witness_alone_decides() {
        let (memory, info) = self_index_table(5);
        witness_only(&memory);
        let mut session = six_sample_session(&memory, info);
        session.discover_object_index().unwrap();
        assert_eq!(session.table().get(FieldId::ObjectIndex), Some(12));
    }

    #[test]
    fn test_index_stage_default_minimum() {
        let (memory, info) = self_index_table(5);
        let mut session = crate::testing::bare_session(&memory, info);
        let err = session.discover_object_index().unwrap_err();
        assert!(matches!(err, Error::TooFewSamples { found: 6, required: 10, .. }));
    }

    #[test]
    fn test_flags_need_small_nonzero_word() {
        let (memory, info) = self_index_table(5);
        let samples: Vec<_> = ObjectArray::new(&memory, info).iter(usize::MAX).collect();
        // +8 holds large values, +4 small ones
        assert_eq!(find_flags_offset(&memory, &samples, [0x08, 0x04]), Some(0x04));
        assert_eq!(find_flags_offset(&memory, &samples, [0x08]), None);
    }

    #[test]
    fn test_base_record_stages() {
        let runtime = Runtime::build();
        let mut session = runtime.session_with_anchors();

        session.discover_object_class().unwrap();
        session.discover_object_index().unwrap();
        session.discover_object_flags().unwrap();
        session.discover_object_name().unwrap();
        session.discover_object_outer().unwrap();
        session.discover_object_vtable().unwrap();
        session.discover_field_next().unwrap();

        let table = session.table();
        assert_eq!(table.get(FieldId::ObjectClass), Some(0x10));
        assert_eq!(table.get(FieldId::ObjectIndex), Some(0x0C));
        assert_eq!(table.get(FieldId::ObjectFlags), Some(0x08));
        assert_eq!(table.get(FieldId::ObjectName), Some(0x18));
        assert_eq!(table.get(FieldId::ObjectOuter), Some(0x20));
        assert_eq!(table.get(FieldId::ObjectVtable), Some(0));
        assert_eq!(table.get(FieldId::FieldNext), Some(0x28));
        assert!(table.is_usable());
    }

    #[test]
    fn test_dependents_report_missing_prerequisite() {
        let runtime = Runtime::build();
        let mut session = runtime.session_with_anchors();

        let err = session.discover_object_name().unwrap_err();
        assert!(matches!(err, Error::MissingPrerequisite { field: FieldId::ObjectName, .. }));
        let err = session.discover_field_next().unwrap_err();
        assert!(err.is_skip());
        assert_eq!(session.table().discovered_count(), 0);
    }

    #[test]
    fn test_too_few_samples_leaves_table_untouched() {
        let (memory, info) = self_index_table(5);
        let mut session = crate::testing::bare_session(&memory, info);
        let err = session.discover_object_class().unwrap_err();
        assert!(matches!(err, Error::TooFewSamples { found: 6, required: 10, .. }));
        assert_eq!(session.table().discovered_count(), 0);
    }
}
