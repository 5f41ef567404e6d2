//! Class-only fields past the struct layout

use tracing::debug;

use super::agreement::{Threshold, first_agreeing, window_after};
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::validate::align_up;
use crate::objects::SampleSet;
use crate::offset::FieldId;
use crate::session::DiscoverySession;

const CAST_FLAGS_WINDOW: i32 = 0x40;
const DEFAULT_OBJECT_WINDOW: i32 = 0x40;

/// Cast flags are sparse: some classes legitimately carry none, so a column of
/// all non-zero values is more likely a pointer than a flag set.
pub(crate) fn accepts_cast_flags(values: &[u64], threshold: Threshold) -> bool {
    let nonzero = values.iter().filter(|&&v| v != 0).count();
    nonzero < values.len() && threshold.accepts(nonzero, values.len())
}

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    fn class_samples(&self, field: FieldId) -> Result<SampleSet> {
        let limits = &self.config.samples;
        self.objects()?
            .sample(limits.class_records, limits.class_scan, |a| self.is_class_record(a))
            .require(field, limits.class_minimum)
    }

    pub(crate) fn discover_cast_flags(&mut self) -> Result<()> {
        let size = self.table.require(FieldId::ClassCastFlags, FieldId::StructSize)?;
        let samples = self.class_samples(FieldId::ClassCastFlags)?;

        let threshold = self.config.thresholds.cast_flags_nonzero;
        let off = window_after(align_up(size + 4, 8), CAST_FLAGS_WINDOW, 8)
            .find(|&off| {
                let values: Vec<u64> = samples
                    .iter()
                    .map(|s| self.read_u64_at(s.address, off).unwrap_or(0))
                    .collect();
                accepts_cast_flags(&values, threshold)
            })
            .ok_or_else(|| Error::not_found(FieldId::ClassCastFlags, "no sparse flag column"))?;

        self.table.set(FieldId::ClassCastFlags, off);
        Ok(())
    }

    pub(crate) fn discover_default_object(&mut self) -> Result<()> {
        let cast = self
            .table
            .require(FieldId::ClassDefaultObject, FieldId::ClassCastFlags)?;
        let samples = self.class_samples(FieldId::ClassDefaultObject)?;

        // the default instance is declared as the class that owns it
        let found = first_agreeing(
            window_after(cast + 8, DEFAULT_OBJECT_WINDOW, 8),
            samples.as_slice(),
            self.config.thresholds.default_object,
            |s, off| {
                self.ptr_at(s.address, off)
                    .is_some_and(|cdo| self.class_of(cdo) == Some(s.address))
            },
        )
        .ok_or_else(|| Error::not_found(FieldId::ClassDefaultObject, "no round-trip pointer"))?;

        debug!("  Default object agreement {}/{}", found.hits, found.total);
        self.table.set(FieldId::ClassDefaultObject, found.offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BASE_FIELDS, Runtime, STRUCT_FIELDS};

    #[test]
    fn test_cast_flags_need_a_zero() {
        let bar = Threshold::percent(40);
        assert!(!accepts_cast_flags(&[1, 2, 3, 4], bar));
        assert!(accepts_cast_flags(&[1, 2, 0, 4], bar));
        // 2 of 5 is exactly 40%
        assert!(!accepts_cast_flags(&[1, 2, 0, 0, 0], bar));
        assert!(!accepts_cast_flags(&[], bar));
    }

    #[test]
    fn test_class_stages() {
        let runtime = Runtime::build();
        let mut session = runtime.session_with(&[BASE_FIELDS, STRUCT_FIELDS].concat());

        session.discover_cast_flags().unwrap();
        session.discover_default_object().unwrap();

        assert_eq!(session.table().get(FieldId::ClassCastFlags), Some(0x70));
        assert_eq!(session.table().get(FieldId::ClassDefaultObject), Some(0x80));
    }

    #[test]
    fn test_default_object_needs_cast_flags() {
        let runtime = Runtime::build();
        let mut session = runtime.session_with(&[BASE_FIELDS, STRUCT_FIELDS].concat());
        let err = session.discover_default_object().unwrap_err();
        assert!(matches!(
            err,
            Error::MissingPrerequisite { field: FieldId::ClassDefaultObject, .. }
        ));
    }
}
