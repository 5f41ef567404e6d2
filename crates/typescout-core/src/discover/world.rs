use tracing::debug;

use crate::anchor::world::resolve_world_pointer;
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::object_flags::CLASS_DEFAULT_OBJECT;
use crate::offset::FieldId;
use crate::session::DiscoverySession;

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    /// First live `World` record; the class default instance is skipped
    pub(crate) fn find_world_record(&self) -> Option<u64> {
        let flags = self.table.get(FieldId::ObjectFlags)?;
        self.objects().ok()?.iter(usize::MAX).map(|s| s.address).find(|&obj| {
            self.is_instance_of(obj, &["World"])
                && self
                    .read_i32_at(obj, flags)
                    .is_some_and(|f| f & CLASS_DEFAULT_OBJECT == 0)
        })
    }

    pub(crate) fn discover_world(&mut self) -> Result<()> {
        self.offset_of(FieldId::ObjectClass, "world")?;
        self.offset_of(FieldId::ObjectName, "world")?;
        self.offset_of(FieldId::ObjectFlags, "world")?;

        let record = self.find_world_record().ok_or(Error::AnchorNotFound("world record"))?;
        debug!("  World record at 0x{:X}", record);

        let section = self.sections.require(&self.config.data_section)?;
        let global = resolve_world_pointer(
            self.reader,
            section,
            record,
            self.config.world_reread_delay(),
        )
        .ok_or(Error::AnchorNotFound("world"))?;

        self.table.world = Some(global);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BASE_FIELDS, Runtime};

    #[test]
    fn test_world_skips_default_instance() {
        let runtime = Runtime::build();
        let session = runtime.session_with(BASE_FIELDS);
        let record = session.find_world_record().unwrap();
        assert_eq!(record, runtime.world_record());
    }

    #[test]
    fn test_world_global() {
        let runtime = Runtime::build();
        let mut session = runtime.session_with(BASE_FIELDS);
        session.discover_world().unwrap();
        assert_eq!(session.table().world, Some(runtime.world_global()));
    }

    #[test]
    fn test_world_needs_flags() {
        let runtime = Runtime::build();
        let mut session = runtime.session_with_anchors();
        session.table.set(FieldId::ObjectClass, 0x10);
        session.table.set(FieldId::ObjectName, 0x18);
        assert!(session.discover_world().unwrap_err().is_skip());
    }
}
