//! Code routines located through the code-section scanners

use crate::code::{find_event_dispatch, find_string_formatter};
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::validate::is_plausible_ptr;
use crate::offset::FieldId;
use crate::session::DiscoverySession;

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    pub(crate) fn discover_event_dispatch(&mut self) -> Result<()> {
        let flags = self.offset_of(FieldId::FunctionFlags, "event_dispatch")?;
        let vtable_offset = self.offset_of(FieldId::ObjectVtable, "event_dispatch")?;

        let object = self
            .objects()?
            .object_at(0)
            .ok_or(Error::RoutineNotFound("event dispatch"))?;
        let vtable = self
            .read_u64_at(object, vtable_offset)
            .filter(|v| is_plausible_ptr(*v))
            .ok_or(Error::RoutineNotFound("event dispatch"))?;

        let code = self.sections.require(&self.config.code_section)?;
        let location = find_event_dispatch(self.reader, code, self.sections.module_base(), vtable, flags)
            .ok_or(Error::RoutineNotFound("event dispatch"))?;

        self.table.event_dispatch = Some(location);
        Ok(())
    }

    pub(crate) fn discover_string_formatter(&mut self) -> Result<()> {
        let location = find_string_formatter(&self.sections, &self.config.code_section)
            .ok_or(Error::RoutineNotFound("string formatter"))?;
        self.table.string_formatter = Some(location);
        Ok(())
    }
}
