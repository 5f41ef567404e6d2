//! Struct and enum records
//!
//! The inheritance chain `Class -> Struct -> Field` is fixed by the runtime, so the
//! super link is the offset at which one meta-record stores the address of the next.
//! Children, child properties and size follow from there using well-known structs
//! whose layout never changes (`Vector`, `Color`, `Guid`).

use tracing::{debug, warn};

use super::agreement::{first_agreeing, window, window_after};
use super::strategy::FallbackChain;
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::array;
use crate::memory::validate::{is_null_or_ptr, is_plausible_ptr};
use crate::offset::FieldId;
use crate::session::DiscoverySession;

const SUPER_SEARCH_END: i32 = 0x80;
const CHILDREN_WINDOW: i32 = 0x18;
const SIZE_WINDOW: i32 = 0x20;
const COLOR_SIZE: i32 = 4;
const GUID_SIZE: i32 = 16;

const ENUM_NAMES_START: i32 = 0x30;
const ENUM_NAMES_END: i32 = 0xA0;
const ENUM_MAX_COUNT: i32 = 256;
const ENUM_MAX_CAPACITY: i32 = 1024;
const ENUM_RECORDS: usize = 10;

/// The three meta-records the super link is derived from
struct MetaRecords {
    class: u64,
    structure: u64,
    field: Option<u64>,
}

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    /// Offset in `[start, end]` (step 8) at which `object` stores `target`
    fn find_pointer_offset(&self, object: u64, target: u64, start: i32, end: i32) -> Option<i32> {
        window(start, end, 8).find(|&off| self.read_u64_at(object, off) == Some(target))
    }

    fn meta_records(&self) -> Option<MetaRecords> {
        let found = self.find_objects(&[
            ("Class", "Class"),
            ("Struct", "Class"),
            ("struct", "Class"),
            ("Field", "Class"),
        ]);
        Some(MetaRecords {
            class: found[0]?,
            structure: found[1].or(found[2])?,
            field: found[3],
        })
    }

    pub(crate) fn discover_struct_super(&mut self) -> Result<()> {
        let outer = self.table.require(FieldId::StructSuper, FieldId::ObjectOuter)?;
        self.table.require(FieldId::StructSuper, FieldId::ObjectName)?;
        let meta = self
            .meta_records()
            .ok_or_else(|| Error::not_found(FieldId::StructSuper, "Class/Struct records missing"))?;

        let start = outer + 8;
        let chain = FallbackChain::<Self>::new(FieldId::StructSuper)
            .then("class stores struct", |s: &Self| {
                s.find_pointer_offset(meta.class, meta.structure, start, SUPER_SEARCH_END)
            })
            .then_if(
                "struct stores field",
                |_: &Self| meta.field.is_some(),
                |s: &Self| {
                    let field = meta.field?;
                    s.find_pointer_offset(meta.structure, field, start, SUPER_SEARCH_END)
                },
            );
        let resolved = chain
            .evaluate(self)
            .ok_or_else(|| Error::not_found(FieldId::StructSuper, "no inheritance link found"))?;

        if let Some(field) = meta.field {
            let linked = self.read_u64_at(meta.structure, resolved.offset);
            if linked != Some(field) {
                warn!(
                    "struct.super 0x{:X}: Struct's super is 0x{:X}, expected Field at 0x{:X}",
                    resolved.offset,
                    linked.unwrap_or(0),
                    field
                );
            }
        }

        self.table.set(FieldId::StructSuper, resolved.offset);
        Ok(())
    }

    pub(crate) fn discover_struct_children(&mut self) -> Result<()> {
        let sup = self.table.require(FieldId::StructChildren, FieldId::StructSuper)?;
        let limits = &self.config.samples;
        let samples = self
            .objects()?
            .sample(limits.children_records, limits.class_scan, |a| self.is_class_record(a))
            .require(FieldId::StructChildren, limits.children_minimum)?;

        let found = first_agreeing(
            window(sup + 8, sup + 8 + CHILDREN_WINDOW, 8),
            samples.as_slice(),
            self.config.thresholds.struct_children,
            |s, off| self.read_u64_at(s.address, off).is_some_and(is_null_or_ptr),
        )
        .ok_or_else(|| Error::not_found(FieldId::StructChildren, "no child link agreement"))?;

        debug!("  Children agreement {}/{}", found.hits, found.total);
        self.table.set(FieldId::StructChildren, found.offset);
        Ok(())
    }

    /// Child properties sit right after children when the build keeps properties on
    /// a separate descriptor chain. `Vector` always has properties, so a pointer there
    /// confirms the mode.
    pub(crate) fn discover_child_properties(&mut self) -> Result<()> {
        let children = self
            .table
            .require(FieldId::StructChildProperties, FieldId::StructChildren)?;
        let candidate = children + 8;

        let vector = self.find_struct("Vector").ok_or_else(|| {
            Error::not_found(FieldId::StructChildProperties, "Vector struct not found")
        })?;
        if self.ptr_at(vector, candidate).is_none() {
            debug!("  Vector has no descriptor chain at 0x{:X}, properties are fields", candidate);
            self.table.field_descriptors = false;
            return Err(Error::not_found(
                FieldId::StructChildProperties,
                "no descriptor chain; properties live on the children chain",
            ));
        }

        self.table.field_descriptors = true;
        self.table.set(FieldId::StructChildProperties, candidate);
        Ok(())
    }

    pub(crate) fn discover_struct_size(&mut self) -> Result<()> {
        let start = match (
            self.table.get(FieldId::StructChildProperties),
            self.table.get(FieldId::StructChildren),
            self.table.get(FieldId::StructSuper),
        ) {
            (Some(props), _, _) => props + 8,
            (None, Some(children), _) => children + 8,
            (None, None, Some(sup)) => sup + 0x18,
            (None, None, None) => {
                return Err(Error::requires(FieldId::StructSize, FieldId::StructSuper));
            }
        };

        let found = self.find_objects(&[
            ("Color", "ScriptStruct"),
            ("Color", "Struct"),
            ("Guid", "ScriptStruct"),
            ("Guid", "Struct"),
        ]);
        let color = found[0].or(found[1]);
        let guid = found[2].or(found[3]);
        if color.is_none() && guid.is_none() {
            return Err(Error::not_found(FieldId::StructSize, "Color and Guid not found"));
        }

        let size_is = |record: Option<u64>, off: i32, expected: i32| {
            record.is_some_and(|r| self.read_i32_at(r, off) == Some(expected))
        };
        let both = window_after(start, SIZE_WINDOW, 4)
            .find(|&off| size_is(color, off, COLOR_SIZE) && size_is(guid, off, GUID_SIZE));
        let single = window_after(start, SIZE_WINDOW, 4)
            .find(|&off| size_is(color, off, COLOR_SIZE) || size_is(guid, off, GUID_SIZE));

        let off = match (both, single) {
            (Some(off), _) => off,
            (None, Some(off)) => {
                warn!(
                    "struct.size: Color and Guid never agree. Falling back to single witness (0x{:X})",
                    off
                );
                off
            }
            (None, None) => {
                return Err(Error::not_found(FieldId::StructSize, "no size field matched"));
            }
        };
        self.table.set(FieldId::StructSize, off);
        Ok(())
    }

    fn is_name_array(&self, record: u64, off: i32) -> bool {
        let base = record + off as u64;
        let Ok(data) = self.reader.read_ptr(base + array::DATA) else {
            return false;
        };
        let (Ok(count), Ok(max)) = (
            self.reader.read_i32(base + array::COUNT),
            self.reader.read_i32(base + array::MAX),
        ) else {
            return false;
        };
        is_plausible_ptr(data)
            && count > 0
            && count <= ENUM_MAX_COUNT
            && count <= max
            && max <= ENUM_MAX_CAPACITY
            && self.read_name_at(data).is_some()
    }

    pub(crate) fn discover_enum_names(&mut self) -> Result<()> {
        self.table.require(FieldId::EnumNames, FieldId::ObjectClass)?;
        self.table.require(FieldId::EnumNames, FieldId::ObjectName)?;

        let samples = self
            .objects()?
            .sample(ENUM_RECORDS, usize::MAX, |a| {
                self.is_instance_of(a, &["Enum", "UserDefinedEnum"])
            })
            .require(FieldId::EnumNames, 1)?;

        let found = first_agreeing(
            window(ENUM_NAMES_START, ENUM_NAMES_END, 8),
            samples.as_slice(),
            self.config.thresholds.typed_pointer,
            |s, off| self.is_name_array(s.address, off),
        )
        .ok_or_else(|| Error::not_found(FieldId::EnumNames, "no name array agreement"))?;

        self.table.set(FieldId::EnumNames, found.offset);
        Ok(())
    }
}
