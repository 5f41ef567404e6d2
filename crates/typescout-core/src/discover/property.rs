//! Field descriptor layout and the property base record
//!
//! `Guid` is the reference struct: four 32-bit members `A`, `B`, `C`, `D` at
//! offsets 0, 4, 8 and 12, each one element of size 4. Every base property field is
//! the offset at which those four descriptors show exactly that pattern.

use tracing::debug;

use super::agreement::{window, window_after};
use super::meta_kind::{MetaKind, is_property_kind_name};
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::validate::align_up;
use crate::offset::FieldId;
use crate::session::DiscoverySession;

const DESCRIPTOR_CLASS: i32 = 0x08;
const DESCRIPTOR_NEXT_CANDIDATES: [i32; 2] = [0x20, 0x18];
const DESCRIPTOR_NAME_CANDIDATES: [i32; 2] = [0x28, 0x20];
const FIELD_CLASS_NAME_CANDIDATES: [i32; 2] = [0x00, 0x08];
const DESCRIPTOR_OWNER_CANDIDATES: [i32; 2] = [0x10, 0x18];

const GUID_MEMBERS: [&str; 4] = ["A", "B", "C", "D"];

const PROPERTY_START: i32 = 0x30;
const PROPERTY_END: i32 = 0x60;
const FLAGS_START: i32 = 0x38;
const ARRAY_DIM_SPREAD: i32 = 0x10;
const BOOL_WINDOW: i32 = 0x40;

/// Descriptor layout confirmed against `Guid`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DescriptorLayout {
    next: i32,
    name: i32,
    class_name: i32,
    owner: i32,
}

/// Bool payload: field size, byte offset, byte mask, field mask
pub(crate) fn is_bool_payload(bytes: [u8; 4]) -> bool {
    let [field_size, _byte_offset, byte_mask, field_mask] = bytes;
    field_size == 1 && byte_mask != 0 && field_mask != 0
}

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    fn guid_record(&self, field: FieldId) -> Result<u64> {
        self.find_struct("Guid")
            .ok_or_else(|| Error::not_found(field, "Guid struct not found"))
    }

    /// Descriptors `A..D` of `Guid`, in declaration order
    fn guid_members(&self, field: FieldId) -> Result<[u64; 4]> {
        let guid = self.guid_record(field)?;
        let properties = self.properties_of(guid);
        let mut members = [0u64; 4];
        for (slot, wanted) in members.iter_mut().zip(GUID_MEMBERS) {
            *slot = properties
                .iter()
                .copied()
                .find(|&p| self.descriptor_name(p).as_deref() == Some(wanted))
                .ok_or_else(|| Error::not_found(field, format!("Guid member {} missing", wanted)))?;
        }
        Ok(members)
    }

    fn infer_descriptor_layout(&self, guid: u64, head: u64) -> Option<DescriptorLayout> {
        for next in DESCRIPTOR_NEXT_CANDIDATES {
            let chain = self.walk_chain(head, next);
            if chain.len() < GUID_MEMBERS.len() {
                continue;
            }
            let members = &chain[..GUID_MEMBERS.len()];

            for name in DESCRIPTOR_NAME_CANDIDATES.into_iter().filter(|n| *n != next) {
                let named = members
                    .iter()
                    .zip(GUID_MEMBERS)
                    .all(|(&m, wanted)| self.read_name_at(m + name as u64).as_deref() == Some(wanted));
                if !named {
                    continue;
                }
                debug!("  Descriptor next 0x{:X}, name 0x{:X}", next, name);

                let class_name = FIELD_CLASS_NAME_CANDIDATES.into_iter().find(|&cn| {
                    members.iter().all(|&m| {
                        self.ptr_at(m, DESCRIPTOR_CLASS)
                            .and_then(|class| self.read_name_at(class + cn as u64))
                            .is_some_and(|kind| is_property_kind_name(&kind))
                    })
                })?;
                let owner = DESCRIPTOR_OWNER_CANDIDATES
                    .into_iter()
                    .filter(|o| *o != next && *o != name)
                    .find(|&o| members.iter().all(|&m| self.read_u64_at(m, o) == Some(guid)))?;

                return Some(DescriptorLayout {
                    next,
                    name,
                    class_name,
                    owner,
                });
            }
        }
        None
    }

    pub(crate) fn discover_field_descriptors(&mut self) -> Result<()> {
        let head_offset = self
            .table
            .require(FieldId::FieldDescriptorClass, FieldId::StructChildProperties)?;
        if !self.table.field_descriptors {
            return Err(Error::Unavailable {
                stage: "field_descriptor",
                requires: "descriptor chains".to_string(),
            });
        }

        let guid = self.guid_record(FieldId::FieldDescriptorClass)?;
        let head = self.ptr_at(guid, head_offset).ok_or_else(|| {
            Error::not_found(FieldId::FieldDescriptorClass, "Guid has no descriptor chain")
        })?;
        let layout = self.infer_descriptor_layout(guid, head).ok_or_else(|| {
            Error::not_found(FieldId::FieldDescriptorClass, "Guid chain does not read A, B, C, D")
        })?;

        self.table.set(FieldId::FieldDescriptorClass, DESCRIPTOR_CLASS);
        self.table.set(FieldId::FieldDescriptorNext, layout.next);
        self.table.set(FieldId::FieldDescriptorName, layout.name);
        self.table.set(FieldId::FieldClassName, layout.class_name);
        self.table.set(FieldId::FieldDescriptorOwner, layout.owner);
        Ok(())
    }

    /// First offset in `offsets` where the four `Guid` members satisfy `matches`
    fn find_member_pattern<F>(&self, field: FieldId, offsets: impl IntoIterator<Item = i32>, matches: F) -> Result<i32>
    where
        F: Fn(&[u64; 4], i32) -> bool,
    {
        let members = self.guid_members(field)?;
        offsets
            .into_iter()
            .find(|&off| matches(&members, off))
            .ok_or_else(|| Error::not_found(field, "Guid members never match"))
    }

    pub(crate) fn discover_element_size(&mut self) -> Result<()> {
        let field = FieldId::PropertyElementSize;
        let offset = self.find_member_pattern(field, window(PROPERTY_START, PROPERTY_END, 4), |m, off| {
            self.read_i32_at(m[0], off) == Some(4) && self.read_i32_at(m[3], off) == Some(4)
        })?;
        self.table.set(field, offset);
        Ok(())
    }

    pub(crate) fn discover_array_dim(&mut self) -> Result<()> {
        let field = FieldId::PropertyArrayDim;
        let element_size = self.table.require(field, FieldId::PropertyElementSize)?;
        let start = (element_size - ARRAY_DIM_SPREAD).max(PROPERTY_START);
        let offsets = window(start, element_size + ARRAY_DIM_SPREAD, 4).filter(|o| *o != element_size);
        let offset = self.find_member_pattern(field, offsets, |m, off| {
            self.read_i32_at(m[0], off) == Some(1) && self.read_i32_at(m[2], off) == Some(1)
        })?;
        self.table.set(field, offset);
        Ok(())
    }

    pub(crate) fn discover_property_offset(&mut self) -> Result<()> {
        let field = FieldId::PropertyOffset;
        let taken = [
            self.table.get(FieldId::PropertyElementSize),
            self.table.get(FieldId::PropertyArrayDim),
        ];
        let offsets = window(PROPERTY_START, PROPERTY_END, 4).filter(|o| !taken.contains(&Some(*o)));
        let offset = self.find_member_pattern(field, offsets, |m, off| {
            self.read_i32_at(m[0], off) == Some(0)
                && self.read_i32_at(m[1], off) == Some(4)
                && self.read_i32_at(m[2], off) == Some(8)
        })?;
        self.table.set(field, offset);
        Ok(())
    }

    pub(crate) fn discover_property_flags(&mut self) -> Result<()> {
        let field = FieldId::PropertyFlags;
        let taken = [
            self.table.get(FieldId::PropertyElementSize),
            self.table.get(FieldId::PropertyArrayDim),
            self.table.get(FieldId::PropertyOffset),
        ];
        let offsets = window(FLAGS_START, PROPERTY_END, 8).filter(|o| !taken.contains(&Some(*o)));
        let offset = self.find_member_pattern(field, offsets, |m, off| {
            let a = self.read_u64_at(m[0], off);
            a.is_some_and(|v| v != 0) && a == self.read_u64_at(m[3], off)
        })?;
        self.table.set(field, offset);
        Ok(())
    }

    /// First descriptor of `kind` found on class records among the first scanned slots
    pub(crate) fn first_descriptor_of(&self, kind: &MetaKind) -> Option<u64> {
        let objects = self.objects().ok()?;
        objects
            .iter(self.config.samples.property_scan)
            .filter(|s| self.is_class_record(s.address))
            .flat_map(|s| self.properties_of(s.address))
            .find(|&p| self.descriptor_kind(p).is_some_and(|k| MetaKind::parse(&k) == *kind))
    }

    pub(crate) fn discover_bool_base(&mut self) -> Result<()> {
        let field = FieldId::BoolPropertyBase;
        let offset = self.table.require(field, FieldId::PropertyOffset)?;
        let descriptor = self
            .first_descriptor_of(&MetaKind::BoolProperty)
            .ok_or_else(|| Error::not_found(field, "no bool descriptor on any class"))?;

        let start = align_up(offset + 4, 8);
        let found = window_after(start, BOOL_WINDOW, 4)
            .find(|&off| {
                self.reader
                    .read_bytes(descriptor + off as u64, 4)
                    .ok()
                    .and_then(|b| <[u8; 4]>::try_from(b).ok())
                    .is_some_and(is_bool_payload)
            })
            .ok_or_else(|| Error::not_found(field, "no bool payload in window"))?;

        self.table.set(field, found);
        Ok(())
    }
}
