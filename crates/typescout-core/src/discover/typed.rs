//! Typed property payload pointers
//!
//! Property kinds extend the base property record with pointers: the class an
//! object property refers to, the inner descriptor of an array, and so on. Each is
//! found right after the base footprint by checking that the pointer leads to a
//! record of the right shape.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::agreement::{first_agreeing, window_after};
use super::meta_kind::{MetaKind, is_property_kind_name};
use super::strategy::FallbackChain;
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::offset::FieldId;
use crate::session::DiscoverySession;

/// Footprint used when neither the bool payload nor the offset field is known
const DEFAULT_FOOTPRINT: i32 = 0x78;
/// Distance from the offset field to the end of the base property record
const OFFSET_TO_FOOTPRINT: i32 = 0x2C;
const TYPED_WINDOW: i32 = 0x20;
const SAMPLES_PER_KIND: usize = 32;

/// What a typed pointer must lead to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Class record with a resolvable name
    ClassRecord,
    /// Class or struct record with a resolvable name
    StructLike,
    /// Another field descriptor
    Descriptor,
    /// Two consecutive field descriptors
    DescriptorPair,
    EnumRecord,
    FunctionRecord,
}

struct TypedField {
    field: FieldId,
    target: Target,
    /// Most descriptors of the kind leave the pointer null; one hit is enough
    optional: bool,
}

/// Discovery order; later entries fall back on earlier results
const TYPED_FIELDS: [TypedField; 9] = [
    TypedField { field: FieldId::ObjectPropertyClass, target: Target::ClassRecord, optional: false },
    TypedField { field: FieldId::StructPropertyStruct, target: Target::StructLike, optional: false },
    TypedField { field: FieldId::ClassPropertyMetaClass, target: Target::ClassRecord, optional: false },
    TypedField { field: FieldId::ArrayPropertyInner, target: Target::Descriptor, optional: false },
    TypedField { field: FieldId::SetPropertyElement, target: Target::Descriptor, optional: false },
    TypedField { field: FieldId::MapPropertyBase, target: Target::DescriptorPair, optional: false },
    TypedField { field: FieldId::EnumPropertyBase, target: Target::Descriptor, optional: false },
    TypedField { field: FieldId::BytePropertyEnum, target: Target::EnumRecord, optional: true },
    TypedField { field: FieldId::DelegatePropertySignature, target: Target::FunctionRecord, optional: true },
];

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    /// Size of the base property record, where typed payloads begin
    pub(crate) fn property_footprint(&self) -> i32 {
        self.table
            .get(FieldId::BoolPropertyBase)
            .or_else(|| self.table.get(FieldId::PropertyOffset).map(|o| o + OFFSET_TO_FOOTPRINT))
            .unwrap_or(DEFAULT_FOOTPRINT)
    }

    /// Descriptors on class records grouped by the typed field their kind carries
    fn typed_samples(&self) -> HashMap<FieldId, Vec<u64>> {
        let mut grouped: HashMap<FieldId, Vec<u64>> = HashMap::new();
        let Ok(objects) = self.objects() else {
            return grouped;
        };
        for class in objects
            .iter(self.config.samples.property_scan)
            .filter(|s| self.is_class_record(s.address))
        {
            for descriptor in self.properties_of(class.address) {
                let Some(kind) = self.descriptor_kind(descriptor) else {
                    continue;
                };
                let Some(field) = MetaKind::parse(&kind).typed_target() else {
                    continue;
                };
                let bucket = grouped.entry(field).or_default();
                if bucket.len() < SAMPLES_PER_KIND {
                    bucket.push(descriptor);
                }
            }
        }
        grouped
    }

    fn is_descriptor(&self, address: u64) -> bool {
        self.descriptor_kind(address)
            .is_some_and(|kind| is_property_kind_name(&kind))
    }

    fn points_at(&self, descriptor: u64, off: i32, target: Target) -> bool {
        let Some(ptr) = self.ptr_at(descriptor, off) else {
            return false;
        };
        match target {
            Target::ClassRecord => self.is_class_record(ptr) && self.name_of(ptr).is_some(),
            Target::StructLike => {
                (self.is_class_record(ptr)
                    || self.is_instance_of(ptr, &["ScriptStruct", "Struct", "Class"]))
                    && self.name_of(ptr).is_some()
            }
            Target::Descriptor => self.is_descriptor(ptr),
            Target::DescriptorPair => {
                self.is_descriptor(ptr) && self.ptr_at(descriptor, off + 8).is_some_and(|p| self.is_descriptor(p))
            }
            Target::EnumRecord => self.is_instance_of(ptr, &["Enum", "UserDefinedEnum"]),
            Target::FunctionRecord => self.is_instance_of(ptr, &["Function"]),
        }
    }

    fn search_typed(&self, typed: &TypedField, samples: &[u64], footprint: i32) -> Option<i32> {
        if samples.is_empty() {
            debug!("  {}: no descriptors of this kind", typed.field);
            return None;
        }
        // a class property's own object class pointer also leads to a class record
        let exclude = match typed.field {
            FieldId::ClassPropertyMetaClass => self.table.get(FieldId::ObjectPropertyClass),
            _ => None,
        };
        let offsets = window_after(footprint, TYPED_WINDOW, 8).filter(move |o| Some(*o) != exclude);

        if typed.optional {
            return offsets
                .into_iter()
                .find(|&off| samples.iter().any(|&d| self.points_at(d, off, typed.target)));
        }
        first_agreeing(offsets, samples, self.config.thresholds.typed_pointer, |&d, off| {
            self.points_at(d, off, typed.target)
        })
        .map(|a| {
            debug!("  {}: 0x{:X} agreed {}/{}", typed.field, a.offset, a.hits, a.total);
            a.offset
        })
    }

    fn typed_chain<'c>(
        &self,
        typed: &'c TypedField,
        samples: &'c [u64],
        footprint: i32,
    ) -> FallbackChain<'c, Self> {
        let search = move |s: &Self| s.search_typed(typed, samples, footprint);
        let chain = FallbackChain::new(typed.field);
        match typed.field {
            FieldId::StructPropertyStruct => chain
                .then("object class offset", |s: &Self| s.table.get(FieldId::ObjectPropertyClass))
                .then("search", search),
            FieldId::ClassPropertyMetaClass => chain.then("search", search).then("after object class", |s: &Self| {
                s.table.get(FieldId::ObjectPropertyClass).map(|o| o + 8)
            }),
            FieldId::SetPropertyElement => chain
                .then("search", search)
                .then("array inner", |s: &Self| s.table.get(FieldId::ArrayPropertyInner)),
            FieldId::EnumPropertyBase => chain
                .then("search", search)
                .then("struct pointer", |s: &Self| s.table.get(FieldId::StructPropertyStruct)),
            FieldId::BytePropertyEnum | FieldId::DelegatePropertySignature => chain
                .then("search", search)
                .then("base footprint", move |_: &Self| Some(footprint)),
            _ => chain.then("search", search),
        }
    }

    pub(crate) fn discover_typed_pointers(&mut self) -> Result<()> {
        self.table.require(FieldId::ObjectPropertyClass, FieldId::ObjectClass)?;
        self.table.require(FieldId::ObjectPropertyClass, FieldId::ObjectName)?;

        let footprint = self.property_footprint();
        let samples = self.typed_samples();
        if samples.is_empty() {
            return Err(Error::not_found(
                FieldId::ObjectPropertyClass,
                "no typed descriptors on any class",
            ));
        }
        debug!("  Typed payloads start at 0x{:X}", footprint);

        let mut found = 0;
        for typed in &TYPED_FIELDS {
            let kind_samples = samples.get(&typed.field).map(Vec::as_slice).unwrap_or(&[]);
            let chain = self.typed_chain(typed, kind_samples, footprint);
            match chain.evaluate(self) {
                Some(resolved) => {
                    self.table.set(typed.field, resolved.offset);
                    found += 1;
                }
                None => warn!("{} not found", typed.field),
            }
        }

        if found == 0 {
            return Err(Error::not_found(
                FieldId::ObjectPropertyClass,
                "no typed pointer matched",
            ));
        }
        Ok(())
    }
}
