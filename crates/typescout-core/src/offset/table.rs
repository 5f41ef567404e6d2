//! Session-scoped offset table
//!
//! Every discoverable field starts at [`SENTINEL`]. A field is written at most once per
//! session; later writes are refused so a low-confidence fallback can never replace an
//! earlier result.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString, IntoEnumIterator};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::memory::layout::{name_pool, object_item};

/// Value of a field that has not been discovered
pub const SENTINEL: i32 = -1;

/// Symbolic names of every discoverable field offset
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    EnumCount,
)]
pub enum FieldId {
    #[strum(serialize = "object.vtable")]
    ObjectVtable,
    #[strum(serialize = "object.flags")]
    ObjectFlags,
    #[strum(serialize = "object.index")]
    ObjectIndex,
    #[strum(serialize = "object.class")]
    ObjectClass,
    #[strum(serialize = "object.name")]
    ObjectName,
    #[strum(serialize = "object.outer")]
    ObjectOuter,
    #[strum(serialize = "field.next")]
    FieldNext,
    #[strum(serialize = "struct.super")]
    StructSuper,
    #[strum(serialize = "struct.children")]
    StructChildren,
    #[strum(serialize = "struct.child_properties")]
    StructChildProperties,
    #[strum(serialize = "struct.size")]
    StructSize,
    #[strum(serialize = "function.flags")]
    FunctionFlags,
    #[strum(serialize = "function.exec")]
    FunctionExec,
    #[strum(serialize = "class.cast_flags")]
    ClassCastFlags,
    #[strum(serialize = "class.default_object")]
    ClassDefaultObject,
    #[strum(serialize = "enum.names")]
    EnumNames,
    #[strum(serialize = "property.array_dim")]
    PropertyArrayDim,
    #[strum(serialize = "property.element_size")]
    PropertyElementSize,
    #[strum(serialize = "property.flags")]
    PropertyFlags,
    #[strum(serialize = "property.offset")]
    PropertyOffset,
    #[strum(serialize = "byte_property.enum")]
    BytePropertyEnum,
    #[strum(serialize = "bool_property.base")]
    BoolPropertyBase,
    #[strum(serialize = "object_property.class")]
    ObjectPropertyClass,
    #[strum(serialize = "class_property.meta_class")]
    ClassPropertyMetaClass,
    #[strum(serialize = "struct_property.struct")]
    StructPropertyStruct,
    #[strum(serialize = "array_property.inner")]
    ArrayPropertyInner,
    #[strum(serialize = "map_property.base")]
    MapPropertyBase,
    #[strum(serialize = "set_property.element")]
    SetPropertyElement,
    #[strum(serialize = "enum_property.base")]
    EnumPropertyBase,
    #[strum(serialize = "delegate_property.signature")]
    DelegatePropertySignature,
    #[strum(serialize = "field_descriptor.class")]
    FieldDescriptorClass,
    #[strum(serialize = "field_descriptor.owner")]
    FieldDescriptorOwner,
    #[strum(serialize = "field_descriptor.next")]
    FieldDescriptorNext,
    #[strum(serialize = "field_descriptor.name")]
    FieldDescriptorName,
    #[strum(serialize = "field_class.name")]
    FieldClassName,
}

/// Object array encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ObjectArrayLayout {
    /// Chunk-pointer table, fixed elements per chunk
    Chunked,
    /// One contiguous element array
    Flat,
}

/// Interned-string pool encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum NamePoolLayout {
    /// Blocks of variable-length entries with a 2-byte header
    Pooled,
    /// Chunks of pointers to fixed-header entries
    ChunkedArray,
}

/// Width of engine floating point math types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum FloatPrecision {
    #[default]
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectArrayInfo {
    pub address: u64,
    pub layout: ObjectArrayLayout,
    /// Elements per chunk (chunked layout only)
    pub chunk_size: u32,
    /// Bytes per element record
    pub stride: u32,
    /// Offset of the object pointer inside an element record
    pub pointer_offset: u32,
}

impl ObjectArrayInfo {
    pub fn new(address: u64, layout: ObjectArrayLayout) -> Self {
        Self {
            address,
            layout,
            chunk_size: 0x10000,
            stride: object_item::DEFAULT_STRIDE,
            pointer_offset: object_item::DEFAULT_POINTER_OFFSET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePoolInfo {
    pub address: u64,
    pub layout: NamePoolLayout,
    pub block_offset_bits: u32,
    pub entry_stride: u32,
}

impl NamePoolInfo {
    pub fn new(address: u64, layout: NamePoolLayout) -> Self {
        Self {
            address,
            layout,
            block_offset_bits: name_pool::BLOCK_OFFSET_BITS,
            entry_stride: name_pool::ENTRY_STRIDE,
        }
    }
}

/// A routine located by code scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocation {
    /// Virtual table slot, when found through a virtual table
    pub vtable_index: Option<u32>,
    /// Address minus module base
    pub rva: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetTable {
    fields: [i32; FieldId::COUNT],
    pub object_array: Option<ObjectArrayInfo>,
    pub name_pool: Option<NamePoolInfo>,
    /// Address of the global world pointer
    pub world: Option<u64>,
    pub precision: FloatPrecision,
    /// Properties live on a separate field-descriptor chain
    pub field_descriptors: bool,
    pub event_dispatch: Option<CodeLocation>,
    pub string_formatter: Option<CodeLocation>,
}

impl Default for OffsetTable {
    fn default() -> Self {
        Self {
            fields: [SENTINEL; FieldId::COUNT],
            object_array: None,
            name_pool: None,
            world: None,
            precision: FloatPrecision::Single,
            field_descriptors: false,
            event_dispatch: None,
            string_formatter: None,
        }
    }
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value including the sentinel
    pub fn raw(&self, field: FieldId) -> i32 {
        self.fields[field as usize]
    }

    pub fn get(&self, field: FieldId) -> Option<i32> {
        let value = self.raw(field);
        (value != SENTINEL).then_some(value)
    }

    pub fn is_set(&self, field: FieldId) -> bool {
        self.get(field).is_some()
    }

    /// Offset of `prerequisite`, or a `MissingPrerequisite` error blamed on `field`
    pub fn require(&self, field: FieldId, prerequisite: FieldId) -> Result<i32> {
        self.get(prerequisite)
            .ok_or_else(|| Error::requires(field, prerequisite))
    }

    /// Record an offset. Returns `false` if the field was already set or the value is invalid.
    pub fn set(&mut self, field: FieldId, value: i32) -> bool {
        if value < 0 {
            warn!("Refusing negative offset {} for {}", value, field);
            return false;
        }
        let slot = &mut self.fields[field as usize];
        if *slot != SENTINEL {
            if *slot != value {
                debug!(
                    "{} already 0x{:X}, ignoring 0x{:X}",
                    field, *slot, value
                );
            }
            return false;
        }
        *slot = value;
        info!("  {} = 0x{:X}", field, value);
        true
    }

    /// Forget everything, as on re-attach
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldId, i32)> + '_ {
        FieldId::iter().map(|field| (field, self.raw(field)))
    }

    pub fn discovered_count(&self) -> usize {
        self.fields.iter().filter(|v| **v != SENTINEL).count()
    }

    /// Both anchors plus the base record's class and name
    pub fn is_usable(&self) -> bool {
        self.object_array.is_some()
            && self.name_pool.is_some()
            && self.is_set(FieldId::ObjectClass)
            && self.is_set(FieldId::ObjectName)
    }
}
