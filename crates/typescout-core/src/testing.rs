//! Synthetic runtime image for unit tests
//!
//! Builds a small reflection graph in a [`SnapshotMemory`]: three module sections, a
//! chunked object array, a pooled name table, class, struct, function and enum
//! records, field descriptors, a world with one scene component, and the code bytes
//! the routine scanners look for. Record layouts follow the `*_FIELDS` tables.

use std::collections::HashMap;

use crate::config::DiscoveryConfig;
use crate::memory::layout::function_flags::{DISPATCH_CHECK_NATIVE, DISPATCH_CHECK_NET, NATIVE, PUBLIC};
use crate::memory::layout::object_flags::CLASS_DEFAULT_OBJECT;
use crate::memory::{ByteView, ReadMemory, SnapshotMemory};
use crate::names::encode_pooled_entry;
use crate::offset::{FieldId, FloatPrecision, ObjectArrayInfo, OffsetTable};
use crate::sections::{SectionCache, SectionSnapshot};
use crate::session::DiscoverySession;

pub(crate) const MODULE_BASE: u64 = 0x1_4000_0000;
const MODULE_SIZE: u64 = 0x10000;
const TEXT: u64 = MODULE_BASE + 0x1000;
const TEXT_SIZE: usize = 0x4000;
const RDATA: u64 = MODULE_BASE + 0x6000;
const RDATA_SIZE: usize = 0x200;
const DATA: u64 = MODULE_BASE + 0x8000;
const DATA_SIZE: usize = 0x1000;

const OBJECTS_HEADER: u64 = DATA + 0x100;
const NAMES_HEADER: u64 = DATA + 0x300;
const WORLD_GLOBAL: u64 = DATA + 0x400;

const NAME_BLOCK: u64 = 0x2_0000_0000;
const CHUNK_TABLE: u64 = 0x2_1000_0000;
const ITEMS: u64 = 0x2_2000_0000;
const VTABLE: u64 = 0x2_3000_0000;
const RECORDS: u64 = 0x3_0000_0000;
const BLOBS: u64 = 0x3_8000_0000;
const DESCRIPTORS: u64 = 0x4_0000_0000;
const FIELD_CLASSES: u64 = 0x4_8000_0000;

const RECORD_SIZE: u64 = 0x200;
const BLOB_SIZE: u64 = 0x100;
const DESCRIPTOR_SIZE: u64 = 0x100;
const FIELD_CLASS_SIZE: u64 = 0x40;
const ITEM_STRIDE: u64 = 0x18;
const ARRAY_SLOTS: u32 = 3000;
const ARRAY_MAX: u32 = 0x80000;
const ARRAY_MAX_CHUNKS: u32 = 8;

const DISPATCH_ROUTINE: u64 = TEXT + 0x800;
const FORMAT_TEMPLATE: u64 = RDATA + 0x40;
const FORMATTER: u64 = TEXT + 0x3000;

const DESCRIPTOR_FLAGS: u64 = 0x0018_0010_0000_0005;

/// Record layout of the image
mod at {
    pub const FLAGS: u64 = 0x08;
    pub const INDEX: u64 = 0x0C;
    pub const CLASS: u64 = 0x10;
    pub const NAME: u64 = 0x18;
    pub const OUTER: u64 = 0x20;
    pub const NEXT: u64 = 0x28;
    pub const SUPER: u64 = 0x40;
    pub const CHILDREN: u64 = 0x48;
    pub const CHILD_PROPERTIES: u64 = 0x50;
    pub const SIZE: u64 = 0x58;
    pub const CAST_FLAGS: u64 = 0x70;
    pub const DEFAULT_OBJECT: u64 = 0x80;
    pub const ENUM_NAMES: u64 = 0x40;
    pub const FUNCTION_FLAGS: u64 = 0xB0;
    pub const FUNCTION_EXEC: u64 = 0xB8;

    pub const DESCRIPTOR_CLASS: u64 = 0x08;
    pub const DESCRIPTOR_OWNER: u64 = 0x10;
    pub const DESCRIPTOR_NEXT: u64 = 0x20;
    pub const DESCRIPTOR_NAME: u64 = 0x28;
    pub const ARRAY_DIM: u64 = 0x30;
    pub const ELEMENT_SIZE: u64 = 0x34;
    pub const PROPERTY_FLAGS: u64 = 0x38;
    pub const PROPERTY_OFFSET: u64 = 0x44;
    pub const PAYLOAD: u64 = 0x78;

    pub const WORLD_LEVEL: u64 = 0x30;
    pub const LEVEL_ACTORS: u64 = 0x98;
    pub const ROOT_COMPONENT: u64 = 0x130;
    pub const TRANSFORM: u64 = 0x1C0;
}

pub(crate) const BASE_FIELDS: &[(FieldId, i32)] = &[
    (FieldId::ObjectVtable, 0x00),
    (FieldId::ObjectFlags, 0x08),
    (FieldId::ObjectIndex, 0x0C),
    (FieldId::ObjectClass, 0x10),
    (FieldId::ObjectName, 0x18),
    (FieldId::ObjectOuter, 0x20),
    (FieldId::FieldNext, 0x28),
];

pub(crate) const STRUCT_FIELDS: &[(FieldId, i32)] = &[
    (FieldId::StructSuper, 0x40),
    (FieldId::StructChildren, 0x48),
    (FieldId::StructChildProperties, 0x50),
    (FieldId::StructSize, 0x58),
    (FieldId::EnumNames, 0x40),
];

pub(crate) const DESCRIPTOR_FIELDS: &[(FieldId, i32)] = &[
    (FieldId::FieldDescriptorClass, 0x08),
    (FieldId::FieldDescriptorOwner, 0x10),
    (FieldId::FieldDescriptorNext, 0x20),
    (FieldId::FieldDescriptorName, 0x28),
    (FieldId::FieldClassName, 0x00),
];

pub(crate) const PROPERTY_FIELDS: &[(FieldId, i32)] = &[
    (FieldId::PropertyArrayDim, 0x30),
    (FieldId::PropertyElementSize, 0x34),
    (FieldId::PropertyFlags, 0x38),
    (FieldId::PropertyOffset, 0x44),
    (FieldId::BoolPropertyBase, 0x78),
];

pub(crate) const TYPED_FIELDS: &[(FieldId, i32)] = &[
    (FieldId::ObjectPropertyClass, 0x78),
    (FieldId::StructPropertyStruct, 0x78),
    (FieldId::ClassPropertyMetaClass, 0x80),
    (FieldId::ArrayPropertyInner, 0x78),
    (FieldId::SetPropertyElement, 0x78),
    (FieldId::MapPropertyBase, 0x78),
    (FieldId::EnumPropertyBase, 0x78),
    (FieldId::BytePropertyEnum, 0x78),
    (FieldId::DelegatePropertySignature, 0x78),
];

pub(crate) const CODE_FIELDS: &[(FieldId, i32)] = &[
    (FieldId::FunctionFlags, 0xB0),
    (FieldId::FunctionExec, 0xB8),
    (FieldId::ClassCastFlags, 0x70),
    (FieldId::ClassDefaultObject, 0x80),
];

/// Class records in slot order with their super class
const CLASSES: [(&str, Option<&str>); 16] = [
    ("Class", Some("Struct")),
    ("Object", None),
    ("Field", Some("Object")),
    ("Struct", Some("Field")),
    ("ScriptStruct", Some("Struct")),
    ("Function", Some("Struct")),
    ("Enum", Some("Field")),
    ("Package", Some("Object")),
    ("World", Some("Object")),
    ("Level", Some("Object")),
    ("Actor", Some("Object")),
    ("SceneComponent", Some("Object")),
    ("Pawn", Some("Actor")),
    ("Character", Some("Pawn")),
    ("PlayerController", Some("Actor")),
    ("GameMode", Some("Actor")),
];

/// Classes without cast flags
const UNCAST: [&str; 4] = ["Object", "Package", "Enum", "Level"];

/// Classes owning a default instance; `World`'s sits ahead of the live world
const WITH_DEFAULT_OBJECT: [&str; 11] = [
    "Object",
    "Package",
    "World",
    "Level",
    "Actor",
    "SceneComponent",
    "Pawn",
    "Character",
    "PlayerController",
    "GameMode",
    "ScriptStruct",
];

/// Name and native bit of the functions declared on `Actor`
const ACTOR_FUNCTIONS: [(&str, bool); 6] = [
    ("K2_DestroyActor", true),
    ("GetActorLocation", true),
    ("SetActorHiddenInGame", true),
    ("ReceiveBeginPlay", false),
    ("ReceiveTick", false),
    ("ReceiveDestroyed", false),
];

struct Builder {
    memory: SnapshotMemory,
    names: Vec<u8>,
    interned: HashMap<String, i32>,
    objects: Vec<u64>,
    blobs: u64,
    descriptors: u64,
    field_classes: HashMap<&'static str, u64>,
}

impl Builder {
    fn new() -> Self {
        let mut builder = Self {
            memory: SnapshotMemory::new(MODULE_BASE, MODULE_SIZE),
            names: Vec::new(),
            interned: HashMap::new(),
            objects: Vec::new(),
            blobs: 0,
            descriptors: 0,
            field_classes: HashMap::new(),
        };
        builder.intern("None");
        builder
    }

    fn put(&self, address: u64, bytes: &[u8]) {
        self.memory.write_bytes(address, bytes).unwrap();
    }

    fn put_u64(&self, address: u64, value: u64) {
        self.put(address, &value.to_le_bytes());
    }

    fn put_i32(&self, address: u64, value: i32) {
        self.put(address, &value.to_le_bytes());
    }

    fn put_u32(&self, address: u64, value: u32) {
        self.put(address, &value.to_le_bytes());
    }

    fn intern(&mut self, text: &str) -> i32 {
        if let Some(&index) = self.interned.get(text) {
            return index;
        }
        let index = (self.names.len() / 2) as i32;
        self.names.extend(encode_pooled_entry(text, false));
        if self.names.len() % 2 == 1 {
            self.names.push(0);
        }
        self.interned.insert(text.to_string(), index);
        index
    }

    fn put_name(&mut self, address: u64, text: &str) {
        let index = self.intern(text);
        self.put_i32(address, index);
        self.put_i32(address + 4, 0);
    }

    /// Record in the next object array slot; `class: None` declares it as its own type
    fn object(&mut self, class: Option<u64>, name: &str, outer: u64, flags: i32) -> u64 {
        let slot = self.objects.len();
        let address = RECORDS + slot as u64 * RECORD_SIZE;
        self.memory.map_zeroed(address, RECORD_SIZE as usize);
        self.objects.push(address);

        self.put_u64(address, VTABLE);
        self.put_i32(address + at::FLAGS, flags);
        self.put_i32(address + at::INDEX, slot as i32);
        self.put_u64(address + at::CLASS, class.unwrap_or(address));
        self.put_name(address + at::NAME, name);
        self.put_u64(address + at::OUTER, outer);
        address
    }

    /// Zeroed scratch memory outside the object array
    fn blob(&mut self) -> u64 {
        let address = BLOBS + self.blobs * BLOB_SIZE;
        self.blobs += 1;
        self.memory.map_zeroed(address, BLOB_SIZE as usize);
        address
    }

    fn field_class(&mut self, kind: &'static str) -> u64 {
        if let Some(&address) = self.field_classes.get(kind) {
            return address;
        }
        let address = FIELD_CLASSES + self.field_classes.len() as u64 * FIELD_CLASS_SIZE;
        self.memory.map_zeroed(address, FIELD_CLASS_SIZE as usize);
        self.put_name(address, kind);
        self.field_classes.insert(kind, address);
        address
    }

    fn descriptor(
        &mut self,
        kind: &'static str,
        name: &str,
        owner: u64,
        offset: i32,
        element_size: i32,
    ) -> u64 {
        let address = DESCRIPTORS + self.descriptors * DESCRIPTOR_SIZE;
        self.descriptors += 1;
        self.memory.map_zeroed(address, DESCRIPTOR_SIZE as usize);

        let class = self.field_class(kind);
        self.put_u64(address + at::DESCRIPTOR_CLASS, class);
        self.put_u64(address + at::DESCRIPTOR_OWNER, owner);
        self.put_name(address + at::DESCRIPTOR_NAME, name);
        self.put_i32(address + at::ARRAY_DIM, 1);
        self.put_i32(address + at::ELEMENT_SIZE, element_size);
        self.put_u64(address + at::PROPERTY_FLAGS, DESCRIPTOR_FLAGS);
        self.put_i32(address + at::PROPERTY_OFFSET, offset);
        address
    }

    /// Link `links` from `head` through `next`
    fn chain(&self, head: u64, next: u64, links: &[u64]) {
        if let Some(&first) = links.first() {
            self.put_u64(head, first);
        }
        for pair in links.windows(2) {
            self.put_u64(pair[0] + next, pair[1]);
        }
    }

    fn script_struct(&mut self, meta: u64, package: u64, name: &str, size: i32, members: &[(&'static str, &str, i32)]) -> u64 {
        let record = self.object(Some(meta), name, package, 1);
        self.put_i32(record + at::SIZE, size);
        let mut descriptors = Vec::new();
        let mut offset = 0;
        for &(kind, member, member_size) in members {
            descriptors.push(self.descriptor(kind, member, record, offset, member_size));
            offset += member_size;
        }
        self.chain(record + at::CHILD_PROPERTIES, at::DESCRIPTOR_NEXT, &descriptors);
        record
    }

    fn module_sections(&mut self, world: u64) -> Vec<SectionSnapshot> {
        let mut text = vec![0xCCu8; TEXT_SIZE];
        // native check ahead of the net check, both against the flags displacement
        flag_test(&mut text, 0x820, at::FUNCTION_FLAGS as u32, DISPATCH_CHECK_NATIVE);
        flag_test(&mut text, 0xB00, at::FUNCTION_FLAGS as u32, DISPATCH_CHECK_NET);
        // template load, template arguments, then the call into the formatter
        let lea = 0x2000;
        text[lea..lea + 3].copy_from_slice(&[0x48, 0x8D, 0x15]);
        text[lea + 3..lea + 7].copy_from_slice(&rel32(TEXT + lea as u64 + 7, FORMAT_TEMPLATE));
        let args = 0x2010;
        text[args..args + 7].copy_from_slice(&[0x48, 0x8D, 0x4C, 0x24, 0x49, 0x8B, 0xD0]);
        let call = args + 7;
        text[call] = 0xE8;
        text[call + 1..call + 5].copy_from_slice(&rel32(TEXT + call as u64 + 5, FORMATTER));

        let mut rdata = vec![0u8; RDATA_SIZE];
        let template = b"ForwardShadingQuality_";
        let start = (FORMAT_TEMPLATE - RDATA) as usize;
        rdata[start..start + template.len()].copy_from_slice(template);

        let mut data = vec![0u8; DATA_SIZE];
        let header = (OBJECTS_HEADER - DATA) as usize;
        data[header..header + 8].copy_from_slice(&CHUNK_TABLE.to_le_bytes());
        data[header + 0x10..header + 0x14].copy_from_slice(&ARRAY_MAX.to_le_bytes());
        data[header + 0x14..header + 0x18].copy_from_slice(&ARRAY_SLOTS.to_le_bytes());
        data[header + 0x18..header + 0x1C].copy_from_slice(&ARRAY_MAX_CHUNKS.to_le_bytes());
        data[header + 0x1C..header + 0x20].copy_from_slice(&1u32.to_le_bytes());

        let pool = (NAMES_HEADER - DATA) as usize;
        data[pool + 0x0C..pool + 0x10].copy_from_slice(&(self.names.len() as u32).to_le_bytes());
        data[pool + 0x10..pool + 0x18].copy_from_slice(&NAME_BLOCK.to_le_bytes());

        let global = (WORLD_GLOBAL - DATA) as usize;
        data[global..global + 8].copy_from_slice(&world.to_le_bytes());

        let sections = vec![
            SectionSnapshot::new(".text", TEXT, text),
            SectionSnapshot::new(".rdata", RDATA, rdata),
            SectionSnapshot::new(".data", DATA, data),
        ];
        for section in &sections {
            self.memory.map(section.address, section.bytes().to_vec());
        }
        sections
    }

    fn object_array(&mut self) {
        let mut chunks = vec![0u8; ARRAY_MAX_CHUNKS as usize * 8];
        chunks[..8].copy_from_slice(&ITEMS.to_le_bytes());
        self.memory.map(CHUNK_TABLE, chunks);

        let mut items = vec![0u8; ARRAY_SLOTS as usize * ITEM_STRIDE as usize];
        for (slot, &object) in self.objects.iter().enumerate() {
            let at = slot * ITEM_STRIDE as usize;
            items[at..at + 8].copy_from_slice(&object.to_le_bytes());
        }
        self.memory.map(ITEMS, items);

        let mut block = self.names.clone();
        block.resize(block.len().max(0x1000), 0);
        self.memory.map(NAME_BLOCK, block);

        let mut vtable = vec![0u8; 0x18];
        vtable[..8].copy_from_slice(&(TEXT + 0x100).to_le_bytes());
        vtable[8..16].copy_from_slice(&DISPATCH_ROUTINE.to_le_bytes());
        self.memory.map(VTABLE, vtable);
    }
}

fn flag_test(text: &mut [u8], at: usize, displacement: u32, mask: u32) {
    text[at..at + 2].copy_from_slice(&[0xF7, 0x81]);
    text[at + 2..at + 6].copy_from_slice(&displacement.to_le_bytes());
    text[at + 6..at + 10].copy_from_slice(&mask.to_le_bytes());
}

fn rel32(next_instruction: u64, target: u64) -> [u8; 4] {
    ((target as i64 - next_instruction as i64) as i32).to_le_bytes()
}

/// A populated image plus the addresses tests look up
pub(crate) struct Runtime {
    memory: SnapshotMemory,
    sections: Vec<SectionSnapshot>,
    classes: HashMap<&'static str, u64>,
    structs: HashMap<&'static str, u64>,
    actor_properties: Vec<(&'static str, u64)>,
    int_property: u64,
    world: u64,
}

impl Runtime {
    pub(crate) fn build() -> Self {
        let mut b = Builder::new();

        let mut classes = HashMap::new();
        let meta = b.object(None, "Class", 0, 1);
        classes.insert("Class", meta);
        for (name, _) in &CLASSES[1..] {
            classes.insert(*name, b.object(Some(meta), name, 0, 1));
        }
        let package = b.object(Some(classes["Package"]), "/Script/CoreUObject", 0, 1);

        for (i, (name, sup)) in CLASSES.iter().enumerate() {
            let class = classes[name];
            b.put_u64(class + at::OUTER, package);
            if let Some(sup) = sup {
                b.put_u64(class + at::SUPER, classes[sup]);
            }
            b.put_i32(class + at::SIZE, 0x30 + i as i32 * 8);
            if !UNCAST.contains(name) {
                b.put_u64(class + at::CAST_FLAGS, 1 << i);
            }
        }
        for name in WITH_DEFAULT_OBJECT {
            let class = classes[name];
            let cdo = b.object(Some(class), &format!("Default__{name}"), package, CLASS_DEFAULT_OBJECT);
            b.put_u64(class + at::DEFAULT_OBJECT, cdo);
        }

        let script_struct = classes["ScriptStruct"];
        let mut structs = HashMap::new();
        let vector = b.script_struct(
            script_struct,
            package,
            "Vector",
            24,
            &[("DoubleProperty", "X", 8), ("DoubleProperty", "Y", 8), ("DoubleProperty", "Z", 8)],
        );
        structs.insert("Vector", vector);
        structs.insert(
            "Color",
            b.script_struct(
                script_struct,
                package,
                "Color",
                4,
                &[
                    ("ByteProperty", "B", 1),
                    ("ByteProperty", "G", 1),
                    ("ByteProperty", "R", 1),
                    ("ByteProperty", "A", 1),
                ],
            ),
        );
        structs.insert(
            "Guid",
            b.script_struct(
                script_struct,
                package,
                "Guid",
                16,
                &[
                    ("IntProperty", "A", 4),
                    ("IntProperty", "B", 4),
                    ("IntProperty", "C", 4),
                    ("IntProperty", "D", 4),
                ],
            ),
        );

        let actor = classes["Actor"];
        let mut functions = Vec::new();
        for (i, (name, native)) in ACTOR_FUNCTIONS.iter().enumerate() {
            let function = b.object(Some(classes["Function"]), name, actor, 1);
            let mut flags = PUBLIC | 1;
            if *native {
                flags |= NATIVE;
                b.put_u64(function + at::FUNCTION_EXEC, TEXT + 0x1000 + i as u64 * 0x40);
            }
            b.put_u32(function + at::FUNCTION_FLAGS, flags);
            functions.push(function);
        }
        b.chain(actor + at::CHILDREN, at::NEXT, &functions);

        let net_role = b.object(Some(classes["Enum"]), "ENetRole", package, 1);
        let entries = b.blob();
        for (i, name) in ["ROLE_None", "ROLE_SimulatedProxy", "ROLE_Authority"].iter().enumerate() {
            let entry = entries + i as u64 * 0x10;
            b.put_name(entry, name);
            b.put_u64(entry + 8, i as u64);
        }
        b.put_u64(net_role + at::ENUM_NAMES, entries);
        b.put_i32(net_role + at::ENUM_NAMES + 8, 3);
        b.put_i32(net_role + at::ENUM_NAMES + 0xC, 4);

        let actor_properties = actor_properties(&mut b, &classes, vector, net_role, functions[0]);
        let descriptors: Vec<u64> = actor_properties.iter().map(|&(_, d)| d).collect();
        b.chain(actor + at::CHILD_PROPERTIES, at::DESCRIPTOR_NEXT, &descriptors);

        let world = b.object(Some(classes["World"]), "Untitled", package, 1);
        let level = b.object(Some(classes["Level"]), "PersistentLevel", world, 1);
        b.put_u64(world + at::WORLD_LEVEL, level);
        let character = b.object(Some(classes["Character"]), "Character_0", level, 1);
        let controller = b.object(Some(classes["PlayerController"]), "PlayerController_0", level, 1);
        let component = b.object(Some(classes["SceneComponent"]), "CollisionCylinder", character, 1);
        b.put_u64(character + at::ROOT_COMPONENT, component);
        let rotation: Vec<u8> = [0.0f64, 0.0, 0.7071, 0.7071]
            .iter()
            .flat_map(|c| c.to_le_bytes())
            .collect();
        b.put(component + at::TRANSFORM, &rotation);

        let actors = b.blob();
        b.put_u64(actors, character);
        b.put_u64(actors + 8, controller);
        b.put_u64(level + at::LEVEL_ACTORS, actors);
        b.put_i32(level + at::LEVEL_ACTORS + 8, 2);
        b.put_i32(level + at::LEVEL_ACTORS + 0xC, 2);

        b.object_array();
        let sections = b.module_sections(world);
        let int_property = b.field_class("IntProperty");

        Self {
            memory: b.memory,
            sections,
            classes,
            structs,
            actor_properties,
            int_property,
            world,
        }
    }

    pub(crate) fn session(&self) -> DiscoverySession<'_, SnapshotMemory> {
        let sections = SectionCache::new(MODULE_BASE, MODULE_SIZE, self.sections.clone());
        let config = DiscoveryConfig::builder().world_reread_delay_ms(0).build();
        DiscoverySession::new(&self.memory, sections, config)
    }

    pub(crate) fn session_with_anchors(&self) -> DiscoverySession<'_, SnapshotMemory> {
        let mut session = self.session();
        session.locate_anchors().unwrap();
        session
    }

    /// Anchors located and `fields` set; descriptor mode stays off
    pub(crate) fn session_with(&self, fields: &[(FieldId, i32)]) -> DiscoverySession<'_, SnapshotMemory> {
        let mut session = self.session_with_anchors();
        for &(field, offset) in fields {
            session.table.set(field, offset);
        }
        session
    }

    /// Everything up to and including the descriptor layout
    pub(crate) fn session_through_descriptors(&self) -> DiscoverySession<'_, SnapshotMemory> {
        let mut session = self.session_with(&[BASE_FIELDS, STRUCT_FIELDS, DESCRIPTOR_FIELDS].concat());
        session.table.field_descriptors = true;
        session
    }

    /// Everything up to and including the property base record
    pub(crate) fn session_through_property_base(&self) -> DiscoverySession<'_, SnapshotMemory> {
        let mut session = self.session_through_descriptors();
        for &(field, offset) in PROPERTY_FIELDS {
            session.table.set(field, offset);
        }
        session
    }

    pub(crate) fn class(&self, name: &str) -> u64 {
        self.classes[name]
    }

    pub(crate) fn struct_record(&self, name: &str) -> u64 {
        self.structs[name]
    }

    pub(crate) fn world_record(&self) -> u64 {
        self.world
    }

    pub(crate) fn world_global(&self) -> u64 {
        WORLD_GLOBAL
    }

    pub(crate) fn write_u64(&self, address: u64, value: u64) {
        self.memory.write_bytes(address, &value.to_le_bytes()).unwrap();
    }

    pub(crate) fn write_i32(&self, address: u64, value: i32) {
        self.memory.write_bytes(address, &value.to_le_bytes()).unwrap();
    }

    /// Re-declare `Actor`'s descriptors of the given kinds as plain `IntProperty`
    pub(crate) fn hide_descriptors(&self, kinds: &[&str]) {
        for &(kind, descriptor) in &self.actor_properties {
            if kinds.contains(&kind) {
                self.write_u64(descriptor + at::DESCRIPTOR_CLASS, self.int_property);
            }
        }
    }
}

/// One descriptor of each typed kind on `Actor`, with its payload filled in
fn actor_properties(
    b: &mut Builder,
    classes: &HashMap<&'static str, u64>,
    vector: u64,
    net_role: u64,
    signature: u64,
) -> Vec<(&'static str, u64)> {
    let actor = classes["Actor"];
    let mut properties = Vec::new();
    let mut offset = 0x228;
    let mut declare = |b: &mut Builder, kind: &'static str, name: &str, size: i32| {
        let descriptor = b.descriptor(kind, name, actor, offset, size);
        offset += size.max(8);
        properties.push((kind, descriptor));
        descriptor
    };

    let hidden = declare(b, "BoolProperty", "bHidden", 1);
    b.put(hidden + at::PAYLOAD, &[1, 0, 1, 0xFF]);

    let owner = declare(b, "ObjectProperty", "Owner", 8);
    b.put_u64(owner + at::PAYLOAD, actor);

    let location = declare(b, "StructProperty", "RootLocation", 24);
    b.put_u64(location + at::PAYLOAD, vector);

    let controller_class = declare(b, "ClassProperty", "ControllerClass", 8);
    b.put_u64(controller_class + at::PAYLOAD, classes["Class"]);
    b.put_u64(controller_class + at::PAYLOAD + 8, classes["PlayerController"]);

    let tags = declare(b, "ArrayProperty", "Tags", 16);
    let inner = b.descriptor("NameProperty", "Tags", tags, 0, 8);
    b.put_u64(tags + at::PAYLOAD, inner);

    let tag_set = declare(b, "SetProperty", "TagSet", 0x50);
    let element = b.descriptor("NameProperty", "TagSet", tag_set, 0, 8);
    b.put_u64(tag_set + at::PAYLOAD, element);

    let tag_map = declare(b, "MapProperty", "TagMap", 0x50);
    let key = b.descriptor("NameProperty", "TagMap_Key", tag_map, 0, 8);
    let value = b.descriptor("IntProperty", "TagMap", tag_map, 0, 4);
    b.put_u64(tag_map + at::PAYLOAD, key);
    b.put_u64(tag_map + at::PAYLOAD + 8, value);

    let role = declare(b, "EnumProperty", "Role", 1);
    let underlying = b.descriptor("ByteProperty", "UnderlyingType", role, 0, 1);
    b.put_u64(role + at::PAYLOAD, underlying);
    b.put_u64(role + at::PAYLOAD + 8, net_role);

    let net_mode = declare(b, "ByteProperty", "RemoteRole", 1);
    b.put_u64(net_mode + at::PAYLOAD, net_role);

    let on_destroyed = declare(b, "DelegateProperty", "OnDestroyed", 16);
    b.put_u64(on_destroyed + at::PAYLOAD, signature);

    properties
}

/// Session over arbitrary memory with only the object array anchor set
pub(crate) fn bare_session(
    memory: &SnapshotMemory,
    objects: ObjectArrayInfo,
) -> DiscoverySession<'_, SnapshotMemory> {
    let mut session = DiscoverySession::new(memory, SectionCache::default(), DiscoveryConfig::default());
    session.table.object_array = Some(objects);
    session
}

/// Every field at its image offset, plus the world, precision and code routines
pub(crate) fn assert_expected_offsets(table: &OffsetTable) {
    let expected = [
        BASE_FIELDS,
        STRUCT_FIELDS,
        DESCRIPTOR_FIELDS,
        PROPERTY_FIELDS,
        TYPED_FIELDS,
        CODE_FIELDS,
    ]
    .concat();
    for &(field, offset) in &expected {
        assert_eq!(table.get(field), Some(offset), "{field}");
    }
    assert_eq!(table.discovered_count(), expected.len());

    assert!(table.field_descriptors);
    assert_eq!(table.precision, FloatPrecision::Double);
    assert_eq!(table.world, Some(WORLD_GLOBAL));

    let dispatch = table.event_dispatch.unwrap();
    assert_eq!(dispatch.vtable_index, Some(1));
    assert_eq!(dispatch.rva, DISPATCH_ROUTINE - MODULE_BASE);
    assert_eq!(table.string_formatter.unwrap().rva, FORMATTER - MODULE_BASE);
}
