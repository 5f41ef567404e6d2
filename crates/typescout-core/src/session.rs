//! Discovery session
//!
//! A session owns the offset table, the section snapshots, the configuration and the
//! name resolver, and borrows the reader. [`DiscoverySession::run`] locates the root
//! anchors and then runs every discoverer in dependency order. A discoverer that
//! fails leaves its fields at the sentinel and the pipeline moves on.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::anchor;
use crate::config::DiscoveryConfig;
use crate::discover::MetaKind;
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::validate::is_plausible_ptr;
use crate::names::NameResolver;
use crate::objects::ObjectArray;
use crate::offset::{FieldId, OffsetTable};
use crate::sections::SectionCache;

/// How one pipeline stage ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
    Done,
    Failed(String),
    /// A prerequisite was missing; nothing was attempted
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub name: &'static str,
    #[serde(flatten)]
    pub status: StageStatus,
}

/// Result of [`DiscoverySession::run`]
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    /// Both anchors plus the base record's class and name offsets are known
    pub usable: bool,
    pub stages: Vec<StageOutcome>,
    pub table: OffsetTable,
}

impl DiscoveryReport {
    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageOutcome> {
        self.stages
            .iter()
            .filter(|s| matches!(s.status, StageStatus::Failed(_)))
    }
}

/// One declared property of a struct or class record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyLayout {
    pub name: String,
    /// Descriptor class name, e.g. `ArrayProperty`
    pub kind: String,
    pub type_name: &'static str,
    pub offset: Option<i32>,
    pub size: Option<i32>,
}

pub struct DiscoverySession<'a, R: ReadMemory + ?Sized> {
    pub(crate) reader: &'a R,
    pub(crate) sections: SectionCache,
    pub(crate) config: DiscoveryConfig,
    pub(crate) table: OffsetTable,
    pub(crate) names: Option<NameResolver>,
    /// `(name, class name)` lookups already answered by a walk of the object array
    lookups: RwLock<HashMap<(String, String), Option<u64>>>,
}

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    pub fn new(reader: &'a R, sections: SectionCache, config: DiscoveryConfig) -> Self {
        Self {
            reader,
            sections,
            config,
            table: OffsetTable::new(),
            names: None,
            lookups: RwLock::new(HashMap::new()),
        }
    }

    pub fn reader(&self) -> &'a R {
        self.reader
    }

    pub fn sections(&self) -> &SectionCache {
        &self.sections
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn table(&self) -> &OffsetTable {
        &self.table
    }

    pub fn names(&self) -> Option<&NameResolver> {
        self.names.as_ref()
    }

    /// Run the whole pipeline from a clean table.
    ///
    /// Only a missing root anchor is an error; every other failure is recorded in the
    /// returned stage list.
    pub fn run(&mut self) -> Result<DiscoveryReport> {
        self.table.reset();
        self.names = None;
        self.lookups.get_mut().clear();

        info!("Locating root anchors...");
        self.locate_anchors()?;

        let mut stages = Vec::new();

        debug!("Phase 1: Base record");
        self.stage(&mut stages, "object.class", Self::discover_object_class);
        self.stage(&mut stages, "object.index", Self::discover_object_index);
        self.stage(&mut stages, "object.flags", Self::discover_object_flags);
        self.stage(&mut stages, "object.name", Self::discover_object_name);
        self.stage(&mut stages, "object.outer", Self::discover_object_outer);
        self.stage(&mut stages, "object.vtable", Self::discover_object_vtable);
        self.stage(&mut stages, "field.next", Self::discover_field_next);

        debug!("Phase 2: Struct records");
        self.stage(&mut stages, "struct.super", Self::discover_struct_super);
        self.stage(&mut stages, "struct.children", Self::discover_struct_children);
        self.stage(&mut stages, "struct.child_properties", Self::discover_child_properties);
        self.stage(&mut stages, "struct.size", Self::discover_struct_size);
        self.stage(&mut stages, "enum.names", Self::discover_enum_names);

        debug!("Phase 3: Field descriptors");
        self.stage(&mut stages, "field_descriptor", Self::discover_field_descriptors);

        debug!("Phase 4: Property base");
        self.stage(&mut stages, "property.element_size", Self::discover_element_size);
        self.stage(&mut stages, "property.array_dim", Self::discover_array_dim);
        self.stage(&mut stages, "property.offset", Self::discover_property_offset);
        self.stage(&mut stages, "property.flags", Self::discover_property_flags);
        self.stage(&mut stages, "bool_property.base", Self::discover_bool_base);

        debug!("Phase 5: Typed property pointers");
        self.stage(&mut stages, "typed_pointers", Self::discover_typed_pointers);

        debug!("Phase 6: Functions");
        self.stage(&mut stages, "function.flags", Self::discover_function_flags);
        self.stage(&mut stages, "function.exec", Self::discover_function_exec);

        debug!("Phase 7: Classes");
        self.stage(&mut stages, "class.cast_flags", Self::discover_cast_flags);
        self.stage(&mut stages, "class.default_object", Self::discover_default_object);

        debug!("Phase 8: World");
        self.stage(&mut stages, "world", Self::discover_world);

        debug!("Phase 9: Float precision");
        self.stage(&mut stages, "precision", Self::discover_precision);

        debug!("Phase 10: Code routines");
        self.stage(&mut stages, "event_dispatch", Self::discover_event_dispatch);
        self.stage(&mut stages, "string_formatter", Self::discover_string_formatter);

        let usable = self.table.is_usable();
        if usable {
            info!(
                "Discovery finished: {} offsets, {} stage(s) failed",
                self.table.discovered_count(),
                stages
                    .iter()
                    .filter(|s| matches!(s.status, StageStatus::Failed(_)))
                    .count()
            );
        } else {
            warn!("Discovery finished without the base record's class and name offsets");
        }

        Ok(DiscoveryReport {
            usable,
            stages,
            table: self.table.clone(),
        })
    }

    pub(crate) fn locate_anchors(&mut self) -> Result<()> {
        let preferred = self.config.data_section.as_str();
        let objects = anchor::object_array::locate(self.reader, &self.sections, preferred)?;
        let pool = anchor::name_pool::locate(self.reader, &self.sections, preferred)?;

        self.table.object_array = Some(objects);
        self.table.name_pool = Some(pool);
        self.names = Some(NameResolver::new(pool));
        Ok(())
    }

    fn stage<F>(&mut self, outcomes: &mut Vec<StageOutcome>, name: &'static str, discover: F)
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let status = match discover(self) {
            Ok(()) => StageStatus::Done,
            Err(e) if e.is_skip() => {
                debug!("  {} skipped: {}", name, e);
                StageStatus::Skipped(e.to_string())
            }
            Err(e) => {
                warn!("{} failed: {}", name, e);
                StageStatus::Failed(e.to_string())
            }
        };
        outcomes.push(StageOutcome { name, status });
    }

    pub(crate) fn objects(&self) -> Result<ObjectArray<'a, R>> {
        let info = self
            .table
            .object_array
            .ok_or(Error::AnchorNotFound("object array"))?;
        Ok(ObjectArray::new(self.reader, info))
    }

    pub(crate) fn offset_of(&self, field: FieldId, stage: &'static str) -> Result<i32> {
        self.table.get(field).ok_or_else(|| Error::Unavailable {
            stage,
            requires: field.to_string(),
        })
    }

    pub(crate) fn read_i32_at(&self, address: u64, offset: i32) -> Option<i32> {
        self.reader.read_i32(address + offset as u64).ok()
    }

    pub(crate) fn read_u32_at(&self, address: u64, offset: i32) -> Option<u32> {
        self.reader.read_u32(address + offset as u64).ok()
    }

    pub(crate) fn read_u64_at(&self, address: u64, offset: i32) -> Option<u64> {
        self.reader.read_u64(address + offset as u64).ok()
    }

    /// Plausible pointer stored at `address + offset`
    pub(crate) fn ptr_at(&self, address: u64, offset: i32) -> Option<u64> {
        self.reader
            .read_ptr(address + offset as u64)
            .ok()
            .filter(|p| is_plausible_ptr(*p))
    }

    pub fn resolve_name(&self, index: i32) -> Option<String> {
        self.names.as_ref()?.resolve(self.reader, index)
    }

    /// Decode the name value embedded at `address`
    pub fn read_name_at(&self, address: u64) -> Option<String> {
        self.names.as_ref()?.read_name(self.reader, address)
    }

    pub fn name_of(&self, object: u64) -> Option<String> {
        let offset = self.table.get(FieldId::ObjectName)?;
        self.read_name_at(object + offset as u64)
    }

    /// Declared type of a record
    pub fn class_of(&self, object: u64) -> Option<u64> {
        let offset = self.table.get(FieldId::ObjectClass)?;
        self.ptr_at(object, offset)
    }

    pub fn class_name_of(&self, object: u64) -> Option<String> {
        self.class_of(object).and_then(|class| self.name_of(class))
    }

    pub(crate) fn is_instance_of(&self, object: u64, class_names: &[&str]) -> bool {
        self.class_name_of(object)
            .is_some_and(|name| class_names.contains(&name.as_str()))
    }

    /// A class record: its declared type is the meta-class, which declares itself
    pub fn is_class_record(&self, object: u64) -> bool {
        self.class_of(object)
            .is_some_and(|class| self.class_of(class) == Some(class))
    }

    /// First record named `name` whose declared type is named `class_name`
    pub fn find_object(&self, name: &str, class_name: &str) -> Option<u64> {
        self.find_objects(&[(name, class_name)]).into_iter().next().flatten()
    }

    /// Resolve several `(name, class name)` pairs with at most one walk of the object array.
    ///
    /// Answers are cached for the rest of the run. Nothing is looked up or cached until
    /// the name and class offsets of the base record are known.
    pub fn find_objects(&self, wanted: &[(&str, &str)]) -> Vec<Option<u64>> {
        let key = |&(name, class_name): &(&str, &str)| (name.to_string(), class_name.to_string());
        let mut found = vec![None; wanted.len()];
        let mut pending = Vec::new();
        {
            let lookups = self.lookups.read();
            for (i, pair) in wanted.iter().enumerate() {
                match lookups.get(&key(pair)) {
                    Some(&hit) => found[i] = hit,
                    None => pending.push(i),
                }
            }
        }
        if pending.is_empty()
            || self.table.get(FieldId::ObjectName).is_none()
            || self.table.get(FieldId::ObjectClass).is_none()
        {
            return found;
        }
        let Ok(objects) = self.objects() else {
            return found;
        };

        let mut remaining = pending.len();
        for object in objects.iter(usize::MAX).map(|s| s.address) {
            if remaining == 0 {
                break;
            }
            let Some(name) = self.name_of(object) else {
                continue;
            };
            let open: Vec<usize> = pending
                .iter()
                .copied()
                .filter(|&i| found[i].is_none() && wanted[i].0 == name)
                .collect();
            if open.is_empty() {
                continue;
            }
            let Some(class_name) = self.class_name_of(object) else {
                continue;
            };
            for i in open {
                if wanted[i].1 == class_name {
                    found[i] = Some(object);
                    remaining -= 1;
                }
            }
        }

        let mut lookups = self.lookups.write();
        for &i in &pending {
            if found[i].is_none() {
                debug!("  {} ({}) not found in object array", wanted[i].0, wanted[i].1);
            }
            lookups.insert(key(&wanted[i]), found[i]);
        }
        found
    }

    /// Script struct by name; older builds declare them as plain structs
    pub fn find_struct(&self, name: &str) -> Option<u64> {
        let found = self.find_objects(&[(name, "ScriptStruct"), (name, "Struct")]);
        found[0].or(found[1])
    }

    /// Follow `next_offset` links from `start`, stopping at null, revisits or the depth limit
    pub(crate) fn walk_chain(&self, start: u64, next_offset: i32) -> Vec<u64> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut cursor = start;
        while is_plausible_ptr(cursor)
            && chain.len() < self.config.max_chain_depth
            && visited.insert(cursor)
        {
            chain.push(cursor);
            match self.reader.read_ptr(cursor + next_offset as u64) {
                Ok(next) => cursor = next,
                Err(_) => break,
            }
        }
        chain
    }

    /// Property descriptors declared directly on `owner`
    pub(crate) fn properties_of(&self, owner: u64) -> Vec<u64> {
        let (head, next) = if self.table.field_descriptors {
            (FieldId::StructChildProperties, FieldId::FieldDescriptorNext)
        } else {
            (FieldId::StructChildren, FieldId::FieldNext)
        };
        let (Some(head), Some(next)) = (self.table.get(head), self.table.get(next)) else {
            return Vec::new();
        };
        match self.ptr_at(owner, head) {
            Some(first) => self.walk_chain(first, next),
            None => Vec::new(),
        }
    }

    pub(crate) fn descriptor_name(&self, descriptor: u64) -> Option<String> {
        if self.table.field_descriptors {
            let offset = self.table.get(FieldId::FieldDescriptorName)?;
            self.read_name_at(descriptor + offset as u64)
        } else {
            self.name_of(descriptor)
        }
    }

    /// Name of a descriptor's own class, e.g. `ArrayProperty`
    pub(crate) fn descriptor_kind(&self, descriptor: u64) -> Option<String> {
        if self.table.field_descriptors {
            let class_offset = self.table.get(FieldId::FieldDescriptorClass)?;
            let name_offset = self.table.get(FieldId::FieldClassName)?;
            let class = self.ptr_at(descriptor, class_offset)?;
            self.read_name_at(class + name_offset as u64)
        } else {
            self.class_name_of(descriptor)
        }
    }

    /// Properties declared directly on `owner`, in chain order.
    ///
    /// Offset and size stay `None` until the property base record is discovered.
    pub fn property_layout(&self, owner: u64) -> Vec<PropertyLayout> {
        let offset_at = self.table.get(FieldId::PropertyOffset);
        let size_at = self.table.get(FieldId::PropertyElementSize);
        self.properties_of(owner)
            .into_iter()
            .filter_map(|descriptor| {
                let name = self.descriptor_name(descriptor)?;
                let kind = self.descriptor_kind(descriptor)?;
                Some(PropertyLayout {
                    type_name: MetaKind::parse(&kind).type_name(),
                    offset: offset_at.and_then(|off| self.read_i32_at(descriptor, off)),
                    size: size_at.and_then(|off| self.read_i32_at(descriptor, off)),
                    name,
                    kind,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Runtime};

    #[test]
    fn test_missing_anchor_is_fatal() {
        let memory = crate::memory::SnapshotMemory::new(0, 0);
        let sections = SectionCache::new(
            0,
            0,
            vec![crate::sections::SectionSnapshot::new(".data", 0x1_4000_8000, vec![0; 0x100])],
        );
        let mut session = DiscoverySession::new(&memory, sections, DiscoveryConfig::default());
        let err = session.run().unwrap_err();
        assert!(matches!(err, Error::AnchorNotFound("object array")));
    }

    #[test]
    fn test_full_run_is_usable() {
        let runtime = Runtime::build();
        let mut session = runtime.session();
        let report = session.run().unwrap();

        assert!(report.usable);
        assert_eq!(report.failed().count(), 0, "{:?}", report.stages);
        assert!(
            report
                .stages
                .iter()
                .all(|s| s.status == StageStatus::Done),
            "{:?}",
            report.stages
        );
        testing::assert_expected_offsets(&report.table);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let runtime = Runtime::build();
        let first = runtime.session().run().unwrap();
        let second = runtime.session().run().unwrap();
        assert_eq!(first.table, second.table);
        assert_eq!(first.stages, second.stages);
    }

    #[test]
    fn test_rerun_resets_table() {
        let runtime = Runtime::build();
        let mut session = runtime.session();
        let first = session.run().unwrap();
        let second = session.run().unwrap();
        assert_eq!(first.table, second.table);
    }

    #[test]
    fn test_lookups_after_base_stage() {
        let runtime = Runtime::build();
        let mut session = runtime.session();
        session.run().unwrap();

        let class = session.find_object("Class", "Class").unwrap();
        assert_eq!(class, runtime.class("Class"));
        assert!(session.is_class_record(runtime.class("Actor")));
        assert!(!session.is_class_record(runtime.struct_record("Vector")));
        assert_eq!(
            session.class_name_of(runtime.struct_record("Guid")).as_deref(),
            Some("ScriptStruct")
        );

        let names: Vec<_> = session
            .properties_of(runtime.struct_record("Guid"))
            .into_iter()
            .filter_map(|p| session.descriptor_name(p))
            .collect();
        assert_eq!(names, ["A", "B", "C", "D"]);
    }

    #[test]
    fn test_find_objects_in_one_walk() {
        let runtime = Runtime::build();
        let session = runtime.session_with(testing::BASE_FIELDS);

        let found = session.find_objects(&[
            ("Class", "Class"),
            ("Vector", "ScriptStruct"),
            ("Vector", "Class"),
            ("Missing", "Class"),
        ]);
        assert_eq!(
            found,
            [
                Some(runtime.class("Class")),
                Some(runtime.struct_record("Vector")),
                None,
                None
            ]
        );
        assert_eq!(session.find_struct("Guid"), Some(runtime.struct_record("Guid")));
    }

    #[test]
    fn test_find_object_answers_from_cache() {
        let runtime = Runtime::build();
        let session = runtime.session_with(testing::BASE_FIELDS);
        let class = runtime.class("Class");
        assert_eq!(session.find_object("Class", "Class"), Some(class));

        // break the record's type link; the cached answer still stands
        runtime.write_u64(class + 0x10, 0);
        assert_eq!(session.find_object("Class", "Class"), Some(class));
        assert_eq!(runtime.session_with(testing::BASE_FIELDS).find_object("Class", "Class"), None);
    }

    #[test]
    fn test_find_object_before_name_offset_is_not_cached() {
        let runtime = Runtime::build();
        let mut session = runtime.session_with_anchors();
        assert_eq!(session.find_object("Class", "Class"), None);

        for &(field, offset) in testing::BASE_FIELDS {
            session.table.set(field, offset);
        }
        assert_eq!(session.find_object("Class", "Class"), Some(runtime.class("Class")));
    }

    #[test]
    fn test_property_layout_of_struct() {
        let runtime = Runtime::build();
        let session = runtime.session_through_property_base();

        let layout = session.property_layout(runtime.struct_record("Vector"));
        let rows: Vec<_> = layout
            .iter()
            .map(|p| (p.name.as_str(), p.type_name, p.offset, p.size))
            .collect();
        assert_eq!(
            rows,
            [
                ("X", "double", Some(0), Some(8)),
                ("Y", "double", Some(8), Some(8)),
                ("Z", "double", Some(16), Some(8)),
            ]
        );
        assert!(layout.iter().all(|p| p.kind == "DoubleProperty"));
    }

    #[test]
    fn test_property_layout_before_property_base() {
        let runtime = Runtime::build();
        let session = runtime.session_through_descriptors();

        let layout = session.property_layout(runtime.struct_record("Guid"));
        assert_eq!(layout.len(), 4);
        assert_eq!(layout[0].type_name, "int32");
        assert_eq!(layout[0].offset, None);
        assert_eq!(layout[0].size, None);
    }

    #[test]
    fn test_walk_chain_stops_on_cycle_and_depth() {
        let mut memory = crate::memory::SnapshotMemory::new(0, 0);
        // three nodes, the last pointing back at the first
        let nodes = [0x5_0000_0000u64, 0x5_0000_0100, 0x5_0000_0200];
        for (i, node) in nodes.iter().enumerate() {
            let mut bytes = vec![0u8; 0x20];
            let next = nodes[(i + 1) % nodes.len()];
            bytes[0x18..0x20].copy_from_slice(&next.to_le_bytes());
            memory.map(*node, bytes);
        }
        let session = DiscoverySession::new(
            &memory,
            SectionCache::new(0, 0, Vec::new()),
            DiscoveryConfig::default(),
        );
        assert_eq!(session.walk_chain(nodes[0], 0x18), nodes.to_vec());

        let shallow = DiscoverySession::new(
            &memory,
            SectionCache::new(0, 0, Vec::new()),
            DiscoveryConfig::builder().max_chain_depth(2).build(),
        );
        assert_eq!(shallow.walk_chain(nodes[0], 0x18), nodes[..2].to_vec());
    }

    #[test]
    fn test_stage_status_serializes_with_reason() {
        let outcome = StageOutcome {
            name: "struct.size",
            status: StageStatus::Skipped("needs struct.super".to_string()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["name"], "struct.size");
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "needs struct.super");
    }
}
