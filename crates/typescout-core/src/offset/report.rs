use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::Result;
use crate::memory::ReadMemory;
use crate::offset::{CodeLocation, FloatPrecision, OffsetTable};
use crate::session::{DiscoveryReport, StageOutcome};

const SAMPLE_BYTES: usize = 32;

/// Discovery result export for diagnostics and downstream generators
#[derive(Debug, Clone, Serialize)]
pub struct OffsetReport {
    pub version: String,
    pub generated_at: DateTime<Local>,
    pub module_base: String,
    pub usable: bool,
    pub anchors: AnchorValues,
    pub precision: FloatPrecision,
    pub field_descriptors: bool,
    /// Discovered fields only, keyed by dotted name
    pub fields: BTreeMap<String, i32>,
    pub routines: RoutineValues,
    pub stages: Vec<StageOutcome>,
    pub memory_samples: MemorySamples,
}

/// Anchor addresses in hex string format
#[derive(Debug, Clone, Serialize)]
pub struct AnchorValues {
    pub object_array: Option<String>,
    pub object_array_layout: Option<String>,
    pub object_stride: Option<String>,
    pub name_pool: Option<String>,
    pub name_pool_layout: Option<String>,
    pub world: Option<String>,
}

/// Module-relative routine addresses
#[derive(Debug, Clone, Serialize)]
pub struct RoutineValues {
    pub event_dispatch_rva: Option<String>,
    pub event_dispatch_vtable_index: Option<u32>,
    pub string_formatter_rva: Option<String>,
}

/// Raw bytes at each anchor
#[derive(Debug, Clone, Serialize)]
pub struct MemorySamples {
    pub object_array_32bytes: String,
    pub name_pool_32bytes: String,
    pub world_32bytes: String,
}

fn hex(value: u64) -> String {
    format!("0x{:X}", value)
}

fn rva(location: Option<CodeLocation>) -> Option<String> {
    location.map(|l| hex(l.rva))
}

impl OffsetReport {
    pub fn from_discovery<R: ReadMemory + ?Sized>(
        report: &DiscoveryReport,
        module_base: u64,
        reader: &R,
    ) -> Self {
        let table = &report.table;
        let objects = table.object_array;
        let pool = table.name_pool;

        let anchors = AnchorValues {
            object_array: objects.map(|o| hex(o.address)),
            object_array_layout: objects.map(|o| o.layout.to_string()),
            object_stride: objects.map(|o| hex(o.stride as u64)),
            name_pool: pool.map(|p| hex(p.address)),
            name_pool_layout: pool.map(|p| p.layout.to_string()),
            world: table.world.map(hex),
        };

        let routines = RoutineValues {
            event_dispatch_rva: rva(table.event_dispatch),
            event_dispatch_vtable_index: table.event_dispatch.and_then(|l| l.vtable_index),
            string_formatter_rva: rva(table.string_formatter),
        };

        let memory_samples = MemorySamples {
            object_array_32bytes: Self::read_memory_hex(reader, objects.map_or(0, |o| o.address)),
            name_pool_32bytes: Self::read_memory_hex(reader, pool.map_or(0, |p| p.address)),
            world_32bytes: Self::read_memory_hex(reader, table.world.unwrap_or(0)),
        };

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Local::now(),
            module_base: hex(module_base),
            usable: report.usable,
            anchors,
            precision: table.precision,
            field_descriptors: table.field_descriptors,
            fields: Self::discovered_fields(table),
            routines,
            stages: report.stages.clone(),
            memory_samples,
        }
    }

    fn discovered_fields(table: &OffsetTable) -> BTreeMap<String, i32> {
        table
            .iter()
            .filter(|&(field, _)| table.is_set(field))
            .map(|(field, offset)| (field.to_string(), offset))
            .collect()
    }

    fn read_memory_hex<R: ReadMemory + ?Sized>(reader: &R, address: u64) -> String {
        if address == 0 {
            return "(address is 0)".to_string();
        }

        match reader.read_bytes(address, SAMPLE_BYTES) {
            Ok(bytes) => bytes
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => "(read failed)".to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save report to JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
