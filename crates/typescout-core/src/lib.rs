//! # typescout-core
//!
//! Offset discovery for reflection-based game runtimes.
//!
//! This crate provides:
//! - Remote memory access (live process and offline snapshots)
//! - Root anchor location (object array, name pool, world)
//! - Field offset discovery by cross-instance agreement
//! - Code section scans for the event dispatcher and the string formatter
//! - JSON export of the discovered offset table

pub mod anchor;
pub mod code;
pub mod config;
pub mod discover;
pub mod error;
pub mod memory;
pub mod names;
pub mod objects;
pub mod offset;
pub mod sections;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{DiscoveryConfig, DiscoveryConfigBuilder, SampleLimits, Thresholds};
pub use discover::{MetaKind, Threshold, detect_precision};
pub use error::{Error, Result};
pub use memory::{ProcessMemory, ReadMemory, ReadRequest, SnapshotManifest, SnapshotMemory};
pub use names::NameResolver;
pub use objects::{ObjectArray, Sample, SampleSet};
pub use offset::{
    CodeLocation, FieldId, FloatPrecision, NamePoolInfo, NamePoolLayout, ObjectArrayInfo,
    ObjectArrayLayout, OffsetReport, OffsetTable, SENTINEL, Signature,
};
pub use sections::{SectionCache, SectionSnapshot, capture_sections};
pub use session::{DiscoveryReport, DiscoverySession, PropertyLayout, StageOutcome, StageStatus};
