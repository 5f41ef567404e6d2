//! Offline memory image made of address-tagged regions
//!
//! A snapshot directory holds `snapshot.json` (the manifest) next to one raw `.bin`
//! file per region. Reads that straddle two regions fail, as they would on a
//! partially mapped page in a live process.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ReadMemory;
use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "snapshot.json";

const PAGE: u64 = 0x1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRegion {
    pub address: u64,
    pub size: usize,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub module_base: u64,
    pub module_size: u64,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    pub regions: Vec<SnapshotRegion>,
}

#[derive(Debug, Default)]
pub struct SnapshotMemory {
    module_base: u64,
    module_size: u64,
    note: Option<String>,
    regions: RwLock<BTreeMap<u64, Vec<u8>>>,
}

impl SnapshotMemory {
    pub fn new(module_base: u64, module_size: u64) -> Self {
        Self {
            module_base,
            module_size,
            note: None,
            regions: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn module_base(&self) -> u64 {
        self.module_base
    }

    pub fn module_size(&self) -> u64 {
        self.module_size
    }

    /// Free-form description stored in the manifest
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn set_note(&mut self, note: Option<String>) {
        self.note = note;
    }

    /// Map `bytes` at `address`, replacing any region starting there.
    pub fn map(&mut self, address: u64, bytes: Vec<u8>) {
        self.regions.get_mut().insert(address, bytes);
    }

    pub fn map_zeroed(&mut self, address: u64, size: usize) {
        self.map(address, vec![0; size]);
    }

    /// `(address, size)` of every region, ascending
    pub fn regions(&self) -> Vec<(u64, usize)> {
        self.regions
            .read()
            .iter()
            .map(|(addr, bytes)| (*addr, bytes.len()))
            .collect()
    }

    /// Copy the given ranges out of another reader.
    ///
    /// A range that cannot be read in one go is retried page by page, so one
    /// unmapped page only drops itself.
    pub fn capture<R: ReadMemory + ?Sized>(
        reader: &R,
        module_base: u64,
        module_size: u64,
        ranges: &[(u64, usize)],
    ) -> Self {
        let mut snapshot = Self::new(module_base, module_size);
        for &(address, size) in ranges {
            match reader.read_bytes(address, size) {
                Ok(bytes) => snapshot.map(address, bytes),
                Err(e) => {
                    debug!("Region 0x{:X}+0x{:X} unreadable as a whole ({}), reading by page", address, size, e);
                    snapshot.capture_pages(reader, address, size);
                }
            }
        }
        snapshot
    }

    fn capture_pages<R: ReadMemory + ?Sized>(&mut self, reader: &R, address: u64, size: usize) {
        let end = address.saturating_add(size as u64);
        let mut run: Option<(u64, Vec<u8>)> = None;
        let mut skipped = 0u64;
        let mut cursor = address;
        while cursor < end {
            let len = (PAGE - cursor % PAGE).min(end - cursor);
            match reader.read_bytes(cursor, len as usize) {
                Ok(bytes) => match run.as_mut() {
                    Some((_, buf)) => buf.extend_from_slice(&bytes),
                    None => run = Some((cursor, bytes)),
                },
                Err(_) => {
                    skipped += len;
                    if let Some((start, buf)) = run.take() {
                        self.map(start, buf);
                    }
                }
            }
            cursor += len;
        }
        if let Some((start, buf)) = run {
            self.map(start, buf);
        }
        if skipped > 0 {
            warn!(
                "Skipped 0x{:X} unreadable bytes of region 0x{:X}+0x{:X}",
                skipped, address, size
            );
        }
    }

    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<SnapshotManifest> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let regions = self.regions.read();
        let mut entries = Vec::with_capacity(regions.len());
        for (address, bytes) in regions.iter() {
            let file = format!("{:016X}.bin", address);
            fs::write(dir.join(&file), bytes)?;
            entries.push(SnapshotRegion {
                address: *address,
                size: bytes.len(),
                file,
            });
        }

        let manifest = SnapshotManifest {
            module_base: self.module_base,
            module_size: self.module_size,
            captured_at: Utc::now(),
            note: self.note.clone(),
            regions: entries,
        };
        fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        debug!(
            "Saved snapshot with {} regions to {:?}",
            manifest.regions.len(),
            dir
        );
        Ok(manifest)
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let content = fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let manifest: SnapshotManifest = serde_json::from_str(&content)?;

        let mut snapshot = Self::new(manifest.module_base, manifest.module_size);
        snapshot.note = manifest.note.clone();
        for region in &manifest.regions {
            let bytes = fs::read(dir.join(&region.file))?;
            if bytes.len() != region.size {
                return Err(Error::InvalidSnapshot(format!(
                    "region {} holds {} bytes, manifest says {}",
                    region.file,
                    bytes.len(),
                    region.size
                )));
            }
            snapshot.map(region.address, bytes);
        }
        debug!(
            "Loaded snapshot captured at {} ({} regions)",
            manifest.captured_at,
            manifest.regions.len()
        );
        Ok(snapshot)
    }

    fn locate(regions: &BTreeMap<u64, Vec<u8>>, address: u64, size: usize) -> Option<(u64, usize)> {
        let (start, bytes) = regions.range(..=address).next_back()?;
        let offset = usize::try_from(address - start).ok()?;
        let end = offset.checked_add(size)?;
        (end <= bytes.len()).then_some((*start, offset))
    }
}

impl ReadMemory for SnapshotMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let regions = self.regions.read();
        let (start, offset) =
            Self::locate(&regions, address, size).ok_or_else(|| Error::MemoryReadFailed {
                address,
                message: format!("{} bytes not mapped in snapshot", size),
            })?;
        Ok(regions[&start][offset..offset + size].to_vec())
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        let mut regions = self.regions.write();
        let (start, offset) = Self::locate(&regions, address, data.len()).ok_or_else(|| {
            Error::MemoryWriteFailed {
                address,
                message: format!("{} bytes not mapped in snapshot", data.len()),
            }
        })?;
        if let Some(bytes) = regions.get_mut(&start) {
            bytes[offset..offset + data.len()].copy_from_slice(data);
        }
        Ok(())
    }
}
