//! Snapshot capture for offline replay
//!
//! The snapshot holds the module header, every section, and (unless `shallow`) each
//! page a discovery pass actually read, so `discover --snapshot` replays the same run.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};
use typescout_core::{
    DiscoveryConfig, DiscoverySession, ReadMemory, SnapshotMemory, capture_sections,
};

use super::hex_utils::parse_region;
use crate::target::Target;

const PAGE: u64 = 0x1000;

pub fn run(
    target: &Target,
    output: &Path,
    regions: &[String],
    note: Option<String>,
    shallow: bool,
    config: DiscoveryConfig,
) -> Result<()> {
    let mut pages = BTreeSet::new();
    add_range(&mut pages, target.module_base, PAGE as usize);

    let sections = capture_sections(target, target.module_base, target.module_size)?;
    for section in sections.iter() {
        add_range(&mut pages, section.address, section.size());
    }
    for region in regions {
        let (address, size) = parse_region(region)?;
        add_range(&mut pages, address, size);
    }

    if !shallow {
        let recorder = Recorder::new(target);
        {
            let mut session = DiscoverySession::new(&recorder, sections, config);
            match session.run() {
                Ok(report) if !report.usable => warn!("Discovery pass was not usable"),
                Ok(_) => {}
                Err(e) => warn!("Discovery pass failed: {}", e),
            }
        }
        pages.extend(recorder.into_pages());
    }

    let ranges = coalesce(&pages);
    let mut snapshot =
        SnapshotMemory::capture(target, target.module_base, target.module_size, &ranges);
    snapshot.set_note(note);
    let manifest = snapshot.save(output)?;

    let bytes: usize = manifest.regions.iter().map(|r| r.size).sum();
    info!(
        "Captured {} regions (0x{:X} bytes) from {} into {}",
        manifest.regions.len(),
        bytes,
        target.describe(),
        output.display()
    );
    Ok(())
}

/// Reader wrapper remembering which pages were read successfully
struct Recorder<'a, R: ReadMemory + ?Sized> {
    inner: &'a R,
    pages: RefCell<BTreeSet<u64>>,
}

impl<'a, R: ReadMemory + ?Sized> Recorder<'a, R> {
    fn new(inner: &'a R) -> Self {
        Self {
            inner,
            pages: RefCell::new(BTreeSet::new()),
        }
    }

    fn into_pages(self) -> BTreeSet<u64> {
        self.pages.into_inner()
    }
}

impl<R: ReadMemory + ?Sized> ReadMemory for Recorder<'_, R> {
    fn read_bytes(&self, address: u64, size: usize) -> typescout_core::Result<Vec<u8>> {
        let bytes = self.inner.read_bytes(address, size)?;
        add_range(&mut self.pages.borrow_mut(), address, size);
        Ok(bytes)
    }
}

fn add_range(pages: &mut BTreeSet<u64>, address: u64, size: usize) {
    if size == 0 {
        return;
    }
    let first = address & !(PAGE - 1);
    let last = address.saturating_add(size as u64 - 1) & !(PAGE - 1);
    pages.extend((first..=last).step_by(PAGE as usize));
}

/// Merge adjacent pages into `(address, size)` runs
fn coalesce(pages: &BTreeSet<u64>) -> Vec<(u64, usize)> {
    let mut runs: Vec<(u64, usize)> = Vec::new();
    for &page in pages {
        match runs.last_mut() {
            Some((start, size)) if *start + *size as u64 == page => *size += PAGE as usize,
            _ => runs.push((page, PAGE as usize)),
        }
    }
    runs
}
