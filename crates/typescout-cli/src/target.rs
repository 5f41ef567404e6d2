//! Target selection: a live process or a snapshot directory

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use typescout_core::{ProcessMemory, ReadMemory, ReadRequest, SnapshotMemory};

use crate::commands::hex_utils::parse_hex_address;

#[derive(Args)]
pub struct TargetArgs {
    /// Live process id
    #[arg(short, long, global = true, conflicts_with = "snapshot")]
    pub pid: Option<u32>,

    /// Snapshot directory produced by `capture`
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    /// Main module base address (hex), required with --pid
    #[arg(long, global = true, value_parser = parse_hex_address)]
    pub module_base: Option<u64>,

    /// Main module image size (hex), required with --pid
    #[arg(long, global = true, value_parser = parse_hex_address)]
    pub module_size: Option<u64>,
}

pub enum Source {
    Process(ProcessMemory),
    Snapshot(SnapshotMemory),
}

/// Opened target plus the module range discovery works against
pub struct Target {
    pub source: Source,
    pub module_base: u64,
    pub module_size: u64,
}

impl TargetArgs {
    pub fn open(&self) -> Result<Target> {
        if let Some(dir) = &self.snapshot {
            let snapshot = match SnapshotMemory::load(dir) {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_not_found() => {
                    bail!("No snapshot found in {} (run `capture` first)", dir.display())
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to load snapshot {}", dir.display()));
                }
            };
            let module_base = self.module_base.unwrap_or(snapshot.module_base());
            let module_size = self.module_size.unwrap_or(snapshot.module_size());
            return Ok(Target {
                source: Source::Snapshot(snapshot),
                module_base,
                module_size,
            });
        }

        let Some(pid) = self.pid else {
            bail!("Either --pid or --snapshot is required");
        };
        let (Some(module_base), Some(module_size)) = (self.module_base, self.module_size) else {
            bail!("--module-base and --module-size are required with --pid");
        };
        let process = ProcessMemory::open(pid)
            .with_context(|| format!("Failed to open process {}", pid))?;
        Ok(Target {
            source: Source::Process(process),
            module_base,
            module_size,
        })
    }
}

impl Target {
    pub fn describe(&self) -> String {
        match &self.source {
            Source::Process(p) => format!("process {}", p.pid()),
            Source::Snapshot(s) => match s.note() {
                Some(note) => format!("snapshot ({})", note),
                None => "snapshot".to_string(),
            },
        }
    }
}

impl ReadMemory for Target {
    fn read_bytes(&self, address: u64, size: usize) -> typescout_core::Result<Vec<u8>> {
        match &self.source {
            Source::Process(p) => p.read_bytes(address, size),
            Source::Snapshot(s) => s.read_bytes(address, size),
        }
    }

    fn read_batch(&self, requests: &[ReadRequest]) -> Vec<typescout_core::Result<Vec<u8>>> {
        match &self.source {
            Source::Process(p) => p.read_batch(requests),
            Source::Snapshot(s) => s.read_batch(requests),
        }
    }
}
