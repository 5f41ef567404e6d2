//! Named section snapshots of the target module
//!
//! Sections are copied once per session; scanners work on the local bytes and only
//! follow pointers out of them through the reader.

use memchr::memmem;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::memory::{ByteView, ReadMemory};

pub const DATA_SECTION: &str = ".data";
pub const CODE_SECTION: &str = ".text";

/// PE header layout used by [`capture_sections`]
mod pe {
    pub const DOS_MAGIC: u16 = 0x5A4D;
    pub const E_LFANEW: u64 = 0x3C;
    pub const NT_SIGNATURE: u32 = 0x0000_4550;
    pub const NUMBER_OF_SECTIONS: u64 = 0x06;
    pub const SIZE_OF_OPTIONAL_HEADER: u64 = 0x14;
    pub const FILE_HEADER_END: u64 = 0x18;
    pub const SECTION_HEADER_SIZE: u64 = 0x28;
    pub const SECTION_VIRTUAL_SIZE: usize = 0x08;
    pub const SECTION_VIRTUAL_ADDRESS: usize = 0x0C;
    pub const MAX_SECTIONS: u16 = 96;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSnapshot {
    pub name: String,
    pub address: u64,
    bytes: Vec<u8>,
}

impl SectionSnapshot {
    pub fn new(name: impl Into<String>, address: u64, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            address,
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn end(&self) -> u64 {
        self.address + self.bytes.len() as u64
    }

    pub fn contains(&self, address: u64) -> bool {
        (self.address..self.end()).contains(&address)
    }

    /// Offset of an absolute address inside this section
    pub fn offset_of(&self, address: u64) -> Option<usize> {
        self.contains(address)
            .then(|| (address - self.address) as usize)
    }

    pub fn address_of(&self, offset: usize) -> u64 {
        self.address + offset as u64
    }

    /// Absolute address of the first occurrence of `needle`
    pub fn find_literal(&self, needle: &[u8]) -> Option<u64> {
        memmem::find(&self.bytes, needle).map(|pos| self.address_of(pos))
    }

    /// Read a pointer stored at an absolute address inside the section
    pub fn ptr_at_address(&self, address: u64) -> Option<u64> {
        self.u64_at(self.offset_of(address)?)
    }
}

impl ByteView for SectionSnapshot {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// All sections of one module, in header order
#[derive(Debug, Clone, Default)]
pub struct SectionCache {
    module_base: u64,
    module_size: u64,
    sections: Vec<SectionSnapshot>,
}

impl SectionCache {
    pub fn new(module_base: u64, module_size: u64, sections: Vec<SectionSnapshot>) -> Self {
        Self {
            module_base,
            module_size,
            sections,
        }
    }

    pub fn module_base(&self) -> u64 {
        self.module_base
    }

    pub fn module_size(&self) -> u64 {
        self.module_size
    }

    pub fn get(&self, name: &str) -> Option<&SectionSnapshot> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&SectionSnapshot> {
        self.get(name)
            .ok_or_else(|| Error::SectionMissing(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionSnapshot> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn containing(&self, address: u64) -> Option<&SectionSnapshot> {
        self.sections.iter().find(|s| s.contains(address))
    }

    /// First occurrence of `needle` in any section, header order
    pub fn find_literal(&self, needle: &[u8]) -> Option<u64> {
        self.sections.iter().find_map(|s| s.find_literal(needle))
    }

    /// Module-relative address
    pub fn rva(&self, address: u64) -> Option<u64> {
        address.checked_sub(self.module_base)
    }
}

/// Walk the PE headers at `module_base` and copy every section.
///
/// Sections that cannot be read are skipped with a warning.
pub fn capture_sections<R: ReadMemory + ?Sized>(
    reader: &R,
    module_base: u64,
    module_size: u64,
) -> Result<SectionCache> {
    let magic = reader.read_u16(module_base)?;
    if magic != pe::DOS_MAGIC {
        return Err(Error::InvalidImage(format!(
            "bad DOS magic 0x{:04X} at 0x{:X}",
            magic, module_base
        )));
    }

    let e_lfanew = reader.read_u32(module_base + pe::E_LFANEW)?;
    let nt = module_base + e_lfanew as u64;
    let signature = reader.read_u32(nt)?;
    if signature != pe::NT_SIGNATURE {
        return Err(Error::InvalidImage(format!(
            "bad NT signature 0x{:08X} at 0x{:X}",
            signature, nt
        )));
    }

    let count = reader.read_u16(nt + pe::NUMBER_OF_SECTIONS)?;
    if count == 0 || count > pe::MAX_SECTIONS {
        return Err(Error::InvalidImage(format!("section count {}", count)));
    }
    let optional_size = reader.read_u16(nt + pe::SIZE_OF_OPTIONAL_HEADER)? as u64;
    let headers = reader.read_bytes(
        nt + pe::FILE_HEADER_END + optional_size,
        (count as u64 * pe::SECTION_HEADER_SIZE) as usize,
    )?;

    let mut sections = Vec::with_capacity(count as usize);
    for header in headers.chunks_exact(pe::SECTION_HEADER_SIZE as usize) {
        let name_len = header[..8].iter().position(|&b| b == 0).unwrap_or(8);
        let name = String::from_utf8_lossy(&header[..name_len]).into_owned();
        let (Some(virtual_size), Some(virtual_address)) = (
            header.u32_at(pe::SECTION_VIRTUAL_SIZE),
            header.u32_at(pe::SECTION_VIRTUAL_ADDRESS),
        ) else {
            continue;
        };

        let address = module_base + virtual_address as u64;
        match reader.read_bytes(address, virtual_size as usize) {
            Ok(bytes) => {
                debug!(
                    "  Section {:<8} 0x{:X} (0x{:X} bytes)",
                    name, address, virtual_size
                );
                sections.push(SectionSnapshot::new(name, address, bytes));
            }
            Err(e) => warn!("Skipping section {}: {}", name, e),
        }
    }

    Ok(SectionCache::new(module_base, module_size, sections))
}
